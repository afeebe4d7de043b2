//! Operator console of `convoy-vehicle`.
//!
//! Supported commands:
//!   0, 1, 2 – set the driving mode
//!   s       – show status
//!   l       – show the last 10 log entries
//!   st      – publish a STATUS message
//!   w       – publish a test warning
//!   m       – toggle simulated motion
//!   h       – show this list
//!   q       – quit

use colored::Colorize;
use convoy_hal::ManualMotionSensor;
use convoy_runtime::driver::{SharedNode, lock};
use convoy_runtime::vehicle::MANUAL_WARNING;
use convoy_types::{ConvoyError, DrivingMode, Result};
use tokio::sync::mpsc;
use tracing::debug;

/// Entries shown by the `l` command.
const LOG_LINES: usize = 10;

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetMode(i32),
    Status,
    Logs,
    SendStatus,
    Warn,
    ToggleMotion,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    /// Commands are case-insensitive and surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Self {
        let cmd = line.trim().to_lowercase();
        match cmd.as_str() {
            "" => Command::Empty,
            "s" => Command::Status,
            "l" => Command::Logs,
            "st" => Command::SendStatus,
            "w" => Command::Warn,
            "m" => Command::ToggleMotion,
            "h" | "help" | "?" => Command::Help,
            "q" | "quit" | "exit" => Command::Quit,
            other => match other.parse::<i32>() {
                Ok(mode) => Command::SetMode(mode),
                Err(_) => Command::Unknown(other.to_string()),
            },
        }
    }
}

/// Whether the console keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Console state: the node it drives and the simulated motion switch.
pub struct Console {
    node: SharedNode,
    motion: ManualMotionSensor,
}

impl Console {
    pub fn new(node: SharedNode, motion: ManualMotionSensor) -> Self {
        Self { node, motion }
    }

    /// Run `cmd`, printing its result.
    pub fn execute(&self, cmd: Command) -> Flow {
        match cmd {
            Command::SetMode(raw) => {
                let result = lock(&self.node).set_driving_mode(raw);
                if let Err(e) = &result {
                    debug!(error = %e, raw, "mode change rejected");
                }
                println!("{}", mode_message(raw, &result));
            }
            Command::Status => {
                println!();
                println!("{}", lock(&self.node).status_report());
            }
            Command::Logs => {
                println!();
                println!("{}", "=== Recent Logs ===".bold());
                for entry in lock(&self.node).recent_log(LOG_LINES) {
                    println!("{entry}");
                }
                println!();
            }
            Command::SendStatus => {
                if let Err(e) = lock(&self.node).send_status() {
                    println!("{}: {e}", "Failed to send status".red());
                }
            }
            Command::Warn => {
                if let Err(e) = lock(&self.node).send_warning(MANUAL_WARNING) {
                    println!("{}: {e}", "Failed to send warning".red());
                }
            }
            Command::ToggleMotion => {
                let detected = self.motion.toggle();
                println!(
                    "Simulated motion: {}",
                    if detected { "DETECTED".yellow().bold() } else { "CLEAR".green() }
                );
            }
            Command::Help => print_help(),
            Command::Quit => return Flow::Quit,
            Command::Empty => {}
            Command::Unknown(other) => println!(
                "{} '{}'. Type {} for available commands.",
                "Unknown command:".red(),
                other.yellow(),
                "h".bold()
            ),
        }
        Flow::Continue
    }

    /// Execute lines from `lines` until `q`, end of input, or `shutdown`
    /// resolves.
    pub async fn run(
        &self,
        mut lines: mpsc::UnboundedReceiver<String>,
        shutdown: impl std::future::Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else { break };
                    if self.execute(Command::parse(&line)) == Flow::Quit {
                        break;
                    }
                }
                () = &mut shutdown => {
                    println!();
                    println!("Received signal, shutting down...");
                    break;
                }
            }
        }
    }
}

/// Console line reporting the outcome of a mode command.
fn mode_message(raw: i32, result: &Result<DrivingMode>) -> String {
    match result {
        Ok(mode) => format!("Driving mode set to: {} ({})", mode.as_raw(), mode.name()),
        Err(ConvoyError::Config(_)) => format!("{} {raw}", "Invalid driving mode:".red()),
        Err(e) => format!("{}: {e}", "Failed to announce mode".red()),
    }
}

/// Forward stdin lines into a channel from a detached reader thread, so a
/// pending read never blocks process exit.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

pub fn print_help() {
    println!("Commands:");
    println!("  {}  – set driving mode", "0, 1, 2".bold().cyan());
    println!("  {}        – show status", "s".bold().cyan());
    println!("  {}        – show logs", "l".bold().cyan());
    println!("  {}       – send status message", "st".bold().cyan());
    println!("  {}        – simulate warning (for testing)", "w".bold().cyan());
    println!("  {}        – toggle simulated motion", "m".bold().cyan());
    println!("  {}        – quit", "q".bold().cyan());
}
