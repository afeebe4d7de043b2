//! Text rendering of the four convoy messages.
//!
//! Every function here is pure: it takes a decoded message and the time zone
//! to render timestamps in, and returns the text the monitor prints. Colour
//! is added by the printer, never here.

use chrono::{DateTime, TimeZone};
use convoy_types::{Heartbeat, ModeChange, Status, Warning, mode_name};

const MICROS_PER_SECOND: i64 = 1_000_000;

/// `[YYYY-MM-DD HH:MM:SS.uuuuuu] ` for a microsecond Unix timestamp,
/// including the trailing space.
///
/// Timestamps chrono cannot represent render as `[invalid timestamp <us>] `.
pub fn format_timestamp<Tz: TimeZone>(timestamp_us: i64, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let secs = timestamp_us.div_euclid(MICROS_PER_SECOND);
    let micros = timestamp_us.rem_euclid(MICROS_PER_SECOND);
    match DateTime::from_timestamp(secs, (micros * 1_000) as u32) {
        Some(utc) => format!(
            "[{}.{micros:06}] ",
            utc.with_timezone(tz).format("%Y-%m-%d %H:%M:%S")
        ),
        None => format!("[invalid timestamp {timestamp_us}] "),
    }
}

pub fn format_heartbeat<Tz: TimeZone>(msg: &Heartbeat, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}HEARTBEAT from vehicle {}",
        format_timestamp(msg.timestamp, tz),
        msg.vehicle_id
    )
}

pub fn format_warning<Tz: TimeZone>(msg: &Warning, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut line = format!(
        "{}WARNING from vehicle {}: danger={}",
        format_timestamp(msg.timestamp, tz),
        msg.vehicle_id,
        if msg.danger_detected { "TRUE" } else { "FALSE" }
    );
    push_description(&mut line, &msg.description);
    line
}

pub fn format_mode<Tz: TimeZone>(msg: &ModeChange, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut line = format!(
        "{}MODE CHANGE from vehicle {}: mode={} ({})",
        format_timestamp(msg.timestamp, tz),
        msg.vehicle_id,
        msg.mode,
        mode_name(msg.mode)
    );
    push_description(&mut line, &msg.mode_description);
    line
}

/// Multi-line status block. Ends with a newline so that printing it with
/// `println!` leaves one empty line after the block.
pub fn format_status<Tz: TimeZone>(msg: &Status, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let yes_no = |b: bool| if b { "YES" } else { "NO" };
    let mut block = format!(
        "{}STATUS from vehicle {}:\n\
         \x20 - Driving Mode: {} ({})\n\
         \x20 - Motion Detected: {}\n\
         \x20 - Brake Lights: {}\n\
         \x20 - System Running: {}\n",
        format_timestamp(msg.timestamp, tz),
        msg.vehicle_id,
        msg.driving_mode,
        mode_name(msg.driving_mode),
        yes_no(msg.motion_detected),
        if msg.brake_lights_on { "ON" } else { "OFF" },
        yes_no(msg.system_running),
    );
    if !msg.status_message.is_empty() {
        block.push_str(&format!("  - Message: {}\n", msg.status_message));
    }
    block
}

fn push_description(line: &mut String, description: &str) {
    if !description.is_empty() {
        line.push_str(&format!(", description='{description}'"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    // 2024-01-15 10:30:45.123456 UTC
    const TS: i64 = 1_705_314_645_123_456;

    #[test]
    fn timestamp_has_microsecond_precision() {
        assert_eq!(format_timestamp(TS, &Utc), "[2024-01-15 10:30:45.123456] ");
        assert_eq!(format_timestamp(0, &Utc), "[1970-01-01 00:00:00.000000] ");
    }

    #[test]
    fn timestamp_follows_the_time_zone() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        assert_eq!(format_timestamp(TS, &cet), "[2024-01-15 11:30:45.123456] ");
    }

    #[test]
    fn negative_timestamp_floors_to_the_previous_second() {
        assert_eq!(format_timestamp(-1, &Utc), "[1969-12-31 23:59:59.999999] ");
        assert_eq!(
            format_timestamp(-1_500_000, &Utc),
            "[1969-12-31 23:59:58.500000] "
        );
    }

    #[test]
    fn unrepresentable_timestamp_is_reported() {
        assert_eq!(
            format_timestamp(i64::MAX, &Utc),
            format!("[invalid timestamp {}] ", i64::MAX)
        );
    }

    #[test]
    fn heartbeat_line() {
        let msg = Heartbeat {
            timestamp: TS,
            vehicle_id: 3,
        };
        assert_eq!(
            format_heartbeat(&msg, &Utc),
            "[2024-01-15 10:30:45.123456] HEARTBEAT from vehicle 3"
        );
    }

    #[test]
    fn warning_line_with_and_without_description() {
        let mut msg = Warning {
            timestamp: TS,
            vehicle_id: 1,
            danger_detected: true,
            description: "Motion detected".into(),
        };
        assert_eq!(
            format_warning(&msg, &Utc),
            "[2024-01-15 10:30:45.123456] WARNING from vehicle 1: danger=TRUE, description='Motion detected'"
        );

        msg.danger_detected = false;
        msg.description.clear();
        assert_eq!(
            format_warning(&msg, &Utc),
            "[2024-01-15 10:30:45.123456] WARNING from vehicle 1: danger=FALSE"
        );
    }

    #[test]
    fn mode_line_names_known_and_unknown_modes() {
        let mut msg = ModeChange {
            timestamp: TS,
            vehicle_id: 2,
            mode: 1,
            mode_description: "Head in Convoy".into(),
        };
        assert_eq!(
            format_mode(&msg, &Utc),
            "[2024-01-15 10:30:45.123456] MODE CHANGE from vehicle 2: mode=1 (Head in Convoy), description='Head in Convoy'"
        );

        msg.mode = 5;
        msg.mode_description.clear();
        assert_eq!(
            format_mode(&msg, &Utc),
            "[2024-01-15 10:30:45.123456] MODE CHANGE from vehicle 2: mode=5 (Unknown)"
        );
    }

    #[test]
    fn status_block() {
        let msg = Status {
            timestamp: TS,
            vehicle_id: 4,
            driving_mode: 2,
            motion_detected: true,
            brake_lights_on: false,
            system_running: true,
            status_message: "Vehicle 4 operational".into(),
        };
        assert_eq!(
            format_status(&msg, &Utc),
            "[2024-01-15 10:30:45.123456] STATUS from vehicle 4:\n\
             \x20 - Driving Mode: 2 (In Convoy)\n\
             \x20 - Motion Detected: YES\n\
             \x20 - Brake Lights: OFF\n\
             \x20 - System Running: YES\n\
             \x20 - Message: Vehicle 4 operational\n"
        );
    }

    #[test]
    fn status_block_omits_empty_message() {
        let msg = Status {
            timestamp: TS,
            vehicle_id: 4,
            driving_mode: -1,
            ..Status::default()
        };
        let block = format_status(&msg, &Utc);
        assert!(block.contains("  - Driving Mode: -1 (Unknown)\n"));
        assert!(block.contains("  - Brake Lights: OFF\n"));
        assert!(!block.contains("Message"));
        assert!(block.ends_with("  - System Running: NO\n"));
    }
}
