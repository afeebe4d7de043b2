//! `udpm://` – LCM over UDP multicast.
//!
//! The receive socket binds `0.0.0.0:<port>` with address (and, on unix,
//! port) reuse so that any number of monitors and vehicles on one host can
//! share the bus, then joins the multicast group. Publishing uses a separate
//! socket with the configured TTL and multicast loopback enabled.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use convoy_types::{ConvoyError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};

use crate::packet::{self, Datagram};
use crate::provider::{Provider, PublishSink, RawMessage};
use crate::reassembly::FragmentReassembler;
use crate::url::UdpmParams;

/// Large enough for any UDP datagram.
const RECV_BUFFER_SIZE: usize = 65_536;

/// Shortest read timeout handed to the OS (a zero timeout means "block").
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Publishing half of the multicast provider.
pub struct UdpmSink {
    socket: UdpSocket,
    destination: SocketAddrV4,
    seqno: AtomicU32,
}

impl PublishSink for UdpmSink {
    fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        let seqno = self.seqno.fetch_add(1, Ordering::Relaxed);
        for datagram in packet::encode(seqno, channel, payload)? {
            self.socket.send_to(&datagram, self.destination)?;
        }
        Ok(())
    }
}

/// UDP multicast provider.
pub struct UdpmProvider {
    params: UdpmParams,
    socket: UdpSocket,
    sink: Arc<UdpmSink>,
    reassembler: FragmentReassembler,
    buf: Vec<u8>,
}

impl UdpmProvider {
    /// Open the receive and send sockets and join the multicast group.
    pub fn open(params: UdpmParams) -> Result<Self> {
        let socket = open_receive_socket(&params).map_err(|e| {
            ConvoyError::Transport(format!(
                "cannot join {}:{}: {e}",
                params.group, params.port
            ))
        })?;
        let sink = UdpmSink {
            socket: open_send_socket(params.ttl)?,
            destination: SocketAddrV4::new(params.group, params.port),
            seqno: AtomicU32::new(0),
        };
        info!(group = %params.group, port = params.port, ttl = params.ttl, "joined LCM multicast bus");
        Ok(Self {
            params,
            socket,
            sink: Arc::new(sink),
            reassembler: FragmentReassembler::new(),
            buf: vec![0; RECV_BUFFER_SIZE],
        })
    }

    pub fn params(&self) -> &UdpmParams {
        &self.params
    }

    /// Turn one datagram into a complete message, if it finishes one.
    fn ingest(&mut self, len: usize, sender: SocketAddr) -> Option<RawMessage> {
        match packet::parse(&self.buf[..len]) {
            Ok(Datagram::Short {
                channel, payload, ..
            }) => Some(RawMessage::new(channel, payload.to_vec(), Some(sender))),
            Ok(Datagram::Fragment {
                header,
                channel,
                data,
            }) => self
                .reassembler
                .accept(sender, &header, channel, data)
                .map(|done| RawMessage::new(done.channel, done.payload, Some(sender))),
            Err(e) => {
                debug!(%sender, len, error = %e, "dropping malformed datagram");
                None
            }
        }
    }
}

impl Provider for UdpmProvider {
    fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<RawMessage>> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let read_timeout = deadline
                .map(|d| d.saturating_duration_since(Instant::now()).max(MIN_READ_TIMEOUT));
            self.socket.set_read_timeout(read_timeout)?;

            match self.socket.recv_from(&mut self.buf) {
                Ok((len, sender)) => {
                    if let Some(msg) = self.ingest(len, sender) {
                        return Ok(Some(msg));
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
        }
    }

    fn sink(&self) -> Arc<dyn PublishSink> {
        self.sink.clone()
    }
}

impl Drop for UdpmProvider {
    fn drop(&mut self) {
        if let Err(e) = self
            .socket
            .leave_multicast_v4(&self.params.group, &Ipv4Addr::UNSPECIFIED)
        {
            debug!(error = %e, "leaving multicast group failed");
        }
    }
}

fn open_receive_socket(params: &UdpmParams) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    if let Some(size) = params.recv_buf_size {
        socket.set_recv_buffer_size(size)?;
    }
    let bind = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, params.port);
    socket.bind(&bind.into())?;
    socket.join_multicast_v4(&params.group, &Ipv4Addr::UNSPECIFIED)?;
    Ok(socket.into())
}

fn open_send_socket(ttl: u8) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_ttl_v4(u32::from(ttl))?;
    socket.set_multicast_loop_v4(true)?;
    Ok(socket.into())
}
