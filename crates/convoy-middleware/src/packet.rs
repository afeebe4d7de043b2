//! LCM datagram framing for the `udpm://` provider.
//!
//! Small messages travel in a single datagram:
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────┬─────────────┐
//! │ "LC02" (u32) │ seqno (u32)  │ channel + 0x00  │ payload     │
//! └──────────────┴──────────────┴─────────────────┴─────────────┘
//! ```
//!
//! Larger ones are split into fragments:
//!
//! ```text
//! ┌──────────────┬───────────┬──────────┬─────────────┬─────────┬───────────┬──────┐
//! │ "LC03" (u32) │ seqno u32 │ size u32 │ offset u32  │ no u16  │ count u16 │ data │
//! └──────────────┴───────────┴──────────┴─────────────┴─────────┴───────────┴──────┘
//! ```
//!
//! `size` and `offset` refer to the payload only. Fragment 0 carries the
//! NUL-terminated channel name in front of its data. All integers are
//! big-endian.

use convoy_types::{ConvoyError, Result};

pub const MAGIC_SHORT: u32 = 0x4c43_3032;
pub const MAGIC_LONG: u32 = 0x4c43_3033;

pub const SHORT_HEADER_SIZE: usize = 8;
pub const FRAGMENT_HEADER_SIZE: usize = 20;

/// Largest datagram sent as a single short message.
pub const MAX_SHORT_DATAGRAM: usize = 1435;
/// Bytes carried by one fragment after its header.
pub const FRAGMENT_MAX_PAYLOAD: usize = 1423;
/// Channel names longer than this are rejected.
pub const MAX_CHANNEL_LEN: usize = 63;
/// Largest payload expressible in 65535 fragments.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize * FRAGMENT_MAX_PAYLOAD;

/// Header of one fragment of a large message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub seqno: u32,
    pub msg_size: u32,
    pub fragment_offset: u32,
    pub fragment_no: u16,
    pub fragments_in_msg: u16,
}

/// A parsed datagram, borrowing from the receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Datagram<'a> {
    Short {
        seqno: u32,
        channel: &'a str,
        payload: &'a [u8],
    },
    Fragment {
        header: FragmentHeader,
        /// Present on fragment 0 only.
        channel: Option<&'a str>,
        data: &'a [u8],
    },
}

pub fn validate_channel(channel: &str) -> Result<()> {
    if channel.len() > MAX_CHANNEL_LEN {
        return Err(ConvoyError::ChannelTooLong(channel.len()));
    }
    if channel.as_bytes().contains(&0) {
        return Err(ConvoyError::Transport(
            "channel name contains a NUL byte".into(),
        ));
    }
    Ok(())
}

/// Frame `payload` for `channel`, returning one datagram or a fragment train.
pub fn encode(seqno: u32, channel: &str, payload: &[u8]) -> Result<Vec<Vec<u8>>> {
    validate_channel(channel)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(ConvoyError::MessageTooLarge(payload.len()));
    }

    let short_len = SHORT_HEADER_SIZE + channel.len() + 1 + payload.len();
    if short_len <= MAX_SHORT_DATAGRAM {
        let mut dgram = Vec::with_capacity(short_len);
        dgram.extend_from_slice(&MAGIC_SHORT.to_be_bytes());
        dgram.extend_from_slice(&seqno.to_be_bytes());
        dgram.extend_from_slice(channel.as_bytes());
        dgram.push(0);
        dgram.extend_from_slice(payload);
        return Ok(vec![dgram]);
    }

    let stream_len = channel.len() + 1 + payload.len();
    let count = stream_len.div_ceil(FRAGMENT_MAX_PAYLOAD);
    let count = u16::try_from(count).map_err(|_| ConvoyError::MessageTooLarge(payload.len()))?;

    let mut fragments = Vec::with_capacity(count as usize);
    let mut offset = 0usize;
    for fragment_no in 0..count {
        let room = if fragment_no == 0 {
            FRAGMENT_MAX_PAYLOAD - (channel.len() + 1)
        } else {
            FRAGMENT_MAX_PAYLOAD
        };
        let chunk = &payload[offset..payload.len().min(offset + room)];

        let mut dgram = Vec::with_capacity(FRAGMENT_HEADER_SIZE + FRAGMENT_MAX_PAYLOAD);
        dgram.extend_from_slice(&MAGIC_LONG.to_be_bytes());
        dgram.extend_from_slice(&seqno.to_be_bytes());
        dgram.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        dgram.extend_from_slice(&(offset as u32).to_be_bytes());
        dgram.extend_from_slice(&fragment_no.to_be_bytes());
        dgram.extend_from_slice(&count.to_be_bytes());
        if fragment_no == 0 {
            dgram.extend_from_slice(channel.as_bytes());
            dgram.push(0);
        }
        dgram.extend_from_slice(chunk);
        fragments.push(dgram);

        offset += chunk.len();
    }
    Ok(fragments)
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

/// Split `buf` at the first NUL into a channel name and the rest.
fn split_channel(buf: &[u8]) -> Result<(&str, &[u8])> {
    let nul = buf
        .iter()
        .take(MAX_CHANNEL_LEN + 1)
        .position(|&b| b == 0)
        .ok_or_else(|| ConvoyError::Decode("channel name is not NUL-terminated".into()))?;
    let channel = std::str::from_utf8(&buf[..nul])
        .map_err(|_| ConvoyError::Decode("channel name is not UTF-8".into()))?;
    Ok((channel, &buf[nul + 1..]))
}

/// Parse one received datagram.
pub fn parse(buf: &[u8]) -> Result<Datagram<'_>> {
    if buf.len() < SHORT_HEADER_SIZE {
        return Err(ConvoyError::Decode(format!(
            "datagram of {} bytes is shorter than any header",
            buf.len()
        )));
    }
    match be_u32(buf, 0) {
        MAGIC_SHORT => {
            let (channel, payload) = split_channel(&buf[SHORT_HEADER_SIZE..])?;
            Ok(Datagram::Short {
                seqno: be_u32(buf, 4),
                channel,
                payload,
            })
        }
        MAGIC_LONG => {
            if buf.len() < FRAGMENT_HEADER_SIZE {
                return Err(ConvoyError::Decode("truncated fragment header".into()));
            }
            let header = FragmentHeader {
                seqno: be_u32(buf, 4),
                msg_size: be_u32(buf, 8),
                fragment_offset: be_u32(buf, 12),
                fragment_no: be_u16(buf, 16),
                fragments_in_msg: be_u16(buf, 18),
            };
            if header.fragments_in_msg == 0 || header.fragment_no >= header.fragments_in_msg {
                return Err(ConvoyError::Decode(format!(
                    "fragment {} of {} is out of range",
                    header.fragment_no, header.fragments_in_msg
                )));
            }
            let body = &buf[FRAGMENT_HEADER_SIZE..];
            if header.fragment_no == 0 {
                let (channel, data) = split_channel(body)?;
                Ok(Datagram::Fragment {
                    header,
                    channel: Some(channel),
                    data,
                })
            } else {
                Ok(Datagram::Fragment {
                    header,
                    channel: None,
                    data: body,
                })
            }
        }
        other => Err(ConvoyError::Decode(format!("unknown magic {other:#010x}"))),
    }
}
