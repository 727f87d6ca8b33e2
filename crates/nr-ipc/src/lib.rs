//! Inter-realm messaging: message kinds, framing and local channels.
//!
//! Delivery is never guaranteed. Senders treat failures as fire-and-forget;
//! only requests wait, and only up to a short timeout.

pub mod message;
pub mod port;
pub mod window;

pub use message::BlockNotification;
pub use message::Envelope;
pub use message::RuntimeMessage;
pub use message::RuntimeResponse;
pub use message::StatusSnapshot;
pub use port::ChannelPort;
pub use port::MemoryPort;
pub use port::RuntimePort;
pub use window::PAGE_MESSAGE_SOURCE;
pub use window::WindowMessage;
pub use window::WindowPayload;

use nr_core::GuardError;
use nr_core::GuardResult;
use std::sync::mpsc;
use std::time::Duration;

const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;
const FRAME_PREFIX_BYTES: usize = 4;

/// Execution realms, in increasing privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealmRole {
    PageContext,
    Isolated,
    Background,
    Presentation,
}

impl RealmRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageContext => "page-context",
            Self::Isolated => "isolated",
            Self::Background => "background",
            Self::Presentation => "presentation",
        }
    }

    pub fn from_role_name(value: &str) -> Option<Self> {
        match value {
            "page-context" => Some(Self::PageContext),
            "isolated" => Some(Self::Isolated),
            "background" => Some(Self::Background),
            "presentation" => Some(Self::Presentation),
            _ => None,
        }
    }
}

/// Defines how realms communicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub role: RealmRole,
    pub max_message_bytes: usize,
}

impl ChannelConfig {
    pub fn hardened(role: RealmRole) -> GuardResult<Self> {
        let config = Self {
            role,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GuardResult<()> {
        if self.max_message_bytes == 0 {
            return Err(GuardError::new(
                "ipc.max_message_bytes_invalid",
                "channel max_message_bytes must be greater than zero",
            ));
        }

        if self.max_message_bytes > (16 * 1024 * 1024) {
            return Err(GuardError::new(
                "ipc.max_message_bytes_too_large",
                "channel max_message_bytes exceeds hard limit (16 MiB)",
            ));
        }

        Ok(())
    }
}

/// In-memory endpoint carrying framed JSON envelopes.
pub struct LocalEndpoint {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
    config: ChannelConfig,
}

impl LocalEndpoint {
    pub fn role(&self) -> RealmRole {
        self.config.role
    }

    pub fn send(&self, envelope: &Envelope) -> GuardResult<()> {
        let payload = serde_json::to_vec(envelope).map_err(|error| {
            GuardError::new(
                "ipc.encode_failed",
                format!("failed to encode envelope: {error}"),
            )
        })?;
        let frame = encode_frame(&payload, self.config.max_message_bytes)?;
        self.tx.send(frame).map_err(|error| {
            GuardError::new(
                "ipc.send_failed",
                format!(
                    "failed to send message from {} endpoint: {error}",
                    self.config.role.as_str()
                ),
            )
        })
    }

    pub fn recv_timeout(&self, timeout: Duration) -> GuardResult<Envelope> {
        let frame = self.rx.recv_timeout(timeout).map_err(|error| {
            GuardError::new(
                "ipc.recv_failed",
                format!(
                    "failed to receive message for {} endpoint: {error}",
                    self.config.role.as_str()
                ),
            )
        })?;
        self.decode(&frame)
    }

    /// Next queued envelope, or `None` when the queue is empty or closed.
    pub fn try_recv(&self) -> GuardResult<Option<Envelope>> {
        match self.rx.try_recv() {
            Ok(frame) => self.decode(&frame).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn decode(&self, frame: &[u8]) -> GuardResult<Envelope> {
        let payload = decode_frame(frame, self.config.max_message_bytes)?;
        serde_json::from_slice(&payload).map_err(|error| {
            GuardError::new(
                "ipc.decode_failed",
                format!(
                    "{} endpoint received a malformed envelope: {error}",
                    self.config.role.as_str()
                ),
            )
        })
    }
}

/// Creates paired in-memory endpoints.
pub fn local_channel_pair(
    left: ChannelConfig,
    right: ChannelConfig,
) -> GuardResult<(LocalEndpoint, LocalEndpoint)> {
    left.validate()?;
    right.validate()?;

    let (left_to_right_tx, left_to_right_rx) = mpsc::channel();
    let (right_to_left_tx, right_to_left_rx) = mpsc::channel();

    Ok((
        LocalEndpoint {
            tx: left_to_right_tx,
            rx: right_to_left_rx,
            config: left,
        },
        LocalEndpoint {
            tx: right_to_left_tx,
            rx: left_to_right_rx,
            config: right,
        },
    ))
}

/// Encodes a payload as a length-prefixed frame.
pub fn encode_frame(payload: &[u8], max_message_bytes: usize) -> GuardResult<Vec<u8>> {
    if payload.len() > max_message_bytes {
        return Err(GuardError::new(
            "ipc.message_too_large",
            format!(
                "payload exceeds max_message_bytes ({} > {})",
                payload.len(),
                max_message_bytes
            ),
        ));
    }

    let len_u32 = u32::try_from(payload.len()).map_err(|_| {
        GuardError::new(
            "ipc.message_too_large",
            "payload length does not fit in 32-bit frame prefix",
        )
    })?;

    let mut out = Vec::with_capacity(FRAME_PREFIX_BYTES + payload.len());
    out.extend_from_slice(&len_u32.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decodes a length-prefixed frame and validates payload size.
pub fn decode_frame(frame: &[u8], max_message_bytes: usize) -> GuardResult<Vec<u8>> {
    if frame.len() < FRAME_PREFIX_BYTES {
        return Err(GuardError::new(
            "ipc.frame_too_short",
            "frame is shorter than the 4-byte length prefix",
        ));
    }

    let mut len_bytes = [0_u8; FRAME_PREFIX_BYTES];
    len_bytes.copy_from_slice(&frame[..FRAME_PREFIX_BYTES]);
    let payload_len = u32::from_be_bytes(len_bytes) as usize;
    if payload_len > max_message_bytes {
        return Err(GuardError::new(
            "ipc.message_too_large",
            format!("decoded payload exceeds max_message_bytes ({payload_len} > {max_message_bytes})"),
        ));
    }

    let expected = FRAME_PREFIX_BYTES + payload_len;
    if frame.len() != expected {
        return Err(GuardError::new(
            "ipc.frame_length_mismatch",
            format!(
                "frame length mismatch: expected {expected} bytes, got {}",
                frame.len()
            ),
        ));
    }

    Ok(frame[FRAME_PREFIX_BYTES..].to_vec())
}
