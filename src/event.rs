use tokio::sync::mpsc;

use crate::frame::DecodedFrame;

/// Why a device session ended for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Stop was requested.
    Stopped,
    /// Too many consecutive failed connection attempts.
    GaveUp,
    /// The session did not finish within the shutdown grace period.
    Aborted,
}

/// Everything a running scanner reports about the devices it manages.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Connected and readers started.
    Ready { address: String },
    Frame { address: String, frame: DecodedFrame },
    /// The device dropped the link. A reconnect follows unless stopped.
    ConnectionLost { address: String },
    /// Terminal. No further events follow for this session.
    Disconnected {
        address: String,
        reason: DisconnectReason,
    },
}

impl DeviceEvent {
    pub fn address(&self) -> &str {
        match self {
            DeviceEvent::Ready { address }
            | DeviceEvent::Frame { address, .. }
            | DeviceEvent::ConnectionLost { address }
            | DeviceEvent::Disconnected { address, .. } => address,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<DeviceEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<DeviceEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address() {
        let event = DeviceEvent::Disconnected {
            address: "C4:7A:00:00:00:01".to_string(),
            reason: DisconnectReason::Aborted,
        };
        assert_eq!(event.address(), "C4:7A:00:00:00:01");
    }
}
