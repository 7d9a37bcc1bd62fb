use crate::SubscriptionId;
use hid_transport::TransportError;
use tokio::sync::mpsc;

/// Something a registered device reported, tagged with the subscription that
/// produced it so stale events can be told apart from live ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Data {
        subscription: SubscriptionId,
        token: String,
        report: Vec<u8>,
    },
    Error {
        subscription: SubscriptionId,
        token: String,
        error: TransportError,
    },
}

impl DeviceEvent {
    pub fn subscription(&self) -> SubscriptionId {
        match self {
            DeviceEvent::Data { subscription, .. } | DeviceEvent::Error { subscription, .. } => {
                *subscription
            }
        }
    }

    pub fn token(&self) -> &str {
        match self {
            DeviceEvent::Data { token, .. } | DeviceEvent::Error { token, .. } => token,
        }
    }
}

/// Queue shared by every device listener.
pub type DeviceEventSink = mpsc::UnboundedSender<DeviceEvent>;
