//! frame-bridge: routes HID reports onto bus channels and bus commands back to devices

mod error;
pub use error::{BridgeError, Result};

mod channel;
pub use channel::{
    parse_channel, ChannelError, ChannelProfile, Direction, Route, CHANNEL_PREFIX, USB_SEGMENT,
};

mod envelope;
pub use envelope::{decode_inbound, BufferEnvelope, EnvelopeError, BUFFER_TYPE};

mod config;
pub use config::{
    read_dotenv, BridgeConfig, ChannelConfig, DiscoveryConfig, DiscoveryMode, EnvSource,
    BUS_ADDRESS_ENV, DEFAULT_PRODUCT, DOTENV_FILE,
};

mod discovery;
pub use discovery::{plan, Discovery, ReconcilePlan, Scan, TickReport};

mod bridge;
pub use bridge::{Bridge, Inbound, Outbound};
