use core::fmt;
use core::str::FromStr;
use device_registry::is_valid_token;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CHANNEL_PREFIX: &str = "frame-broker";

/// Second segment of channels in the [`ChannelProfile::Usb`] scheme.
pub const USB_SEGMENT: &str = "usb";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Bridge to controller: device reports.
    In,
    /// Controller to bridge: commands for a device.
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("invalid channel format ({channel}): {found} segments, expected '{CHANNEL_PREFIX}:<token>:<in|out>'")]
    SegmentCount { channel: String, found: usize },
    #[error("invalid channel format ({channel}): prefix is not '{CHANNEL_PREFIX}'")]
    Prefix { channel: String },
    #[error("invalid channel format ({channel}): direction {direction:?} is not 'in' or 'out'")]
    Direction { channel: String, direction: String },
    #[error("invalid channel format ({channel}): {token:?} is not a routing token")]
    Token { channel: String, token: String },
}

/// A parsed `frame-broker:<token>:<direction>` channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    pub token: String,
    pub direction: Direction,
}

impl Route {
    pub fn new(token: impl Into<String>, direction: Direction) -> Self {
        Self {
            token: token.into(),
            direction,
        }
    }

    pub fn channel(&self) -> String {
        format!("{CHANNEL_PREFIX}:{}:{}", self.token, self.direction)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CHANNEL_PREFIX}:{}:{}", self.token, self.direction)
    }
}

impl FromStr for Route {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_channel(s)
    }
}

pub fn parse_channel(channel: &str) -> Result<Route, ChannelError> {
    let segments: Vec<&str> = channel.split(':').collect();
    let [prefix, token, direction] = segments.as_slice() else {
        return Err(ChannelError::SegmentCount {
            channel: channel.to_string(),
            found: segments.len(),
        });
    };
    if *prefix != CHANNEL_PREFIX {
        return Err(ChannelError::Prefix {
            channel: channel.to_string(),
        });
    }
    let direction = match *direction {
        "in" => Direction::In,
        "out" => Direction::Out,
        other => {
            return Err(ChannelError::Direction {
                channel: channel.to_string(),
                direction: other.to_string(),
            })
        }
    };
    if !is_valid_token(token) {
        return Err(ChannelError::Token {
            channel: channel.to_string(),
            token: token.to_string(),
        });
    }
    Ok(Route::new(*token, direction))
}

/// Channel naming scheme of a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelProfile {
    /// `frame-broker:<token>:in` out, `frame-broker:<token>:out` in.
    #[default]
    Routed,
    /// `frame-broker:usb:<path>` out; no inbound routing.
    Usb,
}

impl ChannelProfile {
    pub fn outbound_channel(self, token: &str, path: &str) -> String {
        match self {
            ChannelProfile::Routed => Route::new(token, Direction::In).channel(),
            ChannelProfile::Usb => format!("{CHANNEL_PREFIX}:{USB_SEGMENT}:{path}"),
        }
    }

    pub fn routes_inbound(self) -> bool {
        matches!(self, ChannelProfile::Routed)
    }
}
