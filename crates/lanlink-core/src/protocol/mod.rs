//! Protocol module containing the discovery message type and its text codec.

pub mod message;

pub use message::{DiscoveryMessage, ProtocolError};
