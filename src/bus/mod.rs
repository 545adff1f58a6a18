pub mod channel_type;
pub mod events;

pub use channel_type::ChannelType;
pub use events::{DisplayEnvelope, InboundMessage, OutboundMessage};
