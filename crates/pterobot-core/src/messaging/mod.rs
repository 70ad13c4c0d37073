//! Cross-messenger model: incoming event types and the outbound port.

pub mod port;
pub mod types;
