//! Chat-network abstractions (WhatsApp Web via the bridge today).

pub mod port;
pub mod types;
