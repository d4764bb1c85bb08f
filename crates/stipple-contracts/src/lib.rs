pub mod artifacts;
pub mod chat;
pub mod error;
pub mod events;
pub mod session;
pub mod tasks;

pub use error::{GatewayError, GatewayResult};
