//! Core types shared by providers and the agent loop.

pub mod message;
pub mod stream;

pub use message::*;
pub use stream::*;
