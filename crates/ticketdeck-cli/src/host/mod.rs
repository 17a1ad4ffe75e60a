//! Terminal and HTTP implementations of the engine's collaborator traits.

pub mod cache;
pub mod http;
pub mod session;
pub mod stream;
pub mod terminal;
