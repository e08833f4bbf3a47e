// Module declarations
mod builder;
mod connection;
mod core;
mod session;
mod state;

#[cfg(test)]
mod tests;

// Public API exports
pub use builder::{ChatClientBuilder, ChatClientOptions};
pub use connection::{ConnectionManager, ConnectionState, publish_frame};
pub use self::core::ChatClient;
pub use state::ClientState;
