//! Listening sockets and the connection event loop.

pub mod access_log;
pub mod binding;
pub mod manager;

use std::io;
use std::net::SocketAddr;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("internal fault: {0}")]
    Internal(String),
}

impl ServerError {
    /// Fatal errors stop the process; anything else restarts the serving
    /// loop with a freshly loaded configuration.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ServerError::Internal(_))
    }
}
