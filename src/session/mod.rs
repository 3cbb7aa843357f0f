pub mod manager;
pub mod models;
pub mod poller;

pub use manager::Session;
pub use models::*;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Not connected to a power supply")]
    NotConnected,

    #[error("Instrument identification mismatch: {0}")]
    IdentificationMismatch(String),

    #[error("Serial communication error: {0}")]
    SerialError(#[from] crate::serial::SerialError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
