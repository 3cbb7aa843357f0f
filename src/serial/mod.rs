pub mod mock;
pub mod protocol;
pub mod transport;

pub use mock::{MockHandle, MockTransport};
pub use protocol::OutputState;
pub use transport::{LineTransport, PortInfo, SerialTransport};

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port unavailable: {0}")]
    PortUnavailable(String),

    #[error("Communication timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Port not open")]
    NotOpen,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;
