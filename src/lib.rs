//! Instrument communication core for a GW Instek GPD-X303S control panel.
//!
//! The [`session::Session`] type is the entry point: it owns the serial
//! transport and the background telemetry poller, and is the only object a
//! presentation layer needs to touch.

pub mod serial;
pub mod session;

pub use serial::{LineTransport, MockTransport, OutputState, SerialError, SerialTransport};
pub use session::{ConnectionState, Session, SessionConfig, SessionError, TelemetryEvent};
