use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use super::models::{
    ChannelReadings, ConnectionState, OutputState, SessionConfig, TelemetryEvent, CHANNEL_COUNT,
};
use super::poller::{Poller, SharedReadings, SharedTransport};
use super::{Result, SessionError};
use crate::serial::{protocol, LineTransport, SerialError, SerialTransport};

/// The one object presentation code talks to.
///
/// Owns the transport and the poller, enforces their lifecycle ordering
/// (identify before polling, stop before close), and republishes poller
/// telemetry through the channel handed out by [`subscribe`].
///
/// All methods are called from the presentation thread; the poller thread
/// only ever touches the shared transport and readings behind their locks.
///
/// [`subscribe`]: Session::subscribe
pub struct Session {
    config: SessionConfig,
    transport: Option<SharedTransport>,
    poller: Poller,
    state: ConnectionState,
    output: OutputState,
    readings: SharedReadings,
    events_tx: Sender<TelemetryEvent>,
    events_rx: Receiver<TelemetryEvent>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            transport: None,
            poller: Poller::new(),
            state: ConnectionState::Disconnected,
            output: OutputState::Off,
            readings: Arc::new(Mutex::new(Default::default())),
            events_tx,
            events_rx,
        }
    }

    /// Open `port_name` and run the identification handshake.
    ///
    /// Any previous connection is torn down first. On success the
    /// instrument's output state is queried, and the telemetry poller starts
    /// only if the output is currently on.
    pub fn connect(&mut self, port_name: &str) -> Result<String> {
        self.teardown();
        self.state = ConnectionState::Connecting;

        log::info!("Connecting to {}", port_name);
        let transport = match SerialTransport::open(port_name, self.config.baud_rate) {
            Ok(t) => t,
            Err(e) => {
                self.state = ConnectionState::Failed(e.to_string());
                return Err(e.into());
            }
        };

        self.attach(Box::new(transport))
    }

    /// Run the identification handshake over an already-open transport.
    ///
    /// Seam for non-serial transports and for tests; [`connect`] funnels
    /// through here after opening the port.
    ///
    /// [`connect`]: Session::connect
    pub fn connect_with(&mut self, transport: Box<dyn LineTransport>) -> Result<String> {
        self.teardown();
        self.state = ConnectionState::Connecting;
        self.attach(transport)
    }

    fn attach(&mut self, transport: Box<dyn LineTransport>) -> Result<String> {
        let shared: SharedTransport = Arc::new(Mutex::new(transport));

        let identity = match self.exchange(&shared, protocol::IDN_QUERY) {
            Ok(reply) if protocol::identity_matches(&reply) => reply,
            Ok(reply) => {
                let reason = format!("unexpected identification: {}", reply);
                self.fail(&shared, &reason);
                return Err(SessionError::IdentificationMismatch(reply));
            }
            Err(SerialError::Timeout) => {
                let reason = "no reply to identification".to_string();
                self.fail(&shared, &reason);
                return Err(SessionError::IdentificationMismatch(reason));
            }
            Err(e) => {
                self.fail(&shared, &e.to_string());
                return Err(e.into());
            }
        };

        // Mirror the instrument's actual output state rather than assuming
        // a default; a broken STATUS exchange fails the whole attempt.
        let output = match self
            .exchange(&shared, protocol::STATUS_QUERY)
            .and_then(|reply| protocol::decode_output_status(&reply))
        {
            Ok(output) => output,
            Err(e) => {
                self.fail(&shared, &e.to_string());
                return Err(e.into());
            }
        };

        log::info!("Connected: {} (output {:?})", identity, output);
        self.transport = Some(shared);
        self.state = ConnectionState::Connected(identity.clone());
        self.output = output;

        if output.is_on() {
            self.start_poller();
        }

        Ok(identity)
    }

    /// Stop polling and close the port. Idempotent.
    pub fn disconnect(&mut self) {
        self.teardown();
        self.state = ConnectionState::Disconnected;
    }

    /// Program a voltage setpoint. The value goes on the wire exactly as
    /// typed; the instrument enforces its own limits.
    pub fn set_voltage(&mut self, channel: u8, value: &str) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(SessionError::NotConnected)?;
        transport
            .lock()
            .write_line(&protocol::voltage_set(channel, value))?;
        Ok(())
    }

    /// Program a current setpoint.
    pub fn set_current(&mut self, channel: u8, value: &str) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(SessionError::NotConnected)?;
        transport
            .lock()
            .write_line(&protocol::current_set(channel, value))?;
        Ok(())
    }

    /// Switch the output relay. Enabling starts the telemetry poller,
    /// disabling stops it; readings freeze at their last values while the
    /// output is off.
    pub fn toggle_output(&mut self, turn_on: bool) -> Result<()> {
        let transport = self.transport.as_ref().ok_or(SessionError::NotConnected)?;

        let command = if turn_on {
            protocol::OUTPUT_ENABLE
        } else {
            protocol::OUTPUT_DISABLE
        };
        transport.lock().write_line(command)?;

        self.output = if turn_on {
            OutputState::On
        } else {
            OutputState::Off
        };
        log::info!("Output {}", if turn_on { "enabled" } else { "disabled" });

        if turn_on {
            self.start_poller();
        } else {
            self.poller.stop();
        }

        Ok(())
    }

    /// Receiver for poller telemetry, to be drained on the presentation
    /// thread. Events carry the 0-based channel index; last value wins.
    pub fn subscribe(&self) -> Receiver<TelemetryEvent> {
        self.events_rx.clone()
    }

    /// Snapshot of the last-known readings for all channels.
    pub fn readings(&self) -> [ChannelReadings; CHANNEL_COUNT] {
        self.readings.lock().clone()
    }

    pub fn connection_state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn output_state(&self) -> OutputState {
        self.output
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// One command/reply transaction under the transport lock.
    fn exchange(&self, transport: &SharedTransport, command: &str) -> crate::serial::Result<String> {
        let mut port = transport.lock();
        port.write_line(command)?;
        port.read_line(self.config.read_timeout())
    }

    /// Connection-time failure: close the half-open transport and record
    /// the operator-visible reason.
    fn fail(&mut self, transport: &SharedTransport, reason: &str) {
        log::warn!("Connection failed: {}", reason);
        transport.lock().close();
        self.state = ConnectionState::Failed(reason.to_string());
    }

    /// Stop-before-close: the poller must have joined before the transport
    /// handle goes away.
    fn teardown(&mut self) {
        self.poller.stop();
        if let Some(transport) = self.transport.take() {
            transport.lock().close();
        }
    }

    fn start_poller(&mut self) {
        let Some(transport) = &self.transport else {
            log::error!("Poller start requested without an open transport");
            return;
        };
        self.poller.start(
            transport.clone(),
            self.readings.clone(),
            self.events_tx.clone(),
            self.config.poll_interval(),
            self.config.read_timeout(),
        );
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}
