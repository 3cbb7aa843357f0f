use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use super::models::{ChannelReadings, TelemetryEvent, CHANNEL_COUNT};
use crate::serial::{protocol, LineTransport, SerialError};

/// Transport handle shared between the poller thread and operator commands.
/// The mutex is held for exactly one write(+read) transaction so command
/// lines never interleave on the wire.
pub type SharedTransport = Arc<Mutex<Box<dyn LineTransport>>>;

pub type SharedReadings = Arc<Mutex<[ChannelReadings; CHANNEL_COUNT]>>;

/// Background telemetry sampler.
///
/// `Stopped -> Running -> Stopped`. While running, one OS thread cycles
/// through all channels querying actual voltage and current, publishing an
/// event per successful reply. `stop()` signals the thread and joins it, so
/// once it returns no further transport access can occur.
pub struct Poller {
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
}

impl Poller {
    pub fn new() -> Self {
        Self {
            handle: None,
            stop_tx: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start the polling thread. No-op when already running.
    pub fn start(
        &mut self,
        transport: SharedTransport,
        readings: SharedReadings,
        events: Sender<TelemetryEvent>,
        poll_interval: Duration,
        read_timeout: Duration,
    ) {
        if self.is_running() {
            log::debug!("Poller already running");
            return;
        }
        // Reap a thread that exited on its own; no-op otherwise.
        self.stop();

        let (stop_tx, stop_rx) = bounded(1);
        let handle = std::thread::spawn(move || {
            poll_loop(transport, readings, events, stop_rx, poll_interval, read_timeout);
        });

        self.handle = Some(handle);
        self.stop_tx = Some(stop_tx);
    }

    /// Signal the polling thread and block until it has exited. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The thread may already have exited; a failed send is fine.
            let _ = stop_tx.send(());
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Poller thread panicked");
            }
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(
    transport: SharedTransport,
    readings: SharedReadings,
    events: Sender<TelemetryEvent>,
    stop_rx: Receiver<()>,
    poll_interval: Duration,
    read_timeout: Duration,
) {
    log::info!("Telemetry poller started");

    'running: loop {
        for index in 0..CHANNEL_COUNT {
            // Honor a stop requested mid-cycle, but only between
            // transactions; an in-flight query always completes first.
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break 'running,
                Err(TryRecvError::Empty) => {}
            }

            let number = (index + 1) as u8;

            if let Some(text) = query(&transport, &protocol::voltage_query(number), read_timeout) {
                readings.lock()[index].voltage = text.clone();
                if events.send(TelemetryEvent::Voltage { channel: index, text }).is_err() {
                    break 'running;
                }
            }

            if let Some(text) = query(&transport, &protocol::current_query(number), read_timeout) {
                readings.lock()[index].current = text.clone();
                if events.send(TelemetryEvent::Current { channel: index, text }).is_err() {
                    break 'running;
                }
            }
        }

        // The inter-cycle sleep doubles as the stop signal wait.
        match stop_rx.recv_timeout(poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    log::info!("Telemetry poller stopped");
}

/// One query transaction: lock, write, read. A missed or malformed reply
/// means that value simply does not update this cycle.
fn query(transport: &SharedTransport, command: &str, read_timeout: Duration) -> Option<String> {
    let mut port = transport.lock();

    if let Err(e) = port.write_line(command) {
        log::warn!("Telemetry write {} failed: {}", command, e);
        return None;
    }

    match port.read_line(read_timeout) {
        Ok(text) if !text.is_empty() => Some(text),
        Ok(_) => None,
        Err(SerialError::Timeout) => {
            log::debug!("No reply to {}", command);
            None
        }
        Err(e) => {
            log::warn!("Telemetry read for {} failed: {}", command, e);
            None
        }
    }
}
