//! In-memory transport double for testing the session and poller without
//! hardware. Replies are scripted per command; everything written is logged
//! byte-for-byte so tests can assert on the exact wire traffic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{LineTransport, Result, SerialError};

#[derive(Default)]
struct MockState {
    /// Canned reply per command (command as written, without newline).
    replies: HashMap<String, String>,
    /// Commands the "instrument" never answers; reads after them time out.
    silent: HashSet<String>,
    /// Reply queued by the most recent write, if any.
    pending: Option<String>,
    /// Exact bytes of every write, terminator included.
    sent: Vec<String>,
    open: bool,
}

/// Scriptable [`LineTransport`] for tests.
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Inspection handle onto a [`MockTransport`] that has been handed to a
/// session. Cheap to clone; shares the mock's state.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                open: true,
                ..Default::default()
            })),
        }
    }

    /// Script a reply: whenever `command` is written, the next read returns
    /// `reply`. The rule persists across polling cycles.
    pub fn on(&self, command: &str, reply: &str) {
        self.state
            .lock()
            .replies
            .insert(command.to_string(), reply.to_string());
    }

    /// Make the instrument silent on `command`: reads after it time out.
    pub fn silence(&self, command: &str) {
        self.state.lock().silent.insert(command.to_string());
    }

    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: self.state.clone(),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// All writes so far, exact bytes including the newline terminator.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

impl LineTransport for MockTransport {
    fn write_line(&mut self, line: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(SerialError::NotOpen);
        }

        state.sent.push(format!("{}\n", line));
        state.pending = if state.silent.contains(line) {
            None
        } else {
            state.replies.get(line).cloned()
        };
        Ok(())
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<String> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(SerialError::NotOpen);
        }

        state.pending.take().ok_or(SerialError::Timeout)
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.open = false;
        state.pending = None;
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_reply_round_trip() {
        let mut mock = MockTransport::new();
        mock.on("*IDN?", "GW Instek GPD-X303S");

        mock.write_line("*IDN?").unwrap();
        let reply = mock.read_line(Duration::from_millis(10)).unwrap();
        assert_eq!(reply, "GW Instek GPD-X303S");
    }

    #[test]
    fn unscripted_command_times_out() {
        let mut mock = MockTransport::new();
        mock.write_line("VOUT1?").unwrap();

        let err = mock.read_line(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, SerialError::Timeout));
    }

    #[test]
    fn silenced_command_times_out_even_when_scripted() {
        let mut mock = MockTransport::new();
        mock.on("VOUT3?", "3.300");
        mock.silence("VOUT3?");

        mock.write_line("VOUT3?").unwrap();
        let err = mock.read_line(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, SerialError::Timeout));
    }

    #[test]
    fn handle_sees_exact_bytes_written() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();

        mock.write_line("OUT1").unwrap();
        mock.write_line("VSET2:5.0").unwrap();

        assert_eq!(handle.sent(), vec!["OUT1\n", "VSET2:5.0\n"]);
    }

    #[test]
    fn close_is_idempotent_and_rejects_io() {
        let mut mock = MockTransport::new();
        mock.close();
        mock.close();

        assert!(!mock.is_open());
        assert!(matches!(
            mock.write_line("OUT0").unwrap_err(),
            SerialError::NotOpen
        ));
    }
}
