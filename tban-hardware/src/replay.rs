//! In-memory serial link
//!
//! [`ReplayLink`] answers status queries from captured buffers instead of a
//! real controller. It backs the offline "fake device" mode of the tools and
//! doubles as the scripted link in tests: every written frame is recorded,
//! responses can be queued per query and failures injected on demand.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tban_core::status::parse_capture;
use tban_core::variant::{REQUEST, SOURCE_PRIMARY, SOURCE_SECONDARY, WIRE_LENGTH};
use tban_core::{Result, TbanError};
use tracing::debug;

use crate::transport::SerialLink;

#[derive(Debug, Default)]
struct ReplayState {
    input: VecDeque<u8>,
    /// Standing answers keyed by query frame
    answers: HashMap<Vec<u8>, Vec<u8>>,
    /// One-shot answers, consumed by the next queries in order
    scripted: VecDeque<Vec<u8>>,
    written: Vec<Vec<u8>>,
    reads: Vec<usize>,
    dribble: Option<usize>,
    stalled_reads: usize,
    fail_write_at: Option<usize>,
}

/// Shared-state serial link; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct ReplayLink {
    state: Arc<Mutex<ReplayState>>,
}

impl ReplayLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link that answers base queries with `primary` and add-on queries
    /// with `secondary`. Short captures are zero-padded to the wire length.
    ///
    /// Without a `secondary` capture the add-on query gets an all-zero
    /// vector, like a controller with nothing behind its pass-through.
    pub fn from_captures(primary: Vec<u8>, secondary: Option<Vec<u8>>) -> Self {
        let link = Self::new();
        link.set_answer([SOURCE_PRIMARY, REQUEST], pad_to_wire(primary));
        let secondary = secondary.unwrap_or_default();
        link.set_answer([SOURCE_SECONDARY, REQUEST], pad_to_wire(secondary));
        link
    }

    fn state(&self) -> MutexGuard<'_, ReplayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer every `query` frame with `response`
    pub fn set_answer(&self, query: [u8; 2], response: Vec<u8>) {
        self.state().answers.insert(query.to_vec(), response);
    }

    /// Answer the next unanswered query with `response`, ahead of the
    /// standing answers
    pub fn queue_response(&self, response: Vec<u8>) {
        self.state().scripted.push_back(response);
    }

    /// Make bytes available for reading immediately
    pub fn push_input(&self, bytes: &[u8]) {
        self.state().input.extend(bytes.iter().copied());
    }

    /// Limit every read to `max` bytes
    pub fn set_dribble(&self, max: usize) {
        self.state().dribble = Some(max.max(1));
    }

    /// Make the next `count` reads return nothing
    pub fn stall_reads(&self, count: usize) {
        self.state().stalled_reads = count;
    }

    /// Fail the write with zero-based position `index`
    pub fn fail_write_at(&self, index: usize) {
        self.state().fail_write_at = Some(index);
    }

    /// Frames written so far
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    pub fn clear_written(&self) {
        self.state().written.clear();
    }

    /// Sizes returned by each read, including empty ones
    pub fn reads(&self) -> Vec<usize> {
        self.state().reads.clone()
    }

    /// Unread input bytes
    pub fn pending(&self) -> usize {
        self.state().input.len()
    }
}

impl SerialLink for ReplayLink {
    fn write_frame(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_write_at == Some(state.written.len()) {
            state.fail_write_at = None;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "replay write failure"));
        }
        state.written.push(bytes.to_vec());

        if bytes.len() == 2 && bytes[1] == REQUEST {
            let response = match state.scripted.pop_front() {
                Some(response) => Some(response),
                None => state.answers.get(bytes).cloned(),
            };
            match response {
                Some(response) => state.input.extend(response),
                None => debug!("Replay has no answer for {:02X?}", bytes),
            }
        }
        Ok(())
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.stalled_reads > 0 {
            state.stalled_reads -= 1;
            state.reads.push(0);
            return Ok(0);
        }
        let limit = state.dribble.unwrap_or(usize::MAX);
        let n = buf.len().min(limit).min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        state.reads.push(n);
        Ok(n)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        Ok(self.state().input.len())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.state().input.clear();
        Ok(())
    }

    fn port_path(&self) -> Option<&str> {
        Some("replay")
    }
}

fn pad_to_wire(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.len() < WIRE_LENGTH {
        bytes.resize(WIRE_LENGTH, 0);
    }
    bytes
}

/// Read a capture file of whitespace-separated decimal byte values
pub fn read_capture(path: &Path) -> Result<Vec<u8>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        TbanError::InvalidInput(format!("Cannot read capture {}: {}", path.display(), e))
    })?;
    let bytes = parse_capture(&text)?;
    if bytes.is_empty() {
        return Err(TbanError::InvalidInput(format!(
            "Capture {} contains no byte values",
            path.display()
        )));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answers_queries() {
        let mut link = ReplayLink::from_captures(vec![100, 1, 2], None);
        link.write_frame(&[0x05, 0x36]).unwrap();
        assert_eq!(link.pending(), WIRE_LENGTH);

        let mut buf = [0u8; 4];
        assert_eq!(link.read_chunk(&mut buf).unwrap(), 4);
        assert_eq!(buf, [100, 1, 2, 0]);
    }

    #[test]
    fn test_unanswered_query_and_commands_produce_nothing() {
        let mut link = ReplayLink::new();
        link.write_frame(&[0x06, 0x36]).unwrap();
        link.write_frame(&[0x01]).unwrap();
        assert_eq!(link.pending(), 0);
        assert_eq!(link.written().len(), 2);
    }

    #[test]
    fn test_missing_addon_capture_answers_zeros() {
        let mut link = ReplayLink::from_captures(vec![100], None);
        link.write_frame(&[0x06, 0x36]).unwrap();
        assert_eq!(link.pending(), WIRE_LENGTH);

        let mut buf = [0xFFu8; 32];
        assert_eq!(link.read_chunk(&mut buf).unwrap(), 32);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_scripted_responses_take_precedence() {
        let mut link = ReplayLink::from_captures(vec![100], None);
        link.queue_response(vec![1, 2, 3]);
        link.write_frame(&[0x05, 0x36]).unwrap();
        assert_eq!(link.pending(), 3);
        link.clear_input().unwrap();
        link.write_frame(&[0x05, 0x36]).unwrap();
        assert_eq!(link.pending(), WIRE_LENGTH);
    }

    #[test]
    fn test_injected_write_failure() {
        let mut link = ReplayLink::new();
        link.fail_write_at(1);
        link.write_frame(&[0x01]).unwrap();
        assert!(link.write_frame(&[0x02]).is_err());
        link.write_frame(&[0x03]).unwrap();
        assert_eq!(link.written(), vec![vec![0x01], vec![0x03]]);
    }

    #[test]
    fn test_read_capture_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("base.txt");
        std::fs::write(&path, "100 0 12\n34 56\n").unwrap();
        assert_eq!(read_capture(&path).unwrap(), vec![100, 0, 12, 34, 56]);

        std::fs::write(&path, "nothing here").unwrap();
        assert!(read_capture(&path).is_err());
        assert!(read_capture(&dir.path().join("missing.txt")).is_err());
    }
}
