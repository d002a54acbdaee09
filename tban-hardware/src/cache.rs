//! Status cache
//!
//! Holds the last validated snapshot of each variant's status vector. A
//! query always fetches the whole vector; the snapshot is replaced only once
//! the new one has passed validation, so a failed query leaves the previous
//! data untouched.

use std::time::{Duration, Instant};

use tban_core::{Result, StatusBuffer, StatusSource, TbanError, Variant};
use tracing::{debug, warn};

use crate::transport::{SerialLink, Transport};

/// Per-variant snapshots plus the time of the last successful query
#[derive(Debug, Default)]
pub struct StatusCache {
    base: Option<Snapshot>,
    big: Option<Snapshot>,
    mini: Option<Snapshot>,
    last_query: Option<Instant>,
}

#[derive(Debug)]
struct Snapshot {
    buffer: StatusBuffer,
    taken: Instant,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, variant: Variant) -> &Option<Snapshot> {
        match variant {
            Variant::Base => &self.base,
            Variant::Big => &self.big,
            Variant::Mini => &self.mini,
        }
    }

    fn slot_mut(&mut self, variant: Variant) -> &mut Option<Snapshot> {
        match variant {
            Variant::Base => &mut self.base,
            Variant::Big => &mut self.big,
            Variant::Mini => &mut self.mini,
        }
    }

    /// Fetch and store the full status vector of `variant`
    ///
    /// `settle` is slept between the request and the read.
    pub fn query<L: SerialLink>(
        &mut self,
        transport: &mut Transport<L>,
        variant: Variant,
        settle: Duration,
        timeout: Duration,
    ) -> Result<&StatusBuffer> {
        transport.send(&variant.query_frame())?;
        std::thread::sleep(settle);
        let wire = transport.receive(variant.wire_len(), timeout)?;

        let buffer = StatusBuffer::from_wire(variant, &wire).map_err(|e| {
            warn!("Discarding {} status: {}", variant, e);
            e
        })?;
        debug!("Stored {} status ({} bytes)", variant, buffer.len());
        Ok(self.store(buffer))
    }

    /// Re-query only when the stored snapshot is missing or older than `max_age`
    pub fn query_if_stale<L: SerialLink>(
        &mut self,
        transport: &mut Transport<L>,
        variant: Variant,
        max_age: Duration,
        settle: Duration,
        timeout: Duration,
    ) -> Result<&StatusBuffer> {
        let fresh = self
            .age(variant)
            .map(|age| age < max_age)
            .unwrap_or(false);
        if fresh {
            return self.snapshot(variant).ok_or(TbanError::NotQueried(variant));
        }
        self.query(transport, variant, settle, timeout)
    }

    fn store(&mut self, buffer: StatusBuffer) -> &StatusBuffer {
        let now = Instant::now();
        self.last_query = Some(now);
        let slot = self.slot_mut(buffer.variant());
        &slot.insert(Snapshot { buffer, taken: now }).buffer
    }

    /// Install a captured buffer without touching the link
    pub fn load_snapshot(&mut self, variant: Variant, bytes: &[u8]) -> Result<()> {
        let buffer = StatusBuffer::from_wire(variant, bytes)?;
        self.store(buffer);
        Ok(())
    }

    /// Byte `index` of the stored `variant` snapshot
    pub fn get(&self, variant: Variant, index: usize) -> Result<u8> {
        self.snapshot(variant)
            .ok_or(TbanError::NotQueried(variant))?
            .get(index)
    }

    /// Whether the stored snapshot passes the variant's sentinel check
    pub fn present(&self, variant: Variant) -> bool {
        self.snapshot(variant)
            .map(StatusBuffer::is_present)
            .unwrap_or(false)
    }

    pub fn snapshot(&self, variant: Variant) -> Option<&StatusBuffer> {
        self.slot(variant).as_ref().map(|s| &s.buffer)
    }

    /// Completion time of the most recent successful query
    pub fn last_query(&self) -> Option<Instant> {
        self.last_query
    }

    pub fn age(&self, variant: Variant) -> Option<Duration> {
        self.slot(variant).as_ref().map(|s| s.taken.elapsed())
    }

    /// Forget `variant`'s snapshot
    pub fn invalidate(&mut self, variant: Variant) {
        *self.slot_mut(variant) = None;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl StatusSource for StatusCache {
    fn status_byte(&self, variant: Variant, index: usize) -> Result<u8> {
        self.get(variant, index)
    }
}
