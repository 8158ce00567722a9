//! End-of-run operation report.
//!
//! Per-item failures are accumulated here instead of raised, so a run
//! always produces a summary even when individual items failed. The core
//! never prints user-facing text; the CLI renders this.

/// Counters and failure buckets for one sync or restore run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OpReport {
    /// Messages fetched (metadata+content pairs written).
    pub fetched: u64,
    /// Messages pushed to the remote during restore.
    pub pushed: u64,
    /// Messages skipped because the archive already matched the remote.
    pub skipped: u64,
    /// Times the connection was re-established mid-run.
    pub reconnections: u64,
    /// Items moved to the quarantine area.
    pub quarantined: u64,
    /// Items the server refused to hand over, even individually.
    pub cannot_fetched: u64,
    /// Items whose response carried no usable content.
    pub empty: u64,
    /// Items moved to the bin because they vanished remotely.
    pub cleaned: u64,
    /// Ids behind the `empty` counter.
    pub empty_ids: Vec<u32>,
    /// Ids behind the `cannot_fetched` counter.
    pub cannot_fetched_ids: Vec<u32>,
}

impl OpReport {
    /// Records an item the server refused to hand over.
    pub fn note_cannot_fetch(&mut self, id: u32) {
        self.cannot_fetched += 1;
        self.cannot_fetched_ids.push(id);
    }

    /// Records an item whose response had no usable content.
    pub fn note_empty(&mut self, id: u32) {
        self.empty += 1;
        self.empty_ids.push(id);
    }

    /// True when every item went through cleanly.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.quarantined == 0 && self.cannot_fetched == 0 && self.empty == 0
    }
}
