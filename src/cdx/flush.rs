use crate::cdx::format::RowWriter;
use crate::cdx::normalize::{NormalizedRecord, ScopeKey};
use crate::cdx::tally::{Tally, TallyStore};
use anyhow::{Result, bail};
use std::io::Write;

/// Input lines seen, split into usable records and rejected lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCounts {
    pub records: u64,
    pub rejected: u64,
}

impl LineCounts {
    pub fn since(self, earlier: LineCounts) -> LineCounts {
        LineCounts {
            records: self.records.saturating_sub(earlier.records),
            rejected: self.rejected.saturating_sub(earlier.rejected),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Accumulating,
    Flushing,
    Done,
}

/// Emits each (collection, domain pair) group as soon as the input moves
/// past it, so only one group is ever held in memory.
#[derive(Debug)]
pub struct FlushController {
    store: TallyStore,
    scope: Option<ScopeKey>,
    state: FlushState,
    scopes_flushed: u64,
    pending: LineCounts,
    committed: LineCounts,
}

impl Default for FlushController {
    fn default() -> Self {
        Self::new()
    }
}

impl FlushController {
    pub fn new() -> Self {
        Self {
            store: TallyStore::default(),
            scope: None,
            state: FlushState::Accumulating,
            scopes_flushed: 0,
            pending: LineCounts::default(),
            committed: LineCounts::default(),
        }
    }

    pub fn scopes_flushed(&self) -> u64 {
        self.scopes_flushed
    }

    /// Lines behind rows that were actually emitted; rolled back lines are
    /// not included.
    pub fn committed(&self) -> LineCounts {
        self.committed
    }

    /// Counts a line that produced no record against the open group.
    pub fn reject(&mut self) {
        self.pending.rejected += 1;
    }

    pub fn ingest<W: Write>(
        &mut self,
        record: NormalizedRecord,
        out: &mut RowWriter<W>,
    ) -> Result<()> {
        if self.state == FlushState::Done {
            bail!("record ingested after the summary was finished");
        }
        if self.scope.as_ref() != Some(&record.key.scope) {
            self.flush(out)?;
            self.scope = Some(record.key.scope.clone());
        }
        self.pending.records += 1;
        self.store.accumulate(
            record.key,
            Tally {
                count: record.count,
                bytes: record.bytes,
            },
        );
        Ok(())
    }

    /// Emits the open group, sorted, and clears it.
    pub fn flush<W: Write>(&mut self, out: &mut RowWriter<W>) -> Result<()> {
        if let Some(scope) = self.scope.take() {
            self.state = FlushState::Flushing;
            for row in self.store.drain_sorted(&scope) {
                out.write_row(&row)?;
            }
            self.scopes_flushed += 1;
            self.state = FlushState::Accumulating;
        }
        self.committed.records += self.pending.records;
        self.committed.rejected += self.pending.rejected;
        self.pending = LineCounts::default();
        Ok(())
    }

    pub fn finish<W: Write>(&mut self, out: &mut RowWriter<W>) -> Result<()> {
        self.flush(out)?;
        self.state = FlushState::Done;
        Ok(())
    }

    /// Throws away the open group; returns it so the caller can resume there.
    pub fn rollback(&mut self) -> Option<ScopeKey> {
        self.pending = LineCounts::default();
        let scope = self.scope.take()?;
        let dropped = self.store.discard(&scope);
        log::debug!(
            "discarded {dropped} partial buckets for {}/{},{}",
            scope.collection,
            scope.tld,
            scope.sld
        );
        Some(scope)
    }
}

/// Emits a whole store at once in full key order.
pub fn flush_all<W: Write>(store: &mut TallyStore, out: &mut RowWriter<W>) -> Result<u64> {
    if store.is_empty() {
        return Ok(0);
    }
    let rows = store.drain_all();
    for row in &rows {
        out.write_row(row)?;
    }
    Ok(rows.len() as u64)
}
