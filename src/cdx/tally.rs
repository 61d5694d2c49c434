use crate::cdx::normalize::{BucketKey, CanonicalKey, ScopeKey};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub count: u64,
    pub bytes: u64,
}

impl Tally {
    pub fn add(&mut self, other: Tally) {
        self.count = self.count.saturating_add(other.count);
        self.bytes = self.bytes.saturating_add(other.bytes);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub key: CanonicalKey,
    pub tally: Tally,
}

/// Counts and byte totals keyed by scope, then by bucket.
///
/// Both levels are ordered maps, so draining yields rows already sorted by
/// collection, top domain, sub domain, time bucket, content type, extension.
#[derive(Debug, Default)]
pub struct TallyStore {
    scopes: BTreeMap<ScopeKey, BTreeMap<BucketKey, Tally>>,
}

impl TallyStore {
    /// Adds `tally` to the entry for `key`, creating it on first sight.
    pub fn accumulate(&mut self, key: CanonicalKey, tally: Tally) {
        self.scopes
            .entry(key.scope)
            .or_default()
            .entry(key.bucket)
            .or_default()
            .add(tally);
    }

    pub fn drain_sorted(&mut self, scope: &ScopeKey) -> Vec<SummaryRow> {
        let Some(buckets) = self.scopes.remove(scope) else {
            return Vec::new();
        };
        buckets
            .into_iter()
            .map(|(bucket, tally)| SummaryRow {
                key: CanonicalKey {
                    scope: scope.clone(),
                    bucket,
                },
                tally,
            })
            .collect()
    }

    pub fn drain_all(&mut self) -> Vec<SummaryRow> {
        let scopes = std::mem::take(&mut self.scopes);
        let mut rows = Vec::new();
        for (scope, buckets) in scopes {
            rows.extend(buckets.into_iter().map(|(bucket, tally)| SummaryRow {
                key: CanonicalKey {
                    scope: scope.clone(),
                    bucket,
                },
                tally,
            }));
        }
        rows
    }

    /// Drops everything under `scope` without emitting it.
    pub fn discard(&mut self, scope: &ScopeKey) -> usize {
        self.scopes.remove(scope).map_or(0, |b| b.len())
    }

    pub fn len(&self) -> usize {
        self.scopes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
