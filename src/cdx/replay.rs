//! Re-aggregation of a previously written summary.

use crate::cdx::content_type::canonical_content_type;
use crate::cdx::filter::FilterEngine;
use crate::cdx::format::Separator;
use crate::cdx::normalize::{
    BucketKey, CanonicalKey, NormalizeOptions, NormalizedRecord, ScopeKey, WILDCARD,
    time_bucket,
};
use crate::cdx::tally::{Tally, TallyStore};
use crate::cdx::warn::{self, WarnEvent};

const CURRENT_FIELDS: usize = 9;
const LEGACY_FIELDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Current,
    Legacy,
}

impl Layout {
    fn detect(field_count: usize) -> Option<Self> {
        match field_count {
            CURRENT_FIELDS => Some(Layout::Current),
            LEGACY_FIELDS => Some(Layout::Legacy),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: u64,
    pub kept: u64,
    pub filtered: u64,
    pub malformed: u64,
    pub legacy: u64,
}

fn unquote(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .unwrap_or(field)
}

pub fn split_fields(line: &str, separator: Separator) -> Vec<&str> {
    line.split(separator.as_str()).map(unquote).collect()
}

fn parse_number(raw: &str, what: &str, collection: &str) -> u64 {
    raw.parse::<u64>().unwrap_or_else(|_| {
        warn::emit(&WarnEvent {
            code: "bad_number",
            stage: "replay",
            collection,
            domain: "",
            reason: &format!("non-numeric {what} {raw:?}, counted as 0"),
        });
        0
    })
}

fn parse_fields(fields: &[&str], opts: NormalizeOptions) -> Option<(Layout, NormalizedRecord)> {
    let Some(layout) = Layout::detect(fields.len()) else {
        warn::emit(&WarnEvent {
            code: "bad_layout",
            stage: "replay",
            collection: fields.first().copied().unwrap_or_default(),
            domain: "",
            reason: &format!("expected 9 or 6 fields, got {}", fields.len()),
        });
        return None;
    };

    let (collection, tld, sld, rest) = match layout {
        Layout::Current => (fields[0], fields[1], fields[2], &fields[3..]),
        Layout::Legacy => (fields[0], WILDCARD, WILDCARD, &fields[1..]),
    };

    let record = NormalizedRecord {
        key: CanonicalKey {
            scope: ScopeKey {
                collection: collection.to_string(),
                tld: tld.to_string(),
                sld: sld.to_string(),
            },
            bucket: BucketKey {
                time_bucket: time_bucket(rest[0], opts.years),
                content_type: canonical_content_type(rest[1], opts.content_type),
                extension: rest[2].to_string(),
            },
        },
        count: parse_number(rest[3], "count", collection),
        bytes: parse_number(rest[4], "bytes", collection),
    };
    Some((layout, record))
}

/// Parses one summary line back into a key and its tally.
pub fn parse_line(
    line: &str,
    separator: Separator,
    opts: NormalizeOptions,
) -> Option<(Layout, NormalizedRecord)> {
    let line = line.trim_end_matches(['\r', '\n']);
    parse_fields(&split_fields(line, separator), opts)
}

/// Feeds a whole summary file through filters and merges into `store`.
///
/// The separator is sniffed from the first data line and used for the rest
/// of the file.
pub fn replay_into(
    text: &str,
    opts: NormalizeOptions,
    engine: &FilterEngine,
    store: &mut TallyStore,
) -> ReplayStats {
    let mut stats = ReplayStats::default();
    let mut separator = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        stats.lines += 1;
        let sep = *separator.get_or_insert_with(|| Separator::sniff(line));

        let Some((layout, record)) = parse_line(line, sep, opts) else {
            stats.malformed += 1;
            continue;
        };
        if layout == Layout::Legacy {
            stats.legacy += 1;
        }

        match engine.apply(record.key) {
            Some(key) => {
                stats.kept += 1;
                store.accumulate(
                    key,
                    Tally {
                        count: record.count,
                        bytes: record.bytes,
                    },
                );
            }
            None => stats.filtered += 1,
        }
    }
    stats
}
