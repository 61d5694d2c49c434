//! Turns raw index lines into canonical grouping keys.

use crate::cdx::content_type::{ContentTypeOptions, canonical_content_type};
use crate::cdx::warn::{self, WarnEvent};
use regex::Regex;
use std::sync::LazyLock;

pub const WILDCARD: &str = "*";
pub const NO_EXTENSION: &str = "-";
pub const IP_TOKEN: &str = "IP";

const RESERVED_PREFIXES: [&str; 1] = ["dns:"];
const LIVE_FIELD_COUNT: usize = 11;
const MAX_EXTENSION_LEN: usize = 5;

static IPV4_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}(?:[):/]|$)").expect("static regex")
});
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9-]+)(?:,([A-Za-z0-9-]+))?").expect("static regex")
});

/// Collection plus domain pair; the unit a live run flushes at once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeKey {
    pub collection: String,
    pub tld: String,
    pub sld: String,
}

impl ScopeKey {
    /// Host the index service can range-query from to reach this scope again.
    pub fn resume_host(&self) -> String {
        if self.sld.is_empty() {
            self.tld.clone()
        } else {
            format!("{}.{}", self.sld, self.tld)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub time_bucket: String,
    pub content_type: String,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalKey {
    pub scope: ScopeKey,
    pub bucket: BucketKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub key: CanonicalKey,
    pub count: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Blank,
    Header,
    Reserved,
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Record(NormalizedRecord),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub years: bool,
    pub content_type: ContentTypeOptions,
}

pub fn split_domain(field: &str) -> Option<(String, String)> {
    if IPV4_RE.is_match(field) {
        return Some((IP_TOKEN.to_string(), String::new()));
    }
    let caps = DOMAIN_RE.captures(field)?;
    let tld = caps.get(1)?.as_str().to_ascii_lowercase();
    let sld = caps
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    Some((tld, sld))
}

pub fn time_bucket(timestamp: &str, years: bool) -> String {
    if timestamp == WILDCARD {
        return timestamp.to_string();
    }
    let width = if years { 4 } else { 6 };
    timestamp.chars().take(width).collect()
}

fn unify_extension(ext: String) -> String {
    match ext.as_str() {
        "jpeg" => "jpg".to_string(),
        "htm" => "html".to_string(),
        _ => ext,
    }
}

/// Derives a short file extension from whatever follows the last `/` of
/// `url`, with any query string cut off.
pub fn derive_extension(url: &str, tld: &str, content_type: &str) -> String {
    let tail = url.rsplit('/').next().unwrap_or_default();
    let segment = tail.split('?').next().unwrap_or_default();

    let Some((_, candidate)) = segment.rsplit_once('.') else {
        return NO_EXTENSION.to_string();
    };
    let candidate = candidate.to_ascii_lowercase();
    let well_formed = (1..=MAX_EXTENSION_LEN).contains(&candidate.len())
        && candidate.chars().all(|c| c.is_ascii_alphanumeric())
        && candidate.chars().any(|c| c.is_ascii_alphabetic());
    if !well_formed {
        return NO_EXTENSION.to_string();
    }

    let ext = unify_extension(candidate);
    if ext == tld && content_type == "text/html" {
        return NO_EXTENSION.to_string();
    }
    ext
}

fn parse_size(raw: &str, collection: &str, domain: &str) -> u64 {
    match raw.parse::<u64>() {
        Ok(size) => size,
        Err(_) => {
            warn::emit(&WarnEvent {
                code: "bad_size",
                stage: "normalize",
                collection,
                domain,
                reason: &format!("non-numeric size {raw:?}, counted as 0"),
            });
            0
        }
    }
}

/// Normalizer for lines streamed from the index service.
///
/// Holds the previous record's domain pair so an unparseable domain can be
/// attributed to the group that was in flight.
#[derive(Debug, Default)]
pub struct LiveNormalizer {
    opts: NormalizeOptions,
    last_domain: Option<(String, String)>,
}

impl LiveNormalizer {
    pub fn new(opts: NormalizeOptions) -> Self {
        Self {
            opts,
            last_domain: None,
        }
    }

    /// Forgets the previous domain pair; a new collection starts clean.
    pub fn reset(&mut self) {
        self.last_domain = None;
    }

    pub fn normalize(&mut self, collection: &str, line: &str) -> LineOutcome {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return LineOutcome::Skipped(SkipReason::Blank);
        }
        if line.trim_start().starts_with("CDX") {
            return LineOutcome::Skipped(SkipReason::Header);
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let domain_field = fields[0];
        if RESERVED_PREFIXES.iter().any(|p| domain_field.starts_with(p)) {
            log::debug!("skipping reserved record {domain_field}");
            return LineOutcome::Skipped(SkipReason::Reserved);
        }
        if fields.len() < LIVE_FIELD_COUNT {
            warn::emit(&WarnEvent {
                code: "short_record",
                stage: "normalize",
                collection,
                domain: domain_field,
                reason: &format!("expected {LIVE_FIELD_COUNT} fields, got {}", fields.len()),
            });
            return LineOutcome::Skipped(SkipReason::Malformed);
        }

        let (tld, sld) = match split_domain(domain_field) {
            Some(pair) => pair,
            None => {
                let Some(previous) = self.last_domain.clone() else {
                    warn::emit(&WarnEvent {
                        code: "bad_domain",
                        stage: "normalize",
                        collection,
                        domain: domain_field,
                        reason: "unparseable domain with no previous record to fall back on",
                    });
                    return LineOutcome::Skipped(SkipReason::Malformed);
                };
                warn::emit(&WarnEvent {
                    code: "bad_domain",
                    stage: "normalize",
                    collection,
                    domain: domain_field,
                    reason: "unparseable domain, reusing previous domain",
                });
                previous
            }
        };
        self.last_domain = Some((tld.clone(), sld.clone()));

        let raw_content_type = fields[3].to_lowercase();
        let extension = derive_extension(fields[2], &tld, &raw_content_type);
        let content_type = canonical_content_type(fields[3], self.opts.content_type);
        let bytes = parse_size(fields[8], collection, domain_field);

        LineOutcome::Record(NormalizedRecord {
            key: CanonicalKey {
                scope: ScopeKey {
                    collection: collection.to_string(),
                    tld,
                    sld,
                },
                bucket: BucketKey {
                    time_bucket: time_bucket(fields[1], self.opts.years),
                    content_type,
                    extension,
                },
            },
            count: 1,
            bytes,
        })
    }
}
