//! Replay-time filters and wildcard merges.

use crate::cdx::normalize::{CanonicalKey, WILDCARD};
use anyhow::{Context, Result};
use regex::Regex;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeFlags {
    pub collections: bool,
    pub tlds: bool,
    pub slds: bool,
    pub time: bool,
    pub content_types: bool,
    pub extensions: bool,
}

impl MergeFlags {
    pub fn any(&self) -> bool {
        self.collections
            || self.tlds
            || self.slds
            || self.time
            || self.content_types
            || self.extensions
    }
}

/// Raw filter settings as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub collections: Vec<String>,
    pub tlds: Vec<String>,
    pub slds: Vec<String>,
    pub content_types: Vec<String>,
    pub extensions: Vec<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub merge: MergeFlags,
}

impl FilterOptions {
    pub fn is_active(&self) -> bool {
        !self.collections.is_empty()
            || !self.tlds.is_empty()
            || !self.slds.is_empty()
            || !self.content_types.is_empty()
            || !self.extensions.is_empty()
            || self.start.is_some()
            || self.end.is_some()
            || self.merge.any()
    }
}

/// Independent patterns; a value passes when any one of them matches.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    pub fn compile(label: &str, raw: &[String]) -> Result<Option<Self>> {
        if raw.is_empty() {
            return Ok(None);
        }
        let patterns = raw
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid {label} filter {p:?}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Self { patterns }))
    }

    pub fn matches(&self, value: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(value))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    collections: Option<PatternSet>,
    tlds: Option<PatternSet>,
    slds: Option<PatternSet>,
    content_types: Option<PatternSet>,
    extensions: Option<PatternSet>,
    start: Option<String>,
    end: Option<String>,
    merge: MergeFlags,
}

fn passes(set: &Option<PatternSet>, value: &str) -> bool {
    set.as_ref().is_none_or(|s| s.matches(value))
}

impl FilterEngine {
    pub fn new(opts: &FilterOptions) -> Result<Self> {
        Ok(Self {
            collections: PatternSet::compile("collection", &opts.collections)?,
            tlds: PatternSet::compile("top-domain", &opts.tlds)?,
            slds: PatternSet::compile("sub-domain", &opts.slds)?,
            content_types: PatternSet::compile("content-type", &opts.content_types)?,
            extensions: PatternSet::compile("extension", &opts.extensions)?,
            start: opts.start.clone(),
            // "2022" as an end bound covers 202212.
            end: opts.end.as_ref().map(|e| format!("{e}99")),
            merge: opts.merge,
        })
    }

    fn in_time_range(&self, bucket: &str) -> bool {
        let after_start = self.start.as_deref().is_none_or(|s| bucket >= s);
        let before_end = self.end.as_deref().is_none_or(|e| bucket <= e);
        after_start && before_end
    }

    pub fn keeps(&self, key: &CanonicalKey) -> bool {
        passes(&self.collections, &key.scope.collection)
            && passes(&self.tlds, &key.scope.tld)
            && passes(&self.slds, &key.scope.sld)
            && passes(&self.content_types, &key.bucket.content_type)
            && passes(&self.extensions, &key.bucket.extension)
            && self.in_time_range(&key.bucket.time_bucket)
    }

    pub fn merge(&self, mut key: CanonicalKey) -> CanonicalKey {
        let m = self.merge;
        for (enabled, field) in [
            (m.collections, &mut key.scope.collection),
            (m.tlds, &mut key.scope.tld),
            (m.slds, &mut key.scope.sld),
            (m.time, &mut key.bucket.time_bucket),
            (m.content_types, &mut key.bucket.content_type),
            (m.extensions, &mut key.bucket.extension),
        ] {
            if enabled {
                *field = WILDCARD.to_string();
            }
        }
        key
    }

    /// Filters, then merges; `None` means the record is dropped.
    pub fn apply(&self, key: CanonicalKey) -> Option<CanonicalKey> {
        if !self.keeps(&key) {
            return None;
        }
        Some(self.merge(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdx::normalize::{BucketKey, ScopeKey};

    fn key(collection: &str, tld: &str, sld: &str, tb: &str, ct: &str, ext: &str) -> CanonicalKey {
        CanonicalKey {
            scope: ScopeKey {
                collection: collection.into(),
                tld: tld.into(),
                sld: sld.into(),
            },
            bucket: BucketKey {
                time_bucket: tb.into(),
                content_type: ct.into(),
                extension: ext.into(),
            },
        }
    }

    #[test]
    fn empty_options_keep_everything_unchanged() {
        let engine = FilterEngine::new(&FilterOptions::default()).unwrap();
        let k = key("A", "se", "kb", "202201", "text/html", "html");
        assert_eq!(engine.apply(k.clone()), Some(k));
        assert!(!FilterOptions::default().is_active());
    }

    #[test]
    fn patterns_are_or_combined_per_dimension() {
        let engine = FilterEngine::new(&FilterOptions {
            tlds: vec!["^se$".into(), "^no$".into()],
            content_types: vec!["^image/".into()],
            ..Default::default()
        })
        .unwrap();
        assert!(engine.keeps(&key("A", "se", "kb", "202201", "image/png", "png")));
        assert!(engine.keeps(&key("A", "no", "nb", "202201", "image/gif", "gif")));
        assert!(!engine.keeps(&key("A", "dk", "kb", "202201", "image/png", "png")));
        assert!(!engine.keeps(&key("A", "se", "kb", "202201", "text/html", "html")));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = FilterEngine::new(&FilterOptions {
            extensions: vec!["(".into()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("extension"));
    }

    #[test]
    fn time_range_is_inclusive_and_tolerates_truncation() {
        let engine = FilterEngine::new(&FilterOptions {
            start: Some("202103".into()),
            end: Some("2022".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(engine.keeps(&key("A", "se", "kb", "202103", "-", "-")));
        assert!(engine.keeps(&key("A", "se", "kb", "202212", "-", "-")));
        assert!(!engine.keeps(&key("A", "se", "kb", "202102", "-", "-")));
        assert!(!engine.keeps(&key("A", "se", "kb", "202301", "-", "-")));
    }

    #[test]
    fn merge_rewrites_even_filtered_dimension() {
        let engine = FilterEngine::new(&FilterOptions {
            tlds: vec!["^se$".into()],
            merge: MergeFlags {
                tlds: true,
                time: true,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        let merged = engine
            .apply(key("A", "se", "kb", "202201", "text/html", "html"))
            .unwrap();
        assert_eq!(merged, key("A", "*", "kb", "*", "text/html", "html"));
        assert!(engine.apply(key("A", "dk", "kb", "202201", "-", "-")).is_none());
    }
}
