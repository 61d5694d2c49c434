use crate::cdx::flush::FlushController;
use crate::cdx::format::RowWriter;
use crate::cdx::normalize::{IP_TOKEN, LineOutcome, LiveNormalizer, ScopeKey, SkipReason};
use crate::cdx::warn::{self, WarnEvent};
use crate::error::FetchError;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Where a query against one collection begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPoint {
    Beginning,
    From(String),
    Exact(String),
}

impl StartPoint {
    pub fn query(&self) -> (&str, &'static str) {
        match self {
            StartPoint::Beginning => ("", "range"),
            StartPoint::From(url) => (url, "range"),
            StartPoint::Exact(url) => (url, "exact"),
        }
    }
}

pub trait IndexSource {
    fn open(&self, collection: &str, start: &StartPoint) -> io::Result<Box<dyn BufRead>>;
}

pub struct HttpIndexSource {
    client: Client,
    base_url: String,
}

impl HttpIndexSource {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        // Only connecting is bounded; a collection stream may run for hours.
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(None::<Duration>)
            .build()
            .context("failed to build index service client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl IndexSource for HttpIndexSource {
    fn open(&self, collection: &str, start: &StartPoint) -> io::Result<Box<dyn BufRead>> {
        let (url, match_type) = start.query();
        let endpoint = format!("{}/{}", self.base_url, collection);
        log::info!("querying {endpoint} url={url:?} matchType={match_type}");
        let response = self
            .client
            .get(&endpoint)
            .query(&[
                ("url", url),
                ("matchType", match_type),
                ("filter", "status:200"),
            ])
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(io::Error::other)?;
        Ok(Box::new(BufReader::new(response)))
    }
}

/// Collection names are the entries of the index service's data directory.
pub fn discover_collections(dir: &Path) -> Result<Vec<String>> {
    let read_dir =
        fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(ToOwned::to_owned) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    pub retry_delay: Duration,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionOutcome {
    pub completed: bool,
    pub records: u64,
    pub rejected: u64,
    pub retries: u32,
}

/// Picks where to restart after the open group was thrown away.
///
/// IP groups cannot be addressed by host, so they restart at the anchor.
fn resume_point(anchor: &StartPoint, current: &StartPoint, dropped: Option<&ScopeKey>) -> StartPoint {
    if matches!(anchor, StartPoint::Exact(_)) {
        return anchor.clone();
    }
    match dropped {
        Some(scope) if scope.tld == IP_TOKEN => anchor.clone(),
        Some(scope) => StartPoint::From(scope.resume_host()),
        None => current.clone(),
    }
}

pub struct FetchDriver<'a, S: IndexSource> {
    source: &'a S,
    normalizer: LiveNormalizer,
    settings: FetchSettings,
    anchor: StartPoint,
}

impl<'a, S: IndexSource> FetchDriver<'a, S> {
    pub fn new(
        source: &'a S,
        normalizer: LiveNormalizer,
        settings: FetchSettings,
        anchor: StartPoint,
    ) -> Self {
        Self {
            source,
            normalizer,
            settings,
            anchor,
        }
    }

    /// Streams one query into `flush`. `received` counts every line the
    /// collection has delivered so far, across attempts.
    fn attempt<W: Write>(
        &mut self,
        collection: &str,
        start: &StartPoint,
        flush: &mut FlushController,
        out: &mut RowWriter<W>,
        received: &mut u64,
    ) -> Result<(), FetchError> {
        let mut reader = self
            .source
            .open(collection, start)
            .map_err(|source| broken_stream(collection, *received, source))?;

        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                Err(source) => return Err(broken_stream(collection, *received, source)),
            }

            let line = String::from_utf8_lossy(&buf);
            match self.normalizer.normalize(collection, &line) {
                LineOutcome::Record(record) => {
                    *received += 1;
                    flush.ingest(record, out)?;
                }
                LineOutcome::Skipped(SkipReason::Blank | SkipReason::Header) => {}
                LineOutcome::Skipped(_) => {
                    *received += 1;
                    flush.reject();
                }
            }
        }
    }

    /// Streams one collection into `flush`, retrying from the last safe
    /// group boundary whenever the collection breaks after delivering data.
    pub fn run_collection<W: Write>(
        &mut self,
        collection: &str,
        flush: &mut FlushController,
        out: &mut RowWriter<W>,
    ) -> Result<CollectionOutcome> {
        self.normalizer.reset();
        let before = flush.committed();
        let mut outcome = CollectionOutcome::default();
        let mut start = self.anchor.clone();
        let mut received = 0u64;
        let mut attempts = 0u32;

        let completed = loop {
            attempts += 1;
            match self.attempt(collection, &start, flush, out, &mut received) {
                Ok(()) => {
                    flush.flush(out)?;
                    break true;
                }
                Err(FetchError::Fatal(err)) => return Err(err),
                Err(FetchError::Unavailable { source, .. }) => {
                    flush.rollback();
                    log::error!("skipping collection {collection}: {source}");
                    break false;
                }
                Err(err @ FetchError::Retryable { .. }) => {
                    let dropped = flush.rollback();
                    let domain = dropped.as_ref().map(ScopeKey::resume_host).unwrap_or_default();
                    if attempts >= self.settings.max_attempts {
                        warn::emit(&WarnEvent {
                            code: "retries_exhausted",
                            stage: "fetch",
                            collection,
                            domain: &domain,
                            reason: &err.to_string(),
                        });
                        break false;
                    }
                    start = resume_point(&self.anchor, &start, dropped.as_ref());
                    warn::emit(&WarnEvent {
                        code: "stream_broken",
                        stage: "fetch",
                        collection,
                        domain: &domain,
                        reason: &format!("{err}; retrying from {:?}", start.query().0),
                    });
                    outcome.retries += 1;
                    thread::sleep(self.settings.retry_delay);
                }
            }
        };

        let counts = flush.committed().since(before);
        outcome.completed = completed;
        outcome.records = counts.records;
        outcome.rejected = counts.rejected;
        Ok(outcome)
    }
}

/// A collection that has delivered nothing is unavailable; one that broke
/// part way through is worth another attempt.
fn broken_stream(collection: &str, received: u64, source: io::Error) -> FetchError {
    if received == 0 {
        FetchError::Unavailable {
            collection: collection.to_string(),
            source,
        }
    } else {
        FetchError::Retryable {
            collection: collection.to_string(),
            records: received,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdx::format::Separator;
    use crate::cdx::normalize::NormalizeOptions;
    use std::cell::RefCell;
    use std::io::{Cursor, Read};
    use tempfile::tempdir;

    /// Yields `data`, then either EOF or an I/O error.
    struct Scripted {
        data: Cursor<Vec<u8>>,
        fail: bool,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.data.read(buf)?;
            if n == 0 && self.fail {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            Ok(n)
        }
    }

    #[derive(Default)]
    struct FakeSource {
        responses: RefCell<Vec<Option<(String, bool)>>>,
        queries: RefCell<Vec<StartPoint>>,
    }

    impl FakeSource {
        fn push(&self, body: &str, fail: bool) {
            self.responses.borrow_mut().push(Some((body.to_string(), fail)));
        }

        fn refuse(&self) {
            self.responses.borrow_mut().push(None);
        }
    }

    impl IndexSource for FakeSource {
        fn open(&self, _collection: &str, start: &StartPoint) -> io::Result<Box<dyn BufRead>> {
            self.queries.borrow_mut().push(start.clone());
            let mut responses = self.responses.borrow_mut();
            let next = if responses.is_empty() {
                None
            } else {
                responses.remove(0)
            };
            let Some((body, fail)) = next else {
                return Err(io::Error::other("connection refused"));
            };
            Ok(Box::new(BufReader::new(Scripted {
                data: Cursor::new(body.into_bytes()),
                fail,
            })))
        }
    }

    fn line(domain: &str, url: &str, size: u64) -> String {
        format!("{domain} 20220101000000 {url} text/html 200 X - - {size} 0 f.warc.gz\n")
    }

    fn settings() -> FetchSettings {
        FetchSettings {
            retry_delay: Duration::ZERO,
            max_attempts: 5,
        }
    }

    fn drive(source: &FakeSource, anchor: StartPoint) -> (Vec<String>, CollectionOutcome) {
        let mut driver = FetchDriver::new(
            source,
            LiveNormalizer::new(NormalizeOptions::default()),
            settings(),
            anchor,
        );
        let mut flush = FlushController::new();
        let mut out = RowWriter::new(Vec::new(), Separator::Comma);
        let outcome = driver.run_collection("A", &mut flush, &mut out).unwrap();
        flush.finish(&mut out).unwrap();
        let raw = String::from_utf8(out.into_inner().unwrap()).unwrap();
        (raw.lines().map(ToOwned::to_owned).collect(), outcome)
    }

    #[test]
    fn clean_stream_flushes_every_group() {
        let source = FakeSource::default();
        source.push(
            &format!(
                "{}{}{}",
                line("se,kb)/", "http://kb.se/", 10),
                line("se,kb)/a.pdf", "http://kb.se/a.pdf", 20),
                line("se,sr)/", "http://sr.se/", 30),
            ),
            false,
        );
        let (rows, outcome) = drive(&source, StartPoint::Beginning);
        assert_eq!(rows.len(), 3);
        assert!(outcome.completed);
        assert_eq!(outcome.records, 3);
        assert_eq!(outcome.retries, 0);
    }

    #[test]
    fn broken_stream_rolls_back_and_resumes_at_open_group() {
        let source = FakeSource::default();
        source.push(
            &format!(
                "{}{}",
                line("se,kb)/", "http://kb.se/", 10),
                line("se,sr)/", "http://sr.se/", 999),
            ),
            true,
        );
        source.push(&line("se,sr)/", "http://sr.se/", 30), false);

        let (rows, outcome) = drive(&source, StartPoint::Beginning);
        assert_eq!(
            source.queries.borrow().as_slice(),
            &[StartPoint::Beginning, StartPoint::From("sr.se".into())]
        );
        assert_eq!(rows.len(), 2);
        assert!(rows[1].contains("\"sr\"") && rows[1].contains("\"30\""));
        assert!(!rows.iter().any(|r| r.contains("999")));
        assert_eq!(outcome.retries, 1);
        assert!(outcome.completed);
        assert_eq!(outcome.records, 2);
    }

    #[test]
    fn refused_reconnect_after_data_is_retried() {
        let source = FakeSource::default();
        source.push(
            &format!(
                "{}{}",
                line("se,kb)/", "http://kb.se/", 10),
                line("se,sr)/", "http://sr.se/", 999),
            ),
            true,
        );
        source.refuse();
        source.push(&line("se,sr)/", "http://sr.se/", 30), false);

        let (rows, outcome) = drive(&source, StartPoint::Beginning);
        assert_eq!(
            source.queries.borrow().as_slice(),
            &[
                StartPoint::Beginning,
                StartPoint::From("sr.se".into()),
                StartPoint::From("sr.se".into()),
            ]
        );
        assert!(outcome.completed);
        assert_eq!(outcome.retries, 2);
        assert_eq!(rows.len(), 2);
        assert!(rows[1].contains("\"sr\"") && rows[1].contains("\"30\""));
    }

    #[test]
    fn each_collection_starts_without_a_fallback_domain() {
        let source = FakeSource::default();
        source.push(&line("se,kb)/", "http://kb.se/", 10), false);
        source.push(&line("%%%", "http://x/", 20), false);

        let mut driver = FetchDriver::new(
            &source,
            LiveNormalizer::new(NormalizeOptions::default()),
            settings(),
            StartPoint::Beginning,
        );
        let mut flush = FlushController::new();
        let mut out = RowWriter::new(Vec::new(), Separator::Comma);
        let first = driver.run_collection("A", &mut flush, &mut out).unwrap();
        let second = driver.run_collection("B", &mut flush, &mut out).unwrap();
        flush.finish(&mut out).unwrap();

        assert_eq!(first.records, 1);
        assert_eq!(second.records, 0);
        assert_eq!(second.rejected, 1);
        assert!(second.completed);
        assert_eq!(out.rows_written(), 1);
    }

    #[test]
    fn broken_ip_group_restarts_at_anchor() {
        let source = FakeSource::default();
        source.push(&line("10.0.0.1)/", "http://10.0.0.1/", 10), true);
        source.push(&line("10.0.0.1)/", "http://10.0.0.1/", 10), false);
        let (rows, _) = drive(&source, StartPoint::From("10.0.0.1".into()));
        assert_eq!(
            source.queries.borrow().as_slice(),
            &[StartPoint::From("10.0.0.1".into()), StartPoint::From("10.0.0.1".into())]
        );
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn exact_queries_are_reissued_unchanged() {
        let anchor = StartPoint::Exact("http://kb.se/".into());
        let dropped = ScopeKey {
            collection: "A".into(),
            tld: "se".into(),
            sld: "kb".into(),
        };
        assert_eq!(resume_point(&anchor, &anchor, Some(&dropped)), anchor);
    }

    #[test]
    fn failure_without_records_skips_collection() {
        let source = FakeSource::default();
        let (rows, outcome) = drive(&source, StartPoint::Beginning);
        assert!(rows.is_empty());
        assert!(!outcome.completed);
        assert_eq!(source.queries.borrow().len(), 1);
    }

    #[test]
    fn retries_stop_at_max_attempts() {
        let source = FakeSource::default();
        for _ in 0..10 {
            source.push(&line("se,kb)/", "http://kb.se/", 10), true);
        }
        let (rows, outcome) = drive(&source, StartPoint::Beginning);
        assert!(rows.is_empty());
        assert!(!outcome.completed);
        assert_eq!(source.queries.borrow().len(), 5);
        assert_eq!(outcome.retries, 4);
    }

    #[test]
    fn query_parameters_follow_start_point() {
        assert_eq!(StartPoint::Beginning.query(), ("", "range"));
        assert_eq!(StartPoint::From("kb.se".into()).query(), ("kb.se", "range"));
        assert_eq!(StartPoint::Exact("http://kb.se/".into()).query(), ("http://kb.se/", "exact"));
    }

    #[test]
    fn discovery_lists_sorted_visible_entries() {
        let tmp = tempdir().unwrap();
        for name in ["web-2023", ".lock", "web-2021"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }
        assert_eq!(
            discover_collections(tmp.path()).unwrap(),
            vec!["web-2021".to_string(), "web-2023".to_string()]
        );
    }
}
