use anyhow::Result;
use std::path::PathBuf;

use crate::cdx::config::CdxConfig;
use crate::cdx::fetch::{
    FetchDriver, FetchSettings, HttpIndexSource, IndexSource, StartPoint, discover_collections,
};
use crate::cdx::flush::FlushController;
use crate::cdx::format::Separator;
use crate::cdx::normalize::{LiveNormalizer, NormalizeOptions};
use crate::commands::{CommandReport, SummaryWriter, close_writer, open_writer};
use crate::error::SummaryError;

#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub collections: Vec<String>,
    pub start: StartPoint,
    pub normalize: NormalizeOptions,
    pub separator: Separator,
    pub out: Option<PathBuf>,
}

fn resolve_collections(cfg: &CdxConfig, opts: &SummarizeOptions) -> Result<Vec<String>> {
    if !opts.collections.is_empty() {
        return Ok(opts.collections.clone());
    }
    let Some(dir) = cfg.index.dir.as_deref() else {
        return Err(SummaryError::NoCollections.into());
    };
    let found = discover_collections(dir)?;
    if found.is_empty() {
        return Err(SummaryError::NoCollections.into());
    }
    log::info!("discovered {} collections in {}", found.len(), dir.display());
    Ok(found)
}

/// Streams every collection through normalize → flush → writer.
pub fn summarize_into<S: IndexSource>(
    source: &S,
    settings: FetchSettings,
    collections: &[String],
    opts: &SummarizeOptions,
    writer: &mut SummaryWriter,
    report: &mut CommandReport,
) -> Result<()> {
    let mut driver = FetchDriver::new(
        source,
        LiveNormalizer::new(opts.normalize),
        settings,
        opts.start.clone(),
    );
    let mut flush = FlushController::new();
    let (mut records, mut rejected, mut retries, mut skipped) = (0u64, 0u64, 0u32, 0usize);

    for collection in collections {
        log::info!("summarizing collection {collection}");
        let outcome = driver.run_collection(collection, &mut flush, writer)?;
        records += outcome.records;
        rejected += outcome.rejected;
        retries += outcome.retries;
        if !outcome.completed {
            skipped += 1;
            report.issue(format!("collection {collection} skipped"));
        }
    }
    flush.finish(writer)?;

    report.detail(format!("collections={}", collections.len()));
    report.detail(format!("collections_skipped={skipped}"));
    report.detail(format!("records_read={records}"));
    report.detail(format!("records_rejected={rejected}"));
    report.detail(format!("retries={retries}"));
    report.detail(format!("groups_flushed={}", flush.scopes_flushed()));
    Ok(())
}

pub fn run(cfg: &CdxConfig, opts: &SummarizeOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("summarize");
    report.detail(format!("index_url={}", cfg.index.url));

    let collections = resolve_collections(cfg, opts)?;
    let source = HttpIndexSource::new(&cfg.index.url, cfg.fetch.request_timeout())?;
    let settings = FetchSettings {
        retry_delay: cfg.fetch.retry_delay(),
        max_attempts: cfg.fetch.max_attempts,
    };

    let mut writer = open_writer(opts.out.as_deref(), opts.separator)?;
    summarize_into(&source, settings, &collections, opts, &mut writer, &mut report)?;
    close_writer(writer, &mut report)?;
    Ok(report)
}
