use anyhow::Result;
use std::path::PathBuf;

use crate::cdx::compress;
use crate::cdx::filter::{FilterEngine, FilterOptions};
use crate::cdx::flush::flush_all;
use crate::cdx::format::Separator;
use crate::cdx::normalize::NormalizeOptions;
use crate::cdx::replay;
use crate::cdx::tally::TallyStore;
use crate::commands::{CommandReport, close_writer, open_writer};

#[derive(Debug, Clone)]
pub struct ResummarizeOptions {
    pub input: PathBuf,
    pub filters: FilterOptions,
    pub normalize: NormalizeOptions,
    pub separator: Separator,
    pub out: Option<PathBuf>,
}

pub fn run(opts: &ResummarizeOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("resummarize");
    report.detail(format!("input={}", opts.input.display()));

    let engine = FilterEngine::new(&opts.filters)?;
    let text = compress::read_input(&opts.input)?;

    let mut store = TallyStore::default();
    let stats = replay::replay_into(&text, opts.normalize, &engine, &mut store);
    log::info!(
        "replayed {} lines into {} groups ({} filtered, {} malformed)",
        stats.lines,
        store.len(),
        stats.filtered,
        stats.malformed
    );

    let mut writer = open_writer(opts.out.as_deref(), opts.separator)?;
    flush_all(&mut store, &mut writer)?;

    report.detail(format!("lines_read={}", stats.lines));
    report.detail(format!("lines_kept={}", stats.kept));
    report.detail(format!("lines_filtered={}", stats.filtered));
    report.detail(format!("lines_malformed={}", stats.malformed));
    if stats.legacy > 0 {
        report.detail(format!("legacy_lines={}", stats.legacy));
    }
    if stats.malformed > 0 {
        report.issue(format!("{} malformed lines skipped", stats.malformed));
    }
    close_writer(writer, &mut report)?;
    Ok(report)
}
