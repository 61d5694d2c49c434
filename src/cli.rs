use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind;
use std::path::{Path, PathBuf};

use crate::cdx::config::{self, CdxConfig};
use crate::cdx::content_type::ContentTypeOptions;
use crate::cdx::fetch::StartPoint;
use crate::cdx::filter::{FilterOptions, MergeFlags};
use crate::cdx::format::Separator;
use crate::cdx::normalize::NormalizeOptions;
use crate::commands::resummarize::{self, ResummarizeOptions};
use crate::commands::summarize::{self, SummarizeOptions};
use crate::commands::CommandReport;
use crate::error::{CliConflict, ExitCode};

/// Summarize CDX index records into counts and byte totals per collection,
/// domain, month, content type and extension.
#[derive(Parser, Debug)]
#[command(name = "cdxsum", version, about)]
pub struct Cli {
    /// Collections to summarize; defaults to every collection in the index directory.
    #[arg(value_name = "COLLECTION")]
    pub collections: Vec<String>,

    /// Base URL of the CDX index service.
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,

    /// Index service data directory, listed to discover collections.
    #[arg(long, value_name = "DIR")]
    pub index_dir: Option<PathBuf>,

    /// Write rows here instead of stdout (.gz/.bz2 are compressed).
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Separate fields with a tab instead of ", ".
    #[arg(long)]
    pub tab: bool,

    /// Re-aggregate an existing summary file instead of querying the index.
    #[arg(long = "in", value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Start each collection at this URL.
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Only look up the exact --url.
    #[arg(long, requires = "url")]
    pub exact: bool,

    /// Bucket by year instead of month.
    #[arg(long)]
    pub years: bool,

    /// Keep only the main type of each content type.
    #[arg(long)]
    pub main_type_only: bool,

    /// Cut content types at the first non-printable character.
    #[arg(long)]
    pub ascii_content_type: bool,

    /// Reduce content types to RFC 2045 compliant values.
    #[arg(long)]
    pub rfc_content_type: bool,

    #[arg(long, value_name = "REGEX")]
    pub collection_filter: Vec<String>,

    #[arg(long, value_name = "REGEX")]
    pub tld_filter: Vec<String>,

    #[arg(long, value_name = "REGEX")]
    pub sld_filter: Vec<String>,

    #[arg(long, value_name = "REGEX")]
    pub content_type_filter: Vec<String>,

    #[arg(long, value_name = "REGEX")]
    pub extension_filter: Vec<String>,

    /// First time bucket to keep (inclusive).
    #[arg(long, value_name = "YYYYMM")]
    pub start: Option<String>,

    /// Last time bucket to keep (inclusive).
    #[arg(long, value_name = "YYYYMM")]
    pub end: Option<String>,

    #[arg(long)]
    pub merge_collections: bool,

    #[arg(long)]
    pub merge_tlds: bool,

    #[arg(long)]
    pub merge_slds: bool,

    #[arg(long)]
    pub merge_months: bool,

    #[arg(long)]
    pub merge_content_types: bool,

    #[arg(long)]
    pub merge_extensions: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json_report: bool,
}

impl Cli {
    fn filter_options(&self) -> FilterOptions {
        FilterOptions {
            collections: self.collection_filter.clone(),
            tlds: self.tld_filter.clone(),
            slds: self.sld_filter.clone(),
            content_types: self.content_type_filter.clone(),
            extensions: self.extension_filter.clone(),
            start: self.start.clone(),
            end: self.end.clone(),
            merge: MergeFlags {
                collections: self.merge_collections,
                tlds: self.merge_tlds,
                slds: self.merge_slds,
                time: self.merge_months,
                content_types: self.merge_content_types,
                extensions: self.merge_extensions,
            },
        }
    }

    fn normalize_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            years: self.years,
            content_type: ContentTypeOptions {
                main_type_only: self.main_type_only,
                ascii_prefix: self.ascii_content_type,
                rfc: self.rfc_content_type,
            },
        }
    }

    fn separator(&self) -> Separator {
        if self.tab { Separator::Tab } else { Separator::Comma }
    }

    fn start_point(&self) -> StartPoint {
        match (&self.url, self.exact) {
            (Some(url), true) => StartPoint::Exact(url.clone()),
            (Some(url), false) => StartPoint::From(url.clone()),
            (None, _) => StartPoint::Beginning,
        }
    }

    pub fn check_conflicts(&self) -> Result<(), CliConflict> {
        let Some(input) = &self.input else {
            if self.filter_options().is_active() {
                return Err(CliConflict::FiltersWithoutReplay);
            }
            return Ok(());
        };
        if self.url.is_some() {
            return Err(CliConflict::ReplayWithStartUrl);
        }
        if let Some(out) = &self.out
            && same_file(input, out)
        {
            return Err(CliConflict::SameInputAndOutput(out.display().to_string()));
        }
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn apply_overrides(cfg: &mut CdxConfig, cli: &Cli) -> Result<()> {
    if let Some(server) = &cli.server {
        cfg.index.url = server.trim().to_string();
    }
    if let Some(dir) = &cli.index_dir {
        cfg.index.dir = Some(dir.clone());
    }
    config::validate(cfg)
}

fn execute(cli: &Cli) -> Result<CommandReport> {
    if let Some(input) = &cli.input {
        return resummarize::run(&ResummarizeOptions {
            input: input.clone(),
            filters: cli.filter_options(),
            normalize: cli.normalize_options(),
            separator: cli.separator(),
            out: cli.out.clone(),
        });
    }

    let mut cfg = config::load_config()?;
    apply_overrides(&mut cfg, cli)?;
    summarize::run(
        &cfg,
        &SummarizeOptions {
            collections: cli.collections.clone(),
            start: cli.start_point(),
            normalize: cli.normalize_options(),
            separator: cli.separator(),
            out: cli.out.clone(),
        },
    )
}

fn print_report(report: &CommandReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => eprintln!("{s}"),
            Err(err) => log::error!("failed to encode report: {err}"),
        }
    } else {
        eprint!("{}", report.render_text());
    }
}

pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
                _ => ExitCode::OptionParsing,
            };
        }
    };

    if let Err(conflict) = cli.check_conflicts() {
        eprintln!("error: {conflict}");
        return conflict.exit_code();
    }

    match execute(&cli) {
        Ok(mut report) => {
            report.finish();
            print_report(&report, cli.json_report);
            ExitCode::Success
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::RunFailed
        }
    }
}
