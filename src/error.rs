use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliConflict {
    #[error("filter and merge options require --in")]
    FiltersWithoutReplay,
    #[error("--in and --url cannot be combined")]
    ReplayWithStartUrl,
    #[error("--in and --out must name different files: {0}")]
    SameInputAndOutput(String),
}

impl CliConflict {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::FiltersWithoutReplay => ExitCode::FiltersWithoutReplay,
            Self::ReplayWithStartUrl => ExitCode::ReplayWithStartUrl,
            Self::SameInputAndOutput(_) => ExitCode::SameInputAndOutput,
        }
    }
}

/// Result of one streaming attempt against the index service.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("index stream for {collection} broke after {records} records: {source}")]
    Retryable {
        collection: String,
        records: u64,
        #[source]
        source: io::Error,
    },
    #[error("index service returned nothing for {collection}: {source}")]
    Unavailable {
        collection: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("no summary rows were produced")]
    EmptyOutput,
    #[error("no collections given and no index directory configured")]
    NoCollections,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    OptionParsing,
    FiltersWithoutReplay,
    ReplayWithStartUrl,
    SameInputAndOutput,
    RunFailed,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::OptionParsing => 1,
            Self::FiltersWithoutReplay => 2,
            Self::ReplayWithStartUrl => 3,
            Self::SameInputAndOutput => 4,
            Self::RunFailed => 5,
        }
    }
}
