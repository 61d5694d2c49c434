pub mod compress;
pub mod config;
pub mod content_type;
pub mod fetch;
pub mod filter;
pub mod flush;
pub mod format;
pub mod normalize;
pub mod output;
pub mod paths;
pub mod replay;
pub mod tally;
pub mod warn;
