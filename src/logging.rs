use env_logger::Env;

/// Diagnostics go to stderr so they never mix with rows written to stdout.
pub fn init() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format_timestamp_secs()
        .init();
}
