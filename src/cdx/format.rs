use crate::cdx::tally::SummaryRow;
use std::io::{self, Write};

const UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Separator {
    #[default]
    Comma,
    Tab,
}

impl Separator {
    pub fn as_str(self) -> &'static str {
        match self {
            Separator::Comma => ", ",
            Separator::Tab => "\t",
        }
    }

    /// Picks the separator used by an existing summary line.
    pub fn sniff(line: &str) -> Self {
        if line.contains('\t') {
            Separator::Tab
        } else {
            Separator::Comma
        }
    }
}

pub fn human_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

pub fn format_row(row: &SummaryRow, separator: Separator) -> String {
    let scope = &row.key.scope;
    let bucket = &row.key.bucket;
    let count = row.tally.count.to_string();
    let bytes = row.tally.bytes.to_string();
    let size = human_size(row.tally.bytes);
    let fields: [&str; 9] = [
        &scope.collection,
        &scope.tld,
        &scope.sld,
        &bucket.time_bucket,
        &bucket.content_type,
        &bucket.extension,
        &count,
        &bytes,
        &size,
    ];
    fields
        .iter()
        .map(|f| format!("\"{f}\""))
        .collect::<Vec<_>>()
        .join(separator.as_str())
}

/// Writes formatted rows and keeps count of what went out.
pub struct RowWriter<W: Write> {
    inner: W,
    separator: Separator,
    rows: u64,
}

impl<W: Write> RowWriter<W> {
    pub fn new(inner: W, separator: Separator) -> Self {
        Self {
            inner,
            separator,
            rows: 0,
        }
    }

    pub fn write_row(&mut self, row: &SummaryRow) -> io::Result<()> {
        writeln!(self.inner, "{}", format_row(row, self.separator))?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
