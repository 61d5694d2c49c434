pub mod resummarize;
pub mod summarize;

use crate::cdx::format::{RowWriter, Separator};
use crate::cdx::output::OutputSink;
use crate::error::SummaryError;
use anyhow::Result;
use serde::Serialize;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
    pub finished_at: Option<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
            finished_at: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(chrono::Local::now().to_rfc3339());
    }

    pub fn render_text(&self) -> String {
        let mut out = format!(
            "{}: {}\n",
            self.command,
            if self.ok { "ok" } else { "completed with issues" }
        );
        for d in &self.details {
            out.push_str(&format!("  {d}\n"));
        }
        for i in &self.issues {
            out.push_str(&format!("  issue: {i}\n"));
        }
        if let Some(at) = &self.finished_at {
            out.push_str(&format!("  finished_at={at}\n"));
        }
        out
    }
}

pub type SummaryWriter = RowWriter<BufWriter<OutputSink>>;

pub fn open_writer(out: Option<&Path>, separator: Separator) -> Result<SummaryWriter> {
    let sink = OutputSink::open(out)?;
    Ok(RowWriter::new(BufWriter::new(sink), separator))
}

/// Flushes rows to their destination; a run that wrote nothing fails.
pub fn close_writer(writer: SummaryWriter, report: &mut CommandReport) -> Result<()> {
    let rows = writer.rows_written();
    let sink = writer
        .into_inner()?
        .into_inner()
        .map_err(|e| e.into_error())?;
    if rows == 0 {
        return Err(SummaryError::EmptyOutput.into());
    }
    report.detail(format!("rows_written={rows}"));
    let written: Option<PathBuf> = sink.commit()?;
    if let Some(path) = written {
        report.detail(format!("output={}", path.display()));
    }
    Ok(())
}
