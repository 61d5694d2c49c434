//! Output sinks: stdout, or a staged file renamed into place on success.

use crate::cdx::compress::{self, Codec};
use crate::error::SummaryError;
use anyhow::{Context, Result};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::path::{Path, PathBuf};

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

pub fn staging_path(target: &Path) -> PathBuf {
    with_suffix(target, "-in-progress")
}

#[derive(Debug)]
pub struct StagedFile {
    target: PathBuf,
    staging: PathBuf,
    file: File,
    committed: bool,
}

impl StagedFile {
    pub fn create(target: &Path) -> Result<Self> {
        let staging = staging_path(target);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&staging)
            .with_context(|| format!("failed to open {}", staging.display()))?;
        file.try_lock_exclusive()
            .with_context(|| format!("{} is locked by another run", staging.display()))?;
        file.set_len(0)?;
        Ok(Self {
            target: target.to_path_buf(),
            staging,
            file,
            committed: false,
        })
    }

    fn packed_path(&self) -> PathBuf {
        with_suffix(&self.staging, ".packed")
    }

    /// Compresses if the target asks for it, then renames into place.
    /// On any error the staged files are removed when `self` drops.
    pub fn commit(mut self) -> Result<PathBuf> {
        self.file.flush()?;
        self.file.sync_all()?;
        let len = self.file.metadata()?.len();
        if len == 0 {
            return Err(SummaryError::EmptyOutput.into());
        }

        let finished = match Codec::from_path(&self.target) {
            Some(codec) => {
                let packed = self.packed_path();
                compress::compress_file(&self.staging, &packed, codec)?;
                packed
            }
            None => self.staging.clone(),
        };
        fs::rename(&finished, &self.target).with_context(|| {
            format!(
                "failed to rename {} to {}",
                finished.display(),
                self.target.display()
            )
        })?;
        if finished != self.staging {
            fs::remove_file(&self.staging)
                .with_context(|| format!("failed to remove {}", self.staging.display()))?;
        }
        self.committed = true;
        FileExt::unlock(&self.file)?;
        log::info!("wrote {} ({len} bytes uncompressed)", self.target.display());
        Ok(self.target.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in [self.packed_path(), self.staging.clone()] {
            if !path.exists() {
                continue;
            }
            if let Err(err) = fs::remove_file(&path) {
                log::warn!("failed to remove {}: {err}", path.display());
            }
        }
    }
}

#[derive(Debug)]
pub enum OutputSink {
    Stdout(Stdout),
    Staged(StagedFile),
}

impl OutputSink {
    pub fn open(target: Option<&Path>) -> Result<Self> {
        match target {
            Some(path) => Ok(OutputSink::Staged(StagedFile::create(path)?)),
            None => Ok(OutputSink::Stdout(io::stdout())),
        }
    }

    pub fn commit(self) -> Result<Option<PathBuf>> {
        match self {
            OutputSink::Stdout(mut out) => {
                out.flush()?;
                Ok(None)
            }
            OutputSink::Staged(staged) => staged.commit().map(Some),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Stdout(out) => out.write(buf),
            OutputSink::Staged(staged) => staged.file.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Stdout(out) => out.flush(),
            OutputSink::Staged(staged) => staged.file.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn commit_renames_staging_into_place() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("summary.csv");
        let mut sink = OutputSink::open(Some(&target)).unwrap();
        assert!(staging_path(&target).exists());
        writeln!(sink, "\"A\"").unwrap();
        assert_eq!(sink.commit().unwrap(), Some(target.clone()));
        assert!(!staging_path(&target).exists());
        assert_eq!(fs::read_to_string(&target).unwrap(), "\"A\"\n");
    }

    #[test]
    fn empty_staging_file_is_rejected() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("summary.csv");
        let err = OutputSink::open(Some(&target)).unwrap().commit().unwrap_err();
        assert!(err.to_string().contains("no summary rows"));
        assert!(!target.exists());
        assert!(!staging_path(&target).exists());
    }

    #[test]
    fn abandoned_sink_removes_its_staging_file() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("summary.csv");
        let mut sink = OutputSink::open(Some(&target)).unwrap();
        writeln!(sink, "\"A\"").unwrap();
        drop(sink);
        assert!(!staging_path(&target).exists());
        assert!(!target.exists());
    }

    #[test]
    fn staging_name_appends_suffix() {
        assert_eq!(
            staging_path(Path::new("/tmp/out.csv.gz")),
            PathBuf::from("/tmp/out.csv.gz-in-progress")
        );
    }
}
