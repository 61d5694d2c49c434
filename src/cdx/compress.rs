use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Bzip2,
}

impl Codec {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Some(Codec::Gzip),
            Some("bz2") => Some(Codec::Bzip2),
            _ => None,
        }
    }

    fn program(self) -> &'static str {
        match self {
            Codec::Gzip => "gzip",
            Codec::Bzip2 => "bzip2",
        }
    }
}

fn resolve_bin(codec: Codec) -> Result<PathBuf> {
    which::which(codec.program())
        .with_context(|| format!("{} not found on PATH", codec.program()))
}

/// Reads a summary file in full, decompressing `.gz`/`.bz2` through the
/// system tool.
pub fn read_input(path: &Path) -> Result<String> {
    let Some(codec) = Codec::from_path(path) else {
        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(String::from_utf8_lossy(&raw).into_owned());
    };

    let bin = resolve_bin(codec)?;
    let output = Command::new(&bin)
        .arg("-dc")
        .arg(path)
        .output()
        .with_context(|| format!("failed to run `{}`", bin.display()))?;
    if !output.status.success() {
        anyhow::bail!(
            "{} could not decompress {}\nstderr: {}",
            codec.program(),
            path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn compress_file(src: &Path, dest: &Path, codec: Codec) -> Result<()> {
    let bin = resolve_bin(codec)?;
    let input = File::open(src).with_context(|| format!("failed to open {}", src.display()))?;
    let output =
        File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?;
    let status = Command::new(&bin)
        .arg("-c")
        .stdin(Stdio::from(input))
        .stdout(Stdio::from(output))
        .status()
        .with_context(|| format!("failed to run `{}`", bin.display()))?;
    if !status.success() {
        anyhow::bail!("{} failed to compress {}", codec.program(), src.display());
    }
    Ok(())
}
