// src/output.rs
//! Turns the staging document into the gzipped artifact and cleans up after it.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Remove `path` if present. A missing file is not an error.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "file deleted");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("deleting {}", path.display())),
    }
}

/// Sibling path the compressor writes to before the final rename.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Stream `src` through gzip into `dest`. The output is built next to `dest`
/// and renamed over it only once complete, so readers never see a partial
/// artifact. Returns the compressed size in bytes.
pub fn compress_file(src: &Path, dest: &Path) -> Result<u64> {
    let part = partial_path(dest);
    let result = compress_into(src, &part).and_then(|size| {
        fs::rename(&part, dest)
            .with_context(|| format!("moving {} into place", dest.display()))?;
        Ok(size)
    });
    if result.is_err() {
        if let Err(e) = remove_if_exists(&part) {
            tracing::warn!(error = ?e, "could not remove partial artifact");
        }
    }
    result
}

fn compress_into(src: &Path, part: &Path) -> Result<u64> {
    let input =
        File::open(src).with_context(|| format!("opening staging file {}", src.display()))?;
    let output =
        File::create(part).with_context(|| format!("creating {}", part.display()))?;

    let mut reader = BufReader::new(input);
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    io::copy(&mut reader, &mut encoder).context("compressing staging file")?;

    let mut writer = encoder.finish().context("finishing gzip stream")?;
    writer.flush().context("flushing artifact")?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all().context("syncing artifact")?;
    Ok(file.metadata()?.len())
}

/// Compress the staging file into the artifact, then delete the staging file
/// whether or not compression succeeded.
pub fn finalize(staging: &Path, artifact: &Path) -> Result<u64> {
    let compressed = compress_file(staging, artifact);
    match &compressed {
        Ok(size) => tracing::info!(
            path = %artifact.display(),
            bytes = size,
            "guide file has been gzipped successfully"
        ),
        Err(e) => tracing::error!(error = ?e, "compressing guide file failed"),
    }
    if let Err(e) = remove_if_exists(staging) {
        tracing::warn!(error = ?e, "could not remove staging file");
    }
    compressed
}
