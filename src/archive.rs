use crate::error::{PipelineError, Result};
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::result::ZipError;

/// Extracts every entry of a zip archive under `dest`. Entries whose names
/// would land outside `dest` are skipped. Returns the number of files
/// written.
pub fn extract_zip<P: AsRef<Path>, Q: AsRef<Path>>(archive_path: P, dest: Q) -> Result<usize> {
    let archive_path = archive_path.as_ref();
    let dest = dest.as_ref();

    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
    fs::create_dir_all(dest)?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            debug!("skipping unsafe entry {}", entry.name());
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(p) = outpath.parent() {
            if !p.exists() {
                fs::create_dir_all(p)?;
            }
        }
        let mut outfile = File::create(&outpath)?;
        // Bad CRC or inflate failures surface as InvalidData reads.
        std::io::copy(&mut entry, &mut outfile).map_err(|e| match e.kind() {
            ErrorKind::InvalidData => PipelineError::Zip(ZipError::Io(e)),
            _ => PipelineError::Io(e),
        })?;
        written += 1;

        // Preserve Unix permissions
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    debug!(
        "extracted {} file(s) from {}",
        written,
        archive_path.display()
    );
    Ok(written)
}

/// Extracts a single named entry to `dest` (a file path).
pub fn extract_member<P: AsRef<Path>, Q: AsRef<Path>>(
    archive_path: P,
    name: &str,
    dest: Q,
) -> Result<PathBuf> {
    let dest = dest.as_ref();
    let file = File::open(archive_path.as_ref())?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
    let mut entry = archive.by_name(name)?;

    if let Some(p) = dest.parent() {
        fs::create_dir_all(p)?;
    }
    let mut outfile = File::create(dest)?;
    std::io::copy(&mut entry, &mut outfile)?;

    Ok(dest.to_path_buf())
}

/// Unpacks a downloaded tool release, which ships either as a zip or as a
/// gzipped tarball.
pub fn extract_tool_package<P: AsRef<Path>, Q: AsRef<Path>>(archive_path: P, dest: Q) -> Result<()> {
    let archive_path = archive_path.as_ref();
    let dest = dest.as_ref();
    let name = archive_path
        .file_name()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        fs::create_dir_all(dest)?;
        let decoder = flate2::read::GzDecoder::new(File::open(archive_path)?);
        let mut archive = tar::Archive::new(decoder);
        archive.unpack(dest)?;
        Ok(())
    } else if name.ends_with(".zip") {
        extract_zip(archive_path, dest).map(|_| ())
    } else {
        Err(PipelineError::InvalidInput(format!(
            "Unsupported tool package format: {}",
            archive_path.display()
        )))
    }
}
