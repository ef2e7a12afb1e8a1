use crate::config::HttpSettings;
use crate::error::{PipelineError, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, REFERER};
use reqwest::redirect::Policy;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const CHUNK_SIZE: usize = 8192;

/// Transport used to acquire remote files.
pub trait Fetch {
    /// Downloads `url` to `dest`, creating parent directories. Returns the
    /// written path.
    fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        if let Some(ref referer) = settings.referer {
            let value = HeaderValue::from_str(referer).map_err(|_| {
                PipelineError::InvalidInput(format!("Invalid referer header: {}", referer))
            })?;
            headers.insert(REFERER, value);
        }

        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .redirect(Policy::limited(10))
            // Bundles are hundreds of megabytes; no overall deadline.
            .timeout(None::<Duration>)
            .build()?;

        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        info!("downloading {}", url);

        let mut response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(final_url = %response.url(), "response {}", status);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let partial = partial_path(dest);
        let written = match stream_to_file(&mut response, &partial) {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };
        fs::rename(&partial, dest)?;

        info!("saved {} ({} bytes)", dest.display(), written);
        Ok(dest.to_path_buf())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    dest.with_file_name(format!(
        "{}.part-{}",
        name,
        uuid::Uuid::new_v4().simple()
    ))
}

fn stream_to_file<R: Read>(reader: &mut R, path: &Path) -> Result<u64> {
    let mut file = File::create(path)?;
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        total += n as u64;
    }

    file.flush()?;
    Ok(total)
}

pub fn sha256_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fetches `url` to `dest` and, when a pin is given, checks the SHA-256 of
/// the written file. A mismatching file is removed.
pub fn download_verified(
    fetcher: &dyn Fetch,
    url: &str,
    dest: &Path,
    sha256: Option<&str>,
) -> Result<PathBuf> {
    let path = fetcher.fetch(url, dest)?;

    if let Some(expected) = sha256 {
        let actual = sha256_file(&path)?;
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            let _ = fs::remove_file(&path);
            return Err(PipelineError::ChecksumMismatch {
                path,
                expected: expected.trim().to_lowercase(),
                actual,
            });
        }
        debug!("checksum ok for {}", path.display());
    }

    Ok(path)
}
