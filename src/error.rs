use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WalkDir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("ELF error: {0}")]
    Elf(#[from] goblin::error::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("No application packages could be extracted from {0}")]
    NoPackages(PathBuf),

    #[error("libil2cpp.so or global-metadata.dat not found under {root} ({} candidate(s) seen)", candidates.len())]
    ArtifactsNotFound {
        root: PathBuf,
        candidates: Vec<PathBuf>,
    },

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("External tool failed: {tool} (exit {status:?})\n{output}")]
    ToolFailed {
        tool: String,
        status: Option<i32>,
        output: String,
    },

    #[error("Dumper exited cleanly but produced no dump at {0}")]
    DumpNotProduced(PathBuf),

    #[error("AndroidManifest.xml missing from {0} and could not be recovered")]
    ManifestMissing(PathBuf),

    #[error("No xz decompressor available for {0}")]
    DecompressorUnavailable(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
