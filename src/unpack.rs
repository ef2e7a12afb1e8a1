//! Inner package extraction and the native artifact search.

use crate::archive::extract_zip;
use crate::config::{PipelineConfig, LIBRARY_NAME, METADATA_NAME};
use crate::elf;
use crate::error::{PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// File-name marker of split/config packages (`config.arm64_v8a.apk`).
pub const CONFIG_MARKER: &str = "config.";
pub const PACKAGE_SUFFIX: &str = ".apk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageRole {
    Main,
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub path: PathBuf,
    pub role: PackageRole,
}

impl Package {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let role = if file_name_of(&path).contains(CONFIG_MARKER) {
            PackageRole::Config
        } else {
            PackageRole::Main
        };
        Self { path, role }
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    pub fn is_config(&self) -> bool {
        self.role == PackageRole::Config
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Every `.apk` below `dir`, in a stable order.
pub fn find_packages<P: AsRef<Path>>(dir: P) -> Result<Vec<Package>> {
    let mut packages = Vec::new();
    for entry in WalkDir::new(dir.as_ref()).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.ends_with(PACKAGE_SUFFIX) {
            packages.push(Package::new(entry.path()));
        }
    }
    Ok(packages)
}

#[derive(Debug, Clone)]
pub struct ExtractedPackage {
    pub package: Package,
    pub dir: PathBuf,
}

/// Extracts each package found under `bundle_dir` into
/// `staging/apk_<n>`. The staging area is recreated from scratch. Packages
/// that are not valid zip archives are skipped.
pub fn extract_packages<P: AsRef<Path>, Q: AsRef<Path>>(
    bundle_dir: P,
    staging: Q,
) -> Result<Vec<ExtractedPackage>> {
    let bundle_dir = bundle_dir.as_ref();
    let staging = staging.as_ref();

    if staging.exists() {
        fs::remove_dir_all(staging)?;
    }
    fs::create_dir_all(staging)?;

    let mut extracted = Vec::new();
    for package in find_packages(bundle_dir)? {
        let dir = staging.join(format!("apk_{}", extracted.len()));
        fs::create_dir_all(&dir)?;
        info!("extracting {}", package.path.display());

        match extract_zip(&package.path, &dir) {
            Ok(_) => extracted.push(ExtractedPackage { package, dir }),
            Err(PipelineError::Zip(e)) => {
                warn!(
                    "{} is not a valid zip archive, skipping: {}",
                    package.path.display(),
                    e
                );
                fs::remove_dir_all(&dir)?;
            }
            Err(e) => return Err(e),
        }
    }

    if extracted.is_empty() {
        return Err(PipelineError::NoPackages(bundle_dir.to_path_buf()));
    }

    info!("extracted {} package(s)", extracted.len());
    Ok(extracted)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativePair {
    pub library: PathBuf,
    pub metadata: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSearch {
    Found(NativePair),
    Partial {
        library: Option<PathBuf>,
        metadata: Option<PathBuf>,
    },
    NotFound,
}

impl ArtifactSearch {
    fn from_parts(library: Option<PathBuf>, metadata: Option<PathBuf>) -> Self {
        match (library, metadata) {
            (Some(library), Some(metadata)) => Self::Found(NativePair { library, metadata }),
            (None, None) => Self::NotFound,
            (library, metadata) => Self::Partial { library, metadata },
        }
    }
}

fn exact_library(name: &str) -> bool {
    name == LIBRARY_NAME
}

fn exact_metadata(name: &str) -> bool {
    name == METADATA_NAME
}

fn loose_library(name: &str) -> bool {
    let name = name.to_lowercase();
    name.contains("il2cpp") && name.ends_with(".so")
}

fn loose_metadata(name: &str) -> bool {
    name.to_lowercase().contains("global-metadata")
}

/// Directories below `root` in top-down order, each paired with its files.
fn files_by_directory(root: &Path) -> Result<Vec<(PathBuf, Vec<(String, PathBuf)>)>> {
    let mut listing = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let mut files = Vec::new();
        for child in fs::read_dir(entry.path())? {
            let child = child?;
            if child.file_type()?.is_file() {
                files.push((child.file_name().to_string_lossy().to_string(), child.path()));
            }
        }
        files.sort();
        listing.push((entry.path().to_path_buf(), files));
    }
    Ok(listing)
}

/// One pass over the tree, filling whichever slot is still empty. The first
/// hit for a slot wins, and the walk stops after the first directory at
/// which both slots are filled.
fn search_pass(
    listing: &[(PathBuf, Vec<(String, PathBuf)>)],
    library: &mut Option<PathBuf>,
    metadata: &mut Option<PathBuf>,
    is_library: fn(&str) -> bool,
    is_metadata: fn(&str) -> bool,
) {
    for (_, files) in listing {
        for (name, path) in files {
            if library.is_none() && is_library(name) {
                info!("found native library: {}", path.display());
                *library = Some(path.clone());
            } else if metadata.is_none() && is_metadata(name) {
                info!("found metadata: {}", path.display());
                *metadata = Some(path.clone());
            }
        }
        if library.is_some() && metadata.is_some() {
            return;
        }
    }
}

/// Exact names first, then case-insensitive substrings for whatever the
/// exact pass missed.
pub fn search_artifacts<P: AsRef<Path>>(root: P) -> Result<ArtifactSearch> {
    let listing = files_by_directory(root.as_ref())?;
    let mut library = None;
    let mut metadata = None;

    search_pass(&listing, &mut library, &mut metadata, exact_library, exact_metadata);

    if library.is_none() || metadata.is_none() {
        info!("exact names not found, trying a broader search");
        search_pass(&listing, &mut library, &mut metadata, loose_library, loose_metadata);
    }

    Ok(ArtifactSearch::from_parts(library, metadata))
}

/// Files that look related to either artifact, for diagnostics.
pub fn diagnostic_candidates<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(root.as_ref()).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.contains("il2cpp") || name.contains("metadata") || name.ends_with(".so") {
            candidates.push(entry.path().to_path_buf());
        }
    }
    Ok(candidates)
}

pub fn locate_artifacts<P: AsRef<Path>>(root: P) -> Result<NativePair> {
    let root = root.as_ref();
    match search_artifacts(root)? {
        ArtifactSearch::Found(pair) => Ok(pair),
        other => {
            if let ArtifactSearch::Partial { library, metadata } = &other {
                warn!(
                    "only one artifact found (library: {:?}, metadata: {:?})",
                    library, metadata
                );
            }
            let candidates = diagnostic_candidates(root)?;
            warn!("extracted files that look related:");
            for candidate in &candidates {
                warn!(" - {}", candidate.display());
            }
            Err(PipelineError::ArtifactsNotFound {
                root: root.to_path_buf(),
                candidates,
            })
        }
    }
}

/// Copies the pair to the output directory under the canonical names.
pub fn install_artifacts(pair: &NativePair, config: &PipelineConfig) -> Result<NativePair> {
    fs::create_dir_all(config.output_dir())?;
    let installed = NativePair {
        library: config.library_output(),
        metadata: config.metadata_output(),
    };
    fs::copy(&pair.library, &installed.library)?;
    fs::copy(&pair.metadata, &installed.metadata)?;

    match elf::identify(&installed.library) {
        Ok(Some(id)) => info!(
            "native library is {} ({}-bit, abi {})",
            id.machine,
            if id.is_64 { 64 } else { 32 },
            id.abi.unwrap_or("unknown")
        ),
        Ok(None) => warn!("{} is not an ELF file", pair.library.display()),
        Err(PipelineError::Elf(e)) => {
            warn!("unreadable ELF header in {}: {}", pair.library.display(), e)
        }
        Err(e) => return Err(e),
    }

    Ok(installed)
}

/// The unpack stage: bundle directory -> staging area -> output artifacts.
pub fn unpack(config: &PipelineConfig) -> Result<NativePair> {
    let bundle_dir = config.bundle_dir();
    if !bundle_dir.is_dir() {
        return Err(PipelineError::FileNotFound(bundle_dir));
    }

    info!("searching for {} and {}", LIBRARY_NAME, METADATA_NAME);
    let staging = config.staging_dir();
    extract_packages(&bundle_dir, &staging)?;
    let pair = locate_artifacts(&staging)?;
    let installed = install_artifacts(&pair, config)?;

    info!(
        "artifacts ready: {}, {}",
        installed.library.display(),
        installed.metadata.display()
    );
    Ok(installed)
}
