//! The injector stage: decode, plant the gadget and its bootstrap class,
//! rebuild, sign.

use crate::apktool::{Apktool, BuildMode, DecodeMode};
use crate::archive::extract_member;
use crate::bootstrap::{write_bootstrap, BOOTSTRAP_CLASS};
use crate::config::PipelineConfig;
use crate::download::Fetch;
use crate::error::{PipelineError, Result};
use crate::gadget::{fetch_gadget, install_gadget, GadgetArch};
use crate::manifest::{package_from_file_stem, patch_manifest_file};
use crate::sign::{SignOutcome, Signer};
use crate::tools::ToolRunner;
use crate::unpack::{find_packages, Package, PACKAGE_SUFFIX};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub const MANIFEST_NAME: &str = "AndroidManifest.xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitArtifact {
    pub source: PathBuf,
    pub copy: PathBuf,
    pub outcome: SignOutcome,
}

/// What one injector run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectReport {
    pub input: PathBuf,
    pub arch: GadgetArch,
    pub decode_mode: DecodeMode,
    /// `None` when every rebuild attempt failed and the original package
    /// was passed through.
    pub build_mode: Option<BuildMode>,
    pub unsigned: PathBuf,
    pub signed: SignOutcome,
    pub splits: Vec<SplitArtifact>,
}

impl InjectReport {
    pub fn instrumented(&self) -> bool {
        self.build_mode.is_some()
    }
}

/// First non-config package of the extracted bundle.
pub fn select_main_package(config: &PipelineConfig) -> Result<PathBuf> {
    let bundle_dir = config.bundle_dir();
    if !bundle_dir.is_dir() {
        return Err(PipelineError::FileNotFound(bundle_dir));
    }
    find_packages(&bundle_dir)?
        .into_iter()
        .find(|p| !p.is_config())
        .map(|p| p.path)
        .ok_or(PipelineError::NoPackages(bundle_dir))
}

/// Config packages in the same directory as `apk`.
pub fn sibling_splits(apk: &Path) -> Result<Vec<Package>> {
    let dir = match apk.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut splits = Vec::new();
    for entry in WalkDir::new(&dir).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !name.ends_with(PACKAGE_SUFFIX) {
            continue;
        }
        let package = Package::new(entry.path());
        if package.is_config() {
            splits.push(package);
        }
    }
    Ok(splits)
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "app".to_string())
}

/// Makes sure the decoded tree has a manifest, pulling it straight out of
/// the package when the decoder left none behind.
fn ensure_manifest(apk: &Path, tree: &Path) -> Result<PathBuf> {
    let manifest = tree.join(MANIFEST_NAME);
    if manifest.is_file() {
        return Ok(manifest);
    }

    warn!("decoded tree has no {}, extracting it from the package", MANIFEST_NAME);
    match extract_member(apk, MANIFEST_NAME, &manifest) {
        Ok(path) => Ok(path),
        Err(PipelineError::Zip(e)) => {
            warn!("{}", e);
            Err(PipelineError::ManifestMissing(apk.to_path_buf()))
        }
        Err(e) => Err(e),
    }
}

/// Runs the full injector against `apk`.
pub fn inject(
    config: &PipelineConfig,
    runner: &dyn ToolRunner,
    fetcher: &dyn Fetch,
    apk: &Path,
) -> Result<InjectReport> {
    if !apk.is_file() {
        return Err(PipelineError::FileNotFound(apk.to_path_buf()));
    }
    config.ensure_dirs()?;

    let apktool = Apktool::ensure(config, fetcher)?;

    let work = config.inject_work_dir();
    if work.exists() {
        fs::remove_dir_all(&work)?;
    }

    let decode_mode = apktool.decode(runner, apk, &work)?;
    info!("decoded with {:?}", decode_mode);

    let manifest = ensure_manifest(apk, &work)?;
    let smali = work.join("smali");
    fs::create_dir_all(&smali)?;

    let splits = sibling_splits(apk)?;
    let arch = GadgetArch::from_splits(&splits);
    let gadget = fetch_gadget(config, fetcher, runner, arch)?;
    install_gadget(&gadget, &work, arch)?;

    let stem = stem_of(apk);
    patch_manifest_file(&manifest, &package_from_file_stem(&stem), BOOTSTRAP_CLASS)?;
    write_bootstrap(&smali)?;

    let output = config.output_dir();
    let unsigned = output.join(format!("{}-injected.apk", stem));
    let build_mode = match apktool.build(runner, &work, &unsigned) {
        Ok(mode) => Some(mode),
        Err(PipelineError::ToolFailed { .. }) => {
            warn!(
                "rebuild failed, passing {} through without instrumentation",
                apk.display()
            );
            fs::copy(apk, &unsigned)?;
            None
        }
        Err(e) => return Err(e),
    };

    let signer = Signer::new(runner, &config.signing, config.keystore_path());
    let signed = signer.sign(
        &unsigned,
        &output.join(format!("{}-injected-signed.apk", stem)),
    )?;

    let mut split_artifacts = Vec::with_capacity(splits.len());
    for split in splits {
        let copy = output.join(split.file_name());
        fs::copy(&split.path, &copy)?;
        let outcome = signer.sign(
            &copy,
            &output.join(format!("{}-signed.apk", stem_of(&split.path))),
        )?;
        split_artifacts.push(SplitArtifact {
            source: split.path,
            copy,
            outcome,
        });
    }

    let report = InjectReport {
        input: apk.to_path_buf(),
        arch,
        decode_mode,
        build_mode,
        unsigned,
        signed,
        splits: split_artifacts,
    };
    info!(
        "injection finished: {} ({} split(s))",
        report.signed.path().display(),
        report.splits.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::write_zip;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn main_package_skips_config_splits() {
        let tmp = TempDir::new().unwrap();
        let config = PipelineConfig::with_root(tmp.path());
        let dir = config.bundle_dir();
        touch(&dir.join("config.arm64_v8a.apk"));
        touch(&dir.join("config.ja.apk"));
        touch(&dir.join("com.oddno.lovelive.apk"));

        assert_eq!(
            select_main_package(&config).unwrap(),
            dir.join("com.oddno.lovelive.apk")
        );
    }

    #[test]
    fn bundle_with_only_splits_has_no_main() {
        let tmp = TempDir::new().unwrap();
        let config = PipelineConfig::with_root(tmp.path());
        touch(&config.bundle_dir().join("config.ja.apk"));
        assert!(matches!(
            select_main_package(&config),
            Err(PipelineError::NoPackages(_))
        ));
    }

    #[test]
    fn splits_are_direct_siblings_only() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("base.apk"));
        touch(&tmp.path().join("config.xxhdpi.apk"));
        touch(&tmp.path().join("config.arm64_v8a.apk"));
        touch(&tmp.path().join("notes.txt"));
        touch(&tmp.path().join("nested/config.ja.apk"));

        let names: Vec<String> = sibling_splits(&tmp.path().join("base.apk"))
            .unwrap()
            .iter()
            .map(|p| p.file_name())
            .collect();
        assert_eq!(names, vec!["config.arm64_v8a.apk", "config.xxhdpi.apk"]);
    }

    #[test]
    fn manifest_is_pulled_from_package() {
        let tmp = TempDir::new().unwrap();
        let apk = tmp.path().join("app.apk");
        write_zip(&apk, &[(MANIFEST_NAME, b"<manifest/>")]);
        let tree = tmp.path().join("tree");

        let manifest = ensure_manifest(&apk, &tree).unwrap();
        assert_eq!(fs::read(manifest).unwrap(), b"<manifest/>");
    }

    #[test]
    fn package_without_manifest_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let apk = tmp.path().join("app.apk");
        write_zip(&apk, &[("classes.dex", b"dex")]);
        assert!(matches!(
            ensure_manifest(&apk, &tmp.path().join("tree")),
            Err(PipelineError::ManifestMissing(_))
        ));
    }
}
