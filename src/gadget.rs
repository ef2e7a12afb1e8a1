use crate::config::{PipelineConfig, Sources};
use crate::download::Fetch;
use crate::error::{PipelineError, Result};
use crate::tools::{Invocation, ToolRunner};
use crate::unpack::Package;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const GADGET_LIBRARY: &str = "libfrida-gadget.so";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GadgetArch {
    Arm,
    Arm64,
}

impl GadgetArch {
    /// 64-bit when one of the split packages shipped beside the main one
    /// carries arm64 native code.
    pub fn from_splits(splits: &[Package]) -> Self {
        let has_arm64 = splits
            .iter()
            .filter(|p| p.is_config())
            .any(|p| p.file_name().to_lowercase().contains("arm64"));
        if has_arm64 {
            GadgetArch::Arm64
        } else {
            GadgetArch::Arm
        }
    }

    pub fn abi(self) -> &'static str {
        match self {
            GadgetArch::Arm => "armeabi-v7a",
            GadgetArch::Arm64 => "arm64-v8a",
        }
    }

    pub fn url(self, sources: &Sources) -> &str {
        match self {
            GadgetArch::Arm => &sources.gadget_url_arm,
            GadgetArch::Arm64 => &sources.gadget_url_arm64,
        }
    }
}

/// Decompresses `compressed` (a `.xz` file) next to itself. The `xz`
/// executable is tried first; the in-process decoder covers a missing or
/// failing `xz`.
pub fn decompress_xz(runner: &dyn ToolRunner, compressed: &Path) -> Result<PathBuf> {
    let dest = compressed.with_extension("");
    if dest.exists() {
        fs::remove_file(&dest)?;
    }

    let invocation = Invocation::new("xz").arg("-d").arg(compressed);
    match runner.run(&invocation) {
        Ok(out) if out.success() && dest.is_file() => return Ok(dest),
        Ok(out) => warn!("xz failed ({:?}): {}", out.status, out.combined()),
        Err(PipelineError::ToolNotFound(_)) => warn!("xz not found, decoding in-process"),
        Err(e) => return Err(e),
    }

    decompress_in_process(compressed, &dest)
}

#[cfg(feature = "xz-fallback")]
fn decompress_in_process(compressed: &Path, dest: &Path) -> Result<PathBuf> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut decoder = xz2::read::XzDecoder::new(fs::File::open(compressed)?);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::copy(&mut decoder, &mut tmp)?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(dest.to_path_buf())
}

#[cfg(not(feature = "xz-fallback"))]
fn decompress_in_process(compressed: &Path, _dest: &Path) -> Result<PathBuf> {
    Err(PipelineError::DecompressorUnavailable(compressed.to_path_buf()))
}

/// Downloads the gadget for `arch` into the temp directory and returns the
/// path of the uncompressed library.
pub fn fetch_gadget(
    config: &PipelineConfig,
    fetcher: &dyn Fetch,
    runner: &dyn ToolRunner,
    arch: GadgetArch,
) -> Result<PathBuf> {
    let url = arch.url(&config.sources);
    info!("downloading Frida gadget ({})", arch.abi());

    if url.ends_with(".xz") {
        let compressed = fetcher.fetch(url, &config.temp_dir().join("frida-gadget.so.xz"))?;
        decompress_xz(runner, &compressed)
    } else {
        fetcher.fetch(url, &config.temp_dir().join("frida-gadget.so"))
    }
}

/// Places the gadget under `lib/<abi>/` of a decoded tree.
pub fn install_gadget(gadget: &Path, tree: &Path, arch: GadgetArch) -> Result<PathBuf> {
    let lib_dir = tree.join("lib").join(arch.abi());
    fs::create_dir_all(&lib_dir)?;
    let dest = lib_dir.join(GADGET_LIBRARY);
    fs::copy(gadget, &dest)?;
    info!("placed gadget at {}", dest.display());
    Ok(dest)
}
