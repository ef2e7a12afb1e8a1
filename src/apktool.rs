use crate::config::PipelineConfig;
use crate::download::Fetch;
use crate::error::{PipelineError, Result};
use crate::tools::{run_checked, Invocation, ToolRunner};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const JAR_NAME: &str = "apktool.jar";

#[cfg(windows)]
pub const WRAPPER_NAME: &str = "apktool.bat";
#[cfg(not(windows))]
pub const WRAPPER_NAME: &str = "apktool";

#[cfg(windows)]
const WRAPPER_SCRIPT: &str = "@echo off\r\njava -jar \"%~dp0apktool.jar\" %*\r\n";
#[cfg(not(windows))]
const WRAPPER_SCRIPT: &str = "#!/bin/sh\nexec java -jar \"$(dirname \"$0\")/apktool.jar\" \"$@\"\n";

/// Decode attempts, from most to least complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Full,
    ResourcesSkipped,
    MainClassesOnly,
}

impl DecodeMode {
    pub const LADDER: [DecodeMode; 3] = [
        DecodeMode::Full,
        DecodeMode::ResourcesSkipped,
        DecodeMode::MainClassesOnly,
    ];

    pub fn flags(self) -> &'static [&'static str] {
        match self {
            DecodeMode::Full => &["-f", "-r", "-s", "--keep-broken-res"],
            DecodeMode::ResourcesSkipped => &["-f", "-r"],
            DecodeMode::MainClassesOnly => &["-f", "-r", "--only-main-classes"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Aapt2,
    Default,
}

impl BuildMode {
    pub const LADDER: [BuildMode; 2] = [BuildMode::Aapt2, BuildMode::Default];

    pub fn flags(self) -> &'static [&'static str] {
        match self {
            BuildMode::Aapt2 => &["--use-aapt2"],
            BuildMode::Default => &[],
        }
    }
}

pub struct Apktool {
    pub wrapper: PathBuf,
}

impl Apktool {
    pub fn at<P: AsRef<Path>>(wrapper: P) -> Self {
        Self {
            wrapper: wrapper.as_ref().to_path_buf(),
        }
    }

    /// Makes sure `tools/apktool` holds the jar and a wrapper script,
    /// downloading the jar only when the wrapper is missing.
    pub fn ensure(config: &PipelineConfig, fetcher: &dyn Fetch) -> Result<Self> {
        let dir = config.apktool_dir();
        let wrapper = dir.join(WRAPPER_NAME);
        if wrapper.is_file() {
            return Ok(Self::at(wrapper));
        }

        fs::create_dir_all(&dir)?;
        let jar = dir.join(JAR_NAME);
        if !jar.is_file() {
            info!("apktool not found, downloading");
            fetcher.fetch(&config.sources.apktool_url, &jar)?;
        }

        fs::write(&wrapper, WRAPPER_SCRIPT)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&wrapper, fs::Permissions::from_mode(0o755))?;
        }
        info!("wrote apktool wrapper {}", wrapper.display());

        Ok(Self::at(wrapper))
    }

    pub fn decode_invocation(&self, mode: DecodeMode, apk: &Path, out: &Path) -> Invocation {
        Invocation::new(&self.wrapper)
            .arg("d")
            .args(mode.flags())
            .arg("-o")
            .arg(out)
            .arg(apk)
    }

    pub fn build_invocation(&self, mode: BuildMode, dir: &Path, out: &Path) -> Invocation {
        Invocation::new(&self.wrapper)
            .arg("b")
            .args(mode.flags())
            .arg("-o")
            .arg(out)
            .arg(dir)
    }

    /// Decodes `apk` into `out`, stepping down the ladder on non-zero exits.
    /// Returns the mode that succeeded; the last failure is returned when all
    /// modes fail.
    pub fn decode(&self, runner: &dyn ToolRunner, apk: &Path, out: &Path) -> Result<DecodeMode> {
        let mut last_error = None;
        for mode in DecodeMode::LADDER {
            info!("decoding {} ({:?})", apk.display(), mode);
            match run_checked(runner, &self.decode_invocation(mode, apk, out)) {
                Ok(_) => return Ok(mode),
                Err(e @ PipelineError::ToolFailed { .. }) => {
                    warn!("decode attempt {:?} failed: {}", mode, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            PipelineError::InvalidInput("empty decode ladder".to_string())
        }))
    }

    /// Rebuilds `dir` into `out`, first with aapt2, then with the default
    /// backend.
    pub fn build(&self, runner: &dyn ToolRunner, dir: &Path, out: &Path) -> Result<BuildMode> {
        let mut last_error = None;
        for mode in BuildMode::LADDER {
            info!("building {} ({:?})", out.display(), mode);
            match run_checked(runner, &self.build_invocation(mode, dir, out)) {
                Ok(_) => return Ok(mode),
                Err(e @ PipelineError::ToolFailed { .. }) => {
                    warn!("build attempt {:?} failed: {}", mode, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            PipelineError::InvalidInput("empty build ladder".to_string())
        }))
    }
}
