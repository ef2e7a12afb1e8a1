use crate::archive::{extract_tool_package, extract_zip};
use crate::config::PipelineConfig;
use crate::download::{download_verified, Fetch, HttpFetcher};
use crate::dump::run_dumper;
use crate::error::Result;
use crate::inject::{inject, select_main_package, InjectReport};
use crate::tools::{ProcessRunner, ToolRunner};
use crate::unpack::{unpack, NativePair};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where the fetch stage left its downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub bundle: PathBuf,
    pub bundle_entries: usize,
    pub dumper_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub fetched: Fetched,
    pub artifacts: NativePair,
    pub dump: PathBuf,
    pub inject: InjectReport,
}

/// One configuration plus the two seams every stage goes through.
pub struct Pipeline {
    pub config: PipelineConfig,
    runner: Box<dyn ToolRunner>,
    fetcher: Box<dyn Fetch>,
}

/// Extension of a downloaded tool package, taken from its URL so the
/// archive reader can pick the right format.
fn package_extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    if path.ends_with(".tar.gz") {
        "tar.gz"
    } else if path.ends_with(".tgz") {
        "tgz"
    } else {
        "zip"
    }
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        runner: Box<dyn ToolRunner>,
        fetcher: Box<dyn Fetch>,
    ) -> Self {
        Self {
            config,
            runner,
            fetcher,
        }
    }

    /// Real subprocesses and a real HTTP client.
    pub fn system(config: PipelineConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config.http)?;
        Ok(Self::new(config, Box::new(ProcessRunner), Box::new(fetcher)))
    }

    pub fn fetch(&self) -> Result<Fetched> {
        let config = &self.config;
        config.ensure_dirs()?;

        info!("downloading bundle");
        let bundle = download_verified(
            self.fetcher.as_ref(),
            &config.sources.bundle_url,
            &config.bundle_path(),
            config.sources.bundle_sha256.as_deref(),
        )?;

        let bundle_dir = config.bundle_dir();
        if bundle_dir.exists() {
            fs::remove_dir_all(&bundle_dir)?;
        }
        let bundle_entries = extract_zip(&bundle, &bundle_dir)?;

        info!("downloading Il2CppDumper");
        let dumper_url = &config.sources.dumper_url;
        let package = download_verified(
            self.fetcher.as_ref(),
            dumper_url,
            &config
                .temp_dir()
                .join(format!("Il2CppDumper.{}", package_extension(dumper_url))),
            config.sources.dumper_sha256.as_deref(),
        )?;
        let dumper_dir = config.dumper_dir();
        extract_tool_package(&package, &dumper_dir)?;
        info!("Il2CppDumper unpacked to {}", dumper_dir.display());

        Ok(Fetched {
            bundle,
            bundle_entries,
            dumper_dir,
        })
    }

    pub fn unpack(&self) -> Result<NativePair> {
        unpack(&self.config)
    }

    pub fn dump(&self) -> Result<PathBuf> {
        run_dumper(&self.config, self.runner.as_ref())
    }

    /// Injects `apk`, or the bundle's main package when none is given.
    pub fn inject(&self, apk: Option<&Path>) -> Result<InjectReport> {
        let apk = match apk {
            Some(p) => p.to_path_buf(),
            None => select_main_package(&self.config)?,
        };
        info!("injecting {}", apk.display());
        inject(
            &self.config,
            self.runner.as_ref(),
            self.fetcher.as_ref(),
            &apk,
        )
    }

    pub fn run_all(&self, apk: Option<&Path>) -> Result<RunReport> {
        let fetched = self.fetch()?;
        let artifacts = self.unpack()?;
        let dump = self.dump()?;
        let inject = self.inject(apk)?;
        Ok(RunReport {
            fetched,
            artifacts,
            dump,
            inject,
        })
    }
}
