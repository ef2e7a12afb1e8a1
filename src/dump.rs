use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::tools::{run_checked, Invocation, ToolRunner};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Builds the dumper command line: `[launcher] <dumper> <lib> <metadata> <out>`.
pub fn dumper_invocation(config: &PipelineConfig) -> Invocation {
    let dumper = config.dumper_executable();
    let base = match config.dumper.launcher {
        Some(ref launcher) => Invocation::new(launcher).arg(&dumper),
        None => Invocation::new(&dumper),
    };
    base.arg(config.library_output())
        .arg(config.metadata_output())
        .arg(config.dump_dir())
        .stdin(config.dumper.menu_input.clone())
}

/// Runs the dumper against the installed artifact pair and copies its
/// listing to `output/dump.cs`.
pub fn run_dumper(config: &PipelineConfig, runner: &dyn ToolRunner) -> Result<PathBuf> {
    for required in [
        config.library_output(),
        config.metadata_output(),
        config.dumper_executable(),
    ] {
        if !required.is_file() {
            return Err(PipelineError::FileNotFound(required));
        }
    }

    fs::create_dir_all(config.dump_dir())?;

    info!("running Il2CppDumper");
    let output = run_checked(runner, &dumper_invocation(config))?;
    if !output.stdout.trim().is_empty() {
        info!("{}", output.stdout.trim_end());
    }
    if !output.stderr.trim().is_empty() {
        debug!("dumper stderr: {}", output.stderr.trim_end());
    }

    let produced = config.dump_dir().join(&config.dumper.dump_relative_path);
    if !produced.is_file() {
        return Err(PipelineError::DumpNotProduced(produced));
    }

    let dest = config.dump_output();
    fs::copy(&produced, &dest)?;
    info!("dump written to {}", dest.display());
    Ok(dest)
}
