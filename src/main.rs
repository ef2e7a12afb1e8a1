use apkrig::{InjectReport, Pipeline, PipelineConfig, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "apkrig")]
#[command(about = "Fetch an XAPK, pull its il2cpp artifacts, dump them and inject a Frida gadget")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding temp/, tools/ and output/
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// JSON file overriding layout, sources and tool settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the bundle and Il2CppDumper, and unpack both
    Fetch {
        /// Bundle URL to download instead of the configured one
        #[arg(long)]
        url: Option<String>,
    },

    /// Extract the inner packages and copy out libil2cpp.so and global-metadata.dat
    Unpack,

    /// Run Il2CppDumper against the extracted artifacts
    Dump,

    /// Inject the Frida gadget, rebuild and sign
    Inject {
        /// Package to inject (defaults to the bundle's main package)
        #[arg(long)]
        apk: Option<PathBuf>,
    },

    /// Every stage in order
    Run {
        /// Bundle URL to download instead of the configured one
        #[arg(long)]
        url: Option<String>,

        /// Package to inject (defaults to the bundle's main package)
        #[arg(long)]
        apk: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("[!] {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(root: &Path, file: Option<&Path>) -> Result<PipelineConfig> {
    let root = std::path::absolute(root)?;
    match file {
        Some(path) => PipelineConfig::load(root, path),
        None => Ok(PipelineConfig::with_root(root)),
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(&cli.root, cli.config.as_deref())?;

    if let Commands::Fetch { url: Some(ref url) } | Commands::Run { url: Some(ref url), .. } =
        cli.command
    {
        config.sources.bundle_url = url.clone();
    }

    let pipeline = Pipeline::system(config)?;

    match cli.command {
        Commands::Fetch { .. } => {
            let fetched = pipeline.fetch()?;
            println!(
                "[*] bundle: {} ({} entries)",
                fetched.bundle.display(),
                fetched.bundle_entries
            );
            println!("[*] dumper: {}", fetched.dumper_dir.display());
        }
        Commands::Unpack => {
            let pair = pipeline.unpack()?;
            println!("[*] {}", pair.library.display());
            println!("[*] {}", pair.metadata.display());
        }
        Commands::Dump => {
            let dump = pipeline.dump()?;
            println!("[*] {}", dump.display());
        }
        Commands::Inject { apk } => {
            let report = pipeline.inject(apk.as_deref())?;
            print_inject(&report);
        }
        Commands::Run { apk, .. } => {
            let report = pipeline.run_all(apk.as_deref())?;
            println!("[*] {}", report.dump.display());
            print_inject(&report.inject);
        }
    }

    Ok(())
}

fn print_inject(report: &InjectReport) {
    if !report.instrumented() {
        println!("[?] rebuild failed, output is the original package");
    }
    let label = if report.signed.is_signed() {
        "signed"
    } else {
        "unsigned"
    };
    println!("[*] {}: {}", label, report.signed.path().display());
    for split in &report.splits {
        println!("[*] split: {}", split.outcome.path().display());
    }
}
