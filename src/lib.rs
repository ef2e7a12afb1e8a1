pub mod apktool;
pub mod archive;
pub mod bootstrap;
pub mod config;
pub mod download;
pub mod dump;
pub mod elf;
pub mod error;
pub mod gadget;
pub mod inject;
pub mod manifest;
pub mod pipeline;
pub mod sign;
pub mod tools;
pub mod unpack;

pub use config::PipelineConfig;
pub use download::{Fetch, HttpFetcher};
pub use error::{PipelineError, Result};
pub use inject::InjectReport;
pub use pipeline::{Fetched, Pipeline, RunReport};
pub use sign::SignOutcome;
pub use tools::{Invocation, ProcessRunner, ToolOutput, ToolRunner};
pub use unpack::{ArtifactSearch, NativePair};
