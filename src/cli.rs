use anyhow::{Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::RemoteConfig;

#[derive(Parser, Debug)]
#[command(name = "zipfetch")]
#[command(version)]
#[command(about = "Extract one file from a remote ZIP archive using HTTP Range requests", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipfetch -u https://example.com/a.zip -l                 list entries\n  \
  zipfetch -u https://example.com/a.zip -r docs/readme.txt  extract to ./readme.txt\n  \
  zipfetch -u https://example.com/a.zip -r data.bin -o -    write to stdout")]
pub struct Cli {
    /// URL of the remote ZIP archive
    #[arg(short = 'u', value_name = "URL")]
    pub url: String,

    /// Name of the entry to extract
    #[arg(short = 'r', value_name = "NAME", required_unless_present = "list")]
    pub remote_file: Option<String>,

    /// Output file, `-` for stdout (default: base name of the entry)
    #[arg(short = 'o', value_name = "PATH")]
    pub output: Option<String>,

    /// Timeout for each request, in seconds
    #[arg(short = 't', value_name = "SECS", default_value_t = 5)]
    pub timeout: u64,

    /// Show a progress bar and transfer summary
    #[arg(short = 'v')]
    pub verbose: bool,

    /// List entries in the archive
    #[arg(short = 'l')]
    pub list: bool,
}

/// Where extracted bytes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl Cli {
    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig::new(self.url.clone()).with_timeout(Duration::from_secs(self.timeout))
    }

    pub fn output_target(&self, entry_name: &str) -> Result<OutputTarget> {
        match self.output.as_deref() {
            Some("-") => Ok(OutputTarget::Stdout),
            Some(path) => Ok(OutputTarget::File(PathBuf::from(path))),
            None => match Path::new(entry_name).file_name() {
                Some(base) => Ok(OutputTarget::File(PathBuf::from(base))),
                None => bail!("Cannot derive an output name from {:?}, use -o", entry_name),
            },
        }
    }
}
