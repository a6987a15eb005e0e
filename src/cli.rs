use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

#[derive(Debug, Parser)]
#[command(name = "mediasync")]
#[command(version)]
#[command(about = "Keeps a media catalog in sync with watched directories")]
#[command(long_about = "mediasync watches the directories listed in its watch_dirs file and mirrors every file addition, edit, deletion and rename into the media catalog.")]
pub struct Cli {
    /// Don't log or print anything
    #[arg(short, long)]
    pub quiet: bool,

    /// Show debug information
    #[arg(short, long)]
    pub verbose: bool,

    /// Log to stdout instead of the log file
    #[arg(short = 's', long = "stdout")]
    pub stdout: bool,

    /// Path to the file with the directories to watch
    #[arg(short = 'w', long = "watch-dirs-file", value_name = "PATH")]
    pub watch_file: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Local wall-clock timestamps, `2024-05-01 12:00:00`.
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

impl Cli {
    /// Parses the command line. Usage errors print the usage and exit with status 1.
    pub fn parse_or_exit() -> Self {
        match Cli::try_parse() {
            Ok(cli) => cli,
            Err(err) if !err.use_stderr() => err.exit(),
            Err(err) => {
                eprint!("mediasync: ");
                let _ = err.print();
                std::process::exit(1);
            }
        }
    }

    pub fn config_path(&self, config_dir: &Path) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| config_dir.join("config.toml"))
    }

    /// The watch-directories file: the flag, then the configured one, then the default.
    pub fn watch_file_path(&self, configured: Option<&Path>, config_dir: &Path) -> PathBuf {
        self.watch_file
            .clone()
            .or_else(|| configured.map(Path::to_path_buf))
            .unwrap_or_else(|| config_dir.join("watch_dirs"))
    }

    pub fn setup_logging(&self, log_path: &Path) -> Result<()> {
        if self.quiet {
            return Ok(());
        }

        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        let builder = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_timer(LocalTime)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false);

        if self.stdout {
            builder.init();
        } else {
            let file = File::create(log_path)
                .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
            println!("starting mediasync, log at {}", log_path.display());
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        Ok(())
    }
}
