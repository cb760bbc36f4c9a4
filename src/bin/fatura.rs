//! CLI that turns the invoices of a directory into calendar reminders

use clap::Parser;
use fatura_calendar::{run, Config, FaturaError};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "fatura", version, about = "Create payment reminders from EDP, EPAL and Gold invoices")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the invoice PDFs
    #[arg(long)]
    dir: Option<PathBuf>,

    /// OAuth client secrets file
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Token cache file
    #[arg(long)]
    token: Option<PathBuf>,

    /// Calendar to create the events in
    #[arg(long)]
    calendar: Option<String>,

    /// Extract and show the events without calling the API or moving files
    #[arg(long)]
    dry_run: bool,

    /// Leave the processed files in place
    #[arg(long)]
    no_archive: bool,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<Config, FaturaError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(dir) = self.dir {
            config.directory = dir;
        }
        if let Some(credentials) = self.credentials {
            config.credentials_path = credentials;
        }
        if let Some(token) = self.token {
            config.token_path = token;
        }
        if let Some(calendar) = self.calendar {
            config.calendar_id = calendar;
        }
        config.dry_run |= self.dry_run;
        if self.no_archive {
            config.archive = false;
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    match run(&config) {
        Ok(summary) => {
            for event in &summary.events {
                println!("{} ({})", event.title, event.start.format("%d-%m-%Y"));
                if config.dry_run {
                    print!("{}", event.description);
                }
            }
            if let Some(dir) = &summary.archive_dir {
                println!("Archived into {}", dir.display());
            }
        }
        Err(FaturaError::Auth(reason)) => {
            log::debug!("{}", reason);
            eprintln!("An error occurred with the Google Calendar API");
            process::exit(1);
        }
        Err(FaturaError::Invoice { vendor, path, source }) => {
            eprintln!("Could not read the {} invoice {}: {}", vendor, path.display(), source);
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
