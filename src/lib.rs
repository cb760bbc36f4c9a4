//! Utility invoice PDFs to Google Calendar payment reminders
//!
//! This crate provides:
//! - Page text line extraction from invoice PDFs using lopdf
//! - Positional field extraction for EDP, EPAL and Gold Energy payment slips
//! - Reminder event construction and insertion through the Calendar API
//! - Archiving of processed files into a date-stamped folder

pub mod archive;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod event;
pub mod extractor;
pub mod invoice;
pub mod tounicode;
pub mod vendors;

pub use archive::{archive_files, scan_directory, ScannedFile};
pub use config::Config;
pub use event::{EventRequest, ReminderEvent};
pub use extractor::{page_lines, PageSelector};
pub use invoice::{Invoice, Vendor};

use std::path::{Path, PathBuf};

/// Outcome of a full processing run
#[derive(Debug)]
pub struct RunSummary {
    /// Events built from the recognized invoices, in insertion order
    pub events: Vec<ReminderEvent>,
    /// Links of the created calendar events (empty on a dry run)
    pub links: Vec<String>,
    /// Folder the scanned files were moved into, if archiving ran
    pub archive_dir: Option<PathBuf>,
}

/// Extract every recognized invoice and build its reminder event.
///
/// Events come out grouped EDP, then EPAL, then Gold, keeping the scan order
/// within each vendor. Unrecognized files are skipped.
pub fn collect_events(files: &[ScannedFile]) -> Result<Vec<ReminderEvent>, FaturaError> {
    let mut extracted = Vec::new();

    for file in files {
        let Some(vendor) = file.vendor else {
            log::warn!("Skipping {}: no known vendor in file name", file.path.display());
            continue;
        };
        log::info!("Reading {} invoice {}", vendor, file.path.display());
        let invoice = vendors::extract(vendor, &file.path).map_err(|e| FaturaError::Invoice {
            vendor,
            path: file.path.clone(),
            source: Box::new(e),
        })?;
        extracted.push((vendor, invoice));
    }

    // sort_by_key is stable, so name order survives within a vendor
    extracted.sort_by_key(|(vendor, _)| vendor.event_order());

    Ok(extracted
        .iter()
        .map(|(vendor, invoice)| ReminderEvent::from_invoice(*vendor, invoice))
        .collect())
}

/// Run the whole pipeline: scan, extract, create events, archive.
pub fn run(config: &Config) -> Result<RunSummary, FaturaError> {
    let files = scan_directory(&config.directory)?;
    log::info!(
        "Found {} PDF file(s) in {}",
        files.len(),
        config.directory.display()
    );

    let events = collect_events(&files)?;

    if config.dry_run {
        for event in &events {
            log::info!("Dry run, not creating {} on {}", event.title, event.start);
        }
        return Ok(RunSummary {
            events,
            links: Vec::new(),
            archive_dir: None,
        });
    }

    let token = auth::authorize(config).map_err(FaturaError::into_auth)?;
    let client = calendar::CalendarClient::with_base_url(&token.access_token, &config.api_base)?;

    let mut links = Vec::with_capacity(events.len());
    for event in &events {
        let request = event.to_request(&config.time_zone);
        let link = client.insert_event(&config.calendar_id, &request)?;
        log::info!("Created event for {} at {}", event.title, link);
        links.push(link);
    }

    let archive_dir = if config.archive {
        let today = chrono::Local::now().date_naive();
        Some(archive_files(&config.directory, &files, today)?)
    } else {
        None
    };

    Ok(RunSummary {
        events,
        links,
        archive_dir,
    })
}

#[derive(Debug, thiserror::Error)]
pub enum FaturaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("PDF has no pages")]
    MissingPage,
    #[error("unexpected {vendor} invoice layout: {reason}")]
    Layout { vendor: Vendor, reason: String },
    #[error("cannot read {vendor} invoice {}: {source}", path.display())]
    Invoice {
        vendor: Vendor,
        path: PathBuf,
        #[source]
        source: Box<FaturaError>,
    },
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Calendar API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FaturaError {
    /// Fold any failure during authorization into `Auth`.
    fn into_auth(self) -> Self {
        match self {
            FaturaError::Auth(_) => self,
            other => FaturaError::Auth(other.to_string()),
        }
    }
}

impl From<lopdf::Error> for FaturaError {
    fn from(e: lopdf::Error) -> Self {
        FaturaError::Parse(e.to_string())
    }
}

impl From<toml::de::Error> for FaturaError {
    fn from(e: toml::de::Error) -> Self {
        FaturaError::Config(e.to_string())
    }
}

/// Read the text lines of an invoice's page and log them at debug level.
pub(crate) fn read_invoice_lines(
    path: &Path,
    page: PageSelector,
) -> Result<Vec<String>, FaturaError> {
    let lines = page_lines(path, page)?;
    for (i, line) in lines.iter().enumerate() {
        log::debug!("{}:{:>3} {:?}", path.display(), i, line);
    }
    Ok(lines)
}
