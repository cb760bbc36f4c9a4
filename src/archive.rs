//! Invoice discovery and archiving

use crate::invoice::Vendor;
use crate::FaturaError;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

/// A PDF found in the scanned directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// Vendor named in the file name, if any
    pub vendor: Option<Vendor>,
}

/// List the regular files of `dir` whose name contains ".pdf", by name
pub fn scan_directory<P: AsRef<Path>>(dir: P) -> Result<Vec<ScannedFile>, FaturaError> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir.as_ref())? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.to_lowercase().contains(".pdf") {
            continue;
        }
        files.push(ScannedFile {
            vendor: Vendor::from_file_name(&name),
            path: entry.path(),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Move the scanned files into `dir/YYYY-MM-DD`, creating it if needed
pub fn archive_files<P: AsRef<Path>>(
    dir: P,
    files: &[ScannedFile],
    today: NaiveDate,
) -> Result<PathBuf, FaturaError> {
    let target = dir.as_ref().join(today.format("%Y-%m-%d").to_string());
    fs::create_dir_all(&target)?;

    for file in files {
        let Some(name) = file.path.file_name() else {
            continue;
        };
        let destination = target.join(name);
        fs::rename(&file.path, &destination)?;
        log::info!("Archived {} to {}", file.path.display(), destination.display());
    }

    Ok(target)
}
