//! Packaging of rendered reports into a zip archive.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use zip::write::FileOptions;
use zip::CompressionMethod;

use crate::report::Report;

/// Replaces characters that are unsafe in archive entry and file names.
pub fn sanitize_file_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            ch if ch.is_control() => '_',
            ch => ch,
        })
        .collect();
    let trimmed = cleaned.trim_matches(|ch: char| ch == '.' || ch.is_whitespace());
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Assigns a unique, sanitized file name to every report, in order.
///
/// Names that collide after sanitizing get `-2`, `-3`, ... appended to the stem.
pub fn entry_names(reports: &[Report]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    reports
        .iter()
        .map(|report| {
            let stem = sanitize_file_stem(report.instrument_id());
            let mut name = format!("{}.{}", stem, report.extension());
            let mut suffix = 2;
            while !taken.insert(name.to_lowercase()) {
                name = format!("{}-{}.{}", stem, suffix, report.extension());
                suffix += 1;
            }
            name
        })
        .collect()
}

/// Errors raised while assembling or writing a bundle.
#[derive(Debug)]
pub enum ArchiveError {
    /// The zip container could not be written.
    Zip(zip::result::ZipError),
    /// Writing a file to disk failed.
    Io { path: PathBuf, source: io::Error },
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Zip(err)
    }
}

impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        Self::Zip(err.into())
    }
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zip(err) => write!(f, "Failed to build report archive: {err}"),
            Self::Io { path, .. } => write!(f, "Failed to write {}", path.display()),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Zip(err) => Some(err),
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// All reports of one run together with their zip archive.
#[derive(Clone, Debug)]
pub struct ReportBundle {
    reports: Vec<Report>,
    names: Vec<String>,
    archive: Vec<u8>,
}

impl ReportBundle {
    /// Packages `reports` in order. An empty list yields a valid, empty archive.
    pub fn assemble(reports: Vec<Report>) -> Result<Self, ArchiveError> {
        let names = entry_names(&reports);
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (report, name) in reports.iter().zip(&names) {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(report.bytes())?;
        }

        let archive = writer.finish()?.into_inner();
        Ok(Self {
            reports,
            names,
            archive,
        })
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// File names used for the reports, parallel to [`reports`](Self::reports).
    pub fn file_names(&self) -> &[String] {
        &self.names
    }

    pub fn archive(&self) -> &[u8] {
        &self.archive
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Writes every report and the archive named `archive_name` into `directory`.
    ///
    /// Returns the written paths, reports first and the archive last. An empty bundle writes
    /// nothing.
    pub fn write_to_dir(
        &self,
        directory: impl AsRef<Path>,
        archive_name: &str,
    ) -> Result<Vec<PathBuf>, ArchiveError> {
        let directory = directory.as_ref();
        if self.is_empty() {
            warn!("No reports to write; skipping {}", archive_name);
            return Ok(Vec::new());
        }
        fs::create_dir_all(directory).map_err(|source| ArchiveError::Io {
            path: directory.to_path_buf(),
            source,
        })?;

        let mut written = Vec::with_capacity(self.reports.len() + 1);
        let files = self
            .reports
            .iter()
            .zip(&self.names)
            .map(|(report, name)| (directory.join(name), report.bytes()))
            .chain(std::iter::once((
                directory.join(sanitize_file_stem(archive_name)),
                self.archive.as_slice(),
            )));

        for (path, bytes) in files {
            fs::write(&path, bytes).map_err(|source| ArchiveError::Io {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }

        info!(
            "Wrote {} reports and {} to {}",
            self.reports.len(),
            archive_name,
            directory.display()
        );
        Ok(written)
    }
}
