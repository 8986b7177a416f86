// CSV report of contacts that still need attention.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::contact::Contact;
use crate::error::{Error, Result};

pub const REPORT_HEADER: [&str; 5] = [
    "email_address",
    "first_name",
    "last_name",
    "interaction_notes",
    "job_role",
];

/// Write the header and one row per contact.
pub fn write_report<'a, W, I>(writer: W, contacts: I) -> std::result::Result<usize, csv::Error>
where
    W: Write,
    I: IntoIterator<Item = &'a Contact>,
{
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(REPORT_HEADER)?;
    let mut rows = 0;
    for contact in contacts {
        csv_writer.write_record([
            contact.email.as_str(),
            contact.first_name.as_str(),
            contact.last_name.as_str(),
            contact.note.as_deref().unwrap_or(""),
            contact.role.as_deref().unwrap_or(""),
        ])?;
        rows += 1;
    }
    csv_writer.flush()?;
    Ok(rows)
}

/// `<prefix>_<YYYYmmdd_HHMMSS>.csv`
pub fn report_file_name<Tz>(prefix: &str, timestamp: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}_{}.csv", prefix, timestamp.format("%Y%m%d_%H%M%S"))
}

/// Write the report into `dir` under a timestamped name and return its path.
/// An existing file is never overwritten; a numeric suffix is added instead.
pub fn write_report_file<'a, Tz, I>(
    dir: &Path,
    prefix: &str,
    timestamp: &DateTime<Tz>,
    contacts: I,
) -> Result<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
    I: IntoIterator<Item = &'a Contact>,
{
    std::fs::create_dir_all(dir)?;
    let base = report_file_name(prefix, timestamp);
    let stem = base.trim_end_matches(".csv");

    let mut attempt = 0;
    let (path, file) = loop {
        let name = if attempt == 0 {
            base.clone()
        } else {
            format!("{stem}_{attempt}.csv")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => break (path, file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    };

    write_report(file, contacts).map_err(|source| Error::Report {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
