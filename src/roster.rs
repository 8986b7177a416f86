// Roster loading: CSV rows in, validated and de-duplicated contacts out.
//
// Columns are positional: email, first name, last name, then optional note
// and role. Rows that fail validation are kept aside in `Roster::rejected`
// rather than reported as errors.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::contact::{Contact, ContactError};
use crate::error::{Error, Result};

const MIN_FIELDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooFewFields(usize),
    Invalid(ContactError),
}

/// Accept/reject decision for a single input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Accepted(Contact),
    Rejected { line: u64, reason: RejectReason },
}

pub fn parse_row(line: u64, fields: &[&str]) -> RowOutcome {
    if fields.len() < MIN_FIELDS {
        return RowOutcome::Rejected {
            line,
            reason: RejectReason::TooFewFields(fields.len()),
        };
    }
    let optional = |i: usize| fields.get(i).copied();
    match Contact::new(fields[0], fields[1], fields[2], optional(3), optional(4)) {
        Ok(contact) => RowOutcome::Accepted(contact),
        Err(e) => RowOutcome::Rejected {
            line,
            reason: RejectReason::Invalid(e),
        },
    }
}

/// Contacts keyed by normalized email address.
#[derive(Debug, Default)]
pub struct Roster {
    pub contacts: BTreeMap<String, Contact>,
    pub rejected: Vec<(u64, RejectReason)>,
}

impl Roster {
    /// Build a roster from already-split rows. Later rows replace earlier
    /// rows with the same address.
    pub fn from_rows<I, R, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut roster = Roster::default();
        for (row, line) in rows.into_iter().zip(1u64..) {
            let fields: Vec<&str> = row.as_ref().iter().map(|s| s.as_ref()).collect();
            roster.push(parse_row(line, &fields));
        }
        roster
    }

    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Self, csv::Error> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut roster = Roster::default();
        for (record, fallback_line) in csv_reader.records().zip(1u64..) {
            let record = record?;
            let line = record.position().map_or(fallback_line, |p| p.line());
            let fields: Vec<&str> = record.iter().collect();
            roster.push(parse_row(line, &fields));
        }
        Ok(roster)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let roster = File::open(path)
            .map_err(csv::Error::from)
            .and_then(Self::from_reader)
            .map_err(|source| Error::Roster {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            path = %path.display(),
            contacts = roster.len(),
            rejected = roster.rejected.len(),
            "loaded roster"
        );
        Ok(roster)
    }

    fn push(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Accepted(contact) => {
                let key = contact.email.as_str().to_string();
                if self.contacts.insert(key.clone(), contact).is_some() {
                    debug!(email = %key, "duplicate address, keeping later row");
                }
            }
            RowOutcome::Rejected { line, reason } => {
                debug!(line, ?reason, "skipping roster row");
                self.rejected.push((line, reason));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values()
    }

    pub fn contacts_mut(&mut self) -> impl Iterator<Item = &mut Contact> {
        self.contacts.values_mut()
    }
}
