// Contact records and the remote subscription status they carry.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use md5::{Digest, Md5};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Applied to the lowercased address. Commas and whitespace are never allowed
// and the domain must end in an alphabetic top-level segment.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,}$")
        .expect("email pattern compiles")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContactError {
    #[error("invalid email address: {0:?}")]
    InvalidEmail(String),
    #[error("first name is empty")]
    EmptyFirstName,
    #[error("last name is empty")]
    EmptyLastName,
}

/// A syntactically valid, trimmed and lowercased email address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, ContactError> {
        let normalized = raw.trim().to_lowercase();
        if EMAIL_RE.is_match(&normalized) {
            Ok(Email(normalized))
        } else {
            Err(ContactError::InvalidEmail(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Member identifier used by the mailing-list service: hex MD5 of the
    /// lowercased address.
    pub fn subscriber_hash(&self) -> String {
        format!("{:x}", Md5::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subscription state of a contact on the remote list. `NotPresent` is
/// never sent by the service; it is synthesized from a not-found lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Subscribed,
    Pending,
    Unsubscribed,
    Cleaned,
    NotPresent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised subscription status: {0:?}")]
pub struct UnknownStatus(pub String);

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 5] = [
        Self::Subscribed,
        Self::Pending,
        Self::Unsubscribed,
        Self::Cleaned,
        Self::NotPresent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::Pending => "pending",
            Self::Unsubscribed => "unsubscribed",
            Self::Cleaned => "cleaned",
            Self::NotPresent => "not_present",
        }
    }

    /// Parse a status string returned by the mailing-list service. Only the
    /// four remote states are accepted; `not_present` is never sent.
    pub fn from_remote(s: &str) -> Result<Self, UnknownStatus> {
        match s.parse()? {
            Self::NotPresent => Err(UnknownStatus(s.to_string())),
            status => Ok(status),
        }
    }

    /// Whether a contact in this state gets pushed or reported.
    pub fn needs_action(&self) -> bool {
        matches!(self, Self::Pending | Self::NotPresent)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// One person from the local roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub note: Option<String>,
    pub role: Option<String>,
    pub subscriber_hash: String,
    /// `None` until the remote lookup has run (or when it failed).
    pub status: Option<SubscriptionStatus>,
}

impl Contact {
    pub fn new(
        email: &str,
        first_name: &str,
        last_name: &str,
        note: Option<&str>,
        role: Option<&str>,
    ) -> Result<Self, ContactError> {
        let email = Email::parse(email)?;
        let first_name = normalize_name(first_name);
        if first_name.is_empty() {
            return Err(ContactError::EmptyFirstName);
        }
        let last_name = normalize_name(last_name);
        if last_name.is_empty() {
            return Err(ContactError::EmptyLastName);
        }
        let subscriber_hash = email.subscriber_hash();

        Ok(Contact {
            email,
            first_name,
            last_name,
            note: optional_field(note),
            role: optional_field(role),
            subscriber_hash,
            status: None,
        })
    }

    /// True once the status is known and it calls for a push or a report row.
    pub fn needs_action(&self) -> bool {
        self.status.is_some_and(|s| s.needs_action())
    }
}

// Commas are dropped so names survive flat-text and CSV re-serialization.
fn normalize_name(raw: &str) -> String {
    raw.replace(',', "").trim().to_string()
}

fn optional_field(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}
