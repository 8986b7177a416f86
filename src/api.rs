// API client module: a small blocking HTTP client for the Mailchimp
// marketing API. Only the two member endpoints the reconciler needs are
// covered, plus `ping` for credential checks.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::MailchimpSettings;
use crate::contact::{Contact, SubscriptionStatus};

/// Failure of a single remote call. `NotFound` is the only kind the
/// reconciler treats as an answer rather than an error.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("member not found")]
    NotFound,
    #[error("HTTP {0}: {1}")]
    Http(u16, String),
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// The remote mailing-list operations the reconciler depends on.
pub trait MailingList {
    /// Subscription status of the member with the given subscriber hash.
    fn member_status(&self, subscriber_hash: &str) -> Result<SubscriptionStatus, RemoteError>;

    /// Create the member, or update it if it already exists.
    fn upsert_member(&self, contact: &Contact) -> Result<(), RemoteError>;
}

/// Blocking Mailchimp client bound to one audience (list).
#[derive(Clone)]
pub struct MailchimpClient {
    client: Client,
    base_url: String,
    list_id: String,
    status_if_new: SubscriptionStatus,
}

/// Body of `PUT /lists/{list_id}/members/{hash}`.
#[derive(Serialize, Debug)]
pub struct UpsertRequest<'a> {
    pub email_address: &'a str,
    pub status_if_new: SubscriptionStatus,
    pub merge_fields: MergeFields<'a>,
}

#[derive(Serialize, Debug)]
pub struct MergeFields<'a> {
    #[serde(rename = "FNAME")]
    pub first_name: &'a str,
    #[serde(rename = "LNAME")]
    pub last_name: &'a str,
}

/// The part of a member record we read back.
#[derive(Deserialize, Debug)]
struct MemberResponse {
    status: String,
}

/// Mailchimp error bodies are RFC 7807 problem documents.
#[derive(Deserialize, Debug, Default)]
struct ProblemDocument {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

impl MailchimpClient {
    pub fn new(settings: &MailchimpSettings) -> Result<Self, RemoteError> {
        let base_url = settings.base_url().ok_or_else(|| {
            RemoteError::InvalidCredentials("API key has no datacenter suffix (e.g. `-us6`)".into())
        })?;

        let client = Client::builder()
            .user_agent(format!("roster-sync/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(auth_headers(&settings.account, &settings.api_key)?)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(MailchimpClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            list_id: settings.list_id.clone(),
            status_if_new: settings.status_if_new,
        })
    }

    fn member_url(&self, subscriber_hash: &str) -> String {
        format!("{}/lists/{}/members/{}", self.base_url, self.list_id, subscriber_hash)
    }

    /// Check that the API key is accepted.
    pub fn ping(&self) -> Result<(), RemoteError> {
        let url = format!("{}/ping", self.base_url);
        let res = self.client.get(&url).send().map_err(network)?;
        check_status(res).map(|_| ())
    }
}

impl MailingList for MailchimpClient {
    fn member_status(&self, subscriber_hash: &str) -> Result<SubscriptionStatus, RemoteError> {
        let url = self.member_url(subscriber_hash);
        debug!(%url, "looking up member");
        let res = self.client.get(&url).send().map_err(network)?;
        let member: MemberResponse = check_status(res)?
            .json()
            .map_err(|e| RemoteError::Parse(e.to_string()))?;
        SubscriptionStatus::from_remote(&member.status).map_err(|e| RemoteError::Parse(e.to_string()))
    }

    fn upsert_member(&self, contact: &Contact) -> Result<(), RemoteError> {
        let url = self.member_url(&contact.subscriber_hash);
        let body = UpsertRequest {
            email_address: contact.email.as_str(),
            status_if_new: self.status_if_new,
            merge_fields: MergeFields {
                first_name: &contact.first_name,
                last_name: &contact.last_name,
            },
        };
        debug!(%url, email = %contact.email, "upserting member");
        let res = self.client.put(&url).json(&body).send().map_err(network)?;
        check_status(res).map(|_| ())
    }
}

/// Basic auth with `account:api_key`; Mailchimp ignores the account part but
/// requires it to be present.
fn auth_headers(account: &str, api_key: &str) -> Result<HeaderMap, RemoteError> {
    let mut headers = HeaderMap::new();
    let token = STANDARD.encode(format!("{}:{}", account, api_key));
    let mut val = HeaderValue::from_str(&format!("Basic {}", token))
        .map_err(|e| RemoteError::InvalidCredentials(e.to_string()))?;
    val.set_sensitive(true);
    headers.insert(AUTHORIZATION, val);
    Ok(headers)
}

fn network(e: reqwest::Error) -> RemoteError {
    RemoteError::Network(e.to_string())
}

fn check_status(res: Response) -> Result<Response, RemoteError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(RemoteError::NotFound);
    }
    let txt = res.text().unwrap_or_default();
    let problem: ProblemDocument = serde_json::from_str(&txt).unwrap_or_default();
    let message = match (problem.title.is_empty(), problem.detail.is_empty()) {
        (_, false) => problem.detail,
        (false, true) => problem.title,
        (true, true) => txt,
    };
    Err(RemoteError::Http(status.as_u16(), message))
}
