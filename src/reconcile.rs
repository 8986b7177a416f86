// Status reconciliation: look every roster contact up on the remote list,
// then either push the ones that are missing or pending, or write them to a
// report file.
//
// Each contact is looked up exactly once. A failed lookup other than
// not-found leaves the contact's status unknown and keeps it out of both
// actions. A failed push is recorded on that contact's outcome and the
// loop moves on to the next one.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::{MailingList, RemoteError};
use crate::contact::{Contact, SubscriptionStatus};
use crate::error::Result;
use crate::report;
use crate::roster::Roster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Create or update missing and pending members on the remote list.
    Push,
    /// Only write missing and pending contacts to a local CSV.
    Report,
}

impl RunMode {
    pub fn from_push_flag(push: bool) -> Self {
        if push {
            RunMode::Push
        } else {
            RunMode::Report
        }
    }
}

/// Where report mode writes its file.
#[derive(Debug, Clone)]
pub struct ReportTarget {
    pub dir: PathBuf,
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushAction {
    Create,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupFailure {
    pub email: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushOutcome {
    pub email: String,
    pub action: PushAction,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub contacts: usize,
    pub rejected_rows: usize,
    pub statuses: BTreeMap<SubscriptionStatus, usize>,
    pub unknown: usize,
    pub lookup_failures: Vec<LookupFailure>,
    pub pushes: Vec<PushOutcome>,
    pub reported: usize,
    pub report_path: Option<PathBuf>,
}

impl RunSummary {
    pub fn failed_pushes(&self) -> usize {
        self.pushes.iter().filter(|p| !p.ok).count()
    }
}

/// Hooks for reporting progress while remote calls run.
pub trait Progress {
    fn lookup_done(&mut self, _contact: &Contact) {}
    fn push_started(&mut self, _total: usize) {}
    fn push_done(&mut self, _outcome: &PushOutcome) {}
}

impl Progress for () {}

/// Fetch the remote status of every contact and store it on the contact.
pub fn resolve_statuses<L, P>(roster: &mut Roster, remote: &L, progress: &mut P) -> Vec<LookupFailure>
where
    L: MailingList + ?Sized,
    P: Progress + ?Sized,
{
    let mut failures = Vec::new();
    for contact in roster.contacts_mut() {
        match remote.member_status(&contact.subscriber_hash) {
            Ok(status) => contact.status = Some(status),
            Err(RemoteError::NotFound) => contact.status = Some(SubscriptionStatus::NotPresent),
            Err(e) => {
                warn!(email = %contact.email, error = %e, "status lookup failed");
                contact.status = None;
                failures.push(LookupFailure {
                    email: contact.email.to_string(),
                    error: e.to_string(),
                });
            }
        }
        debug!(email = %contact.email, status = ?contact.status, "resolved");
        progress.lookup_done(contact);
    }
    failures
}

/// Contacts that are `pending` or `not_present`, in roster order.
pub fn pending_contacts(roster: &Roster) -> Vec<&Contact> {
    roster.contacts().filter(|c| c.needs_action()).collect()
}

/// Upsert every pending or missing contact. One failure does not stop the
/// rest.
pub fn push_pending<L, P>(roster: &Roster, remote: &L, progress: &mut P) -> Vec<PushOutcome>
where
    L: MailingList + ?Sized,
    P: Progress + ?Sized,
{
    let targets = pending_contacts(roster);
    progress.push_started(targets.len());

    let mut outcomes = Vec::with_capacity(targets.len());
    for contact in targets {
        let action = match contact.status {
            Some(SubscriptionStatus::Pending) => PushAction::Update,
            _ => PushAction::Create,
        };
        let result = remote.upsert_member(contact);
        if let Err(e) = &result {
            warn!(email = %contact.email, ?action, error = %e, "push failed");
        }
        let outcome = PushOutcome {
            email: contact.email.to_string(),
            action,
            ok: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        };
        progress.push_done(&outcome);
        outcomes.push(outcome);
    }
    outcomes
}

/// Resolve every contact's status, then push or report depending on `mode`.
pub fn reconcile<L, P>(
    roster: &mut Roster,
    remote: &L,
    mode: RunMode,
    target: &ReportTarget,
    progress: &mut P,
) -> Result<RunSummary>
where
    L: MailingList + ?Sized,
    P: Progress + ?Sized,
{
    let lookup_failures = resolve_statuses(roster, remote, &mut *progress);

    let mut statuses = BTreeMap::new();
    for status in roster.contacts().filter_map(|c| c.status) {
        *statuses.entry(status).or_insert(0) += 1;
    }
    info!(?statuses, failed = lookup_failures.len(), "statuses resolved");

    let mut summary = RunSummary {
        mode,
        contacts: roster.len(),
        rejected_rows: roster.rejected.len(),
        statuses,
        unknown: lookup_failures.len(),
        lookup_failures,
        pushes: Vec::new(),
        reported: 0,
        report_path: None,
    };

    match mode {
        RunMode::Push => {
            summary.pushes = push_pending(roster, remote, &mut *progress);
            info!(
                attempted = summary.pushes.len(),
                failed = summary.failed_pushes(),
                "push finished"
            );
        }
        RunMode::Report => {
            let pending = pending_contacts(roster);
            let now = chrono::Local::now();
            let path = report::write_report_file(&target.dir, &target.prefix, &now, pending.iter().copied())?;
            info!(path = %path.display(), rows = pending.len(), "report written");
            summary.reported = pending.len();
            summary.report_path = Some(path);
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory list keyed by email; anything absent is not found.
    #[derive(Default)]
    struct FakeList {
        members: HashMap<String, SubscriptionStatus>,
        broken_lookup: Vec<String>,
        broken_upsert: Vec<String>,
        lookups: RefCell<Vec<String>>,
        upserts: RefCell<Vec<(String, String, String)>>,
    }

    impl FakeList {
        fn with(members: &[(&str, SubscriptionStatus)]) -> Self {
            FakeList {
                members: members.iter().map(|(e, s)| (hash(e), *s)).collect(),
                ..Default::default()
            }
        }
    }

    fn hash(email: &str) -> String {
        crate::contact::Email::parse(email).unwrap().subscriber_hash()
    }

    impl MailingList for FakeList {
        fn member_status(&self, subscriber_hash: &str) -> std::result::Result<SubscriptionStatus, RemoteError> {
            self.lookups.borrow_mut().push(subscriber_hash.to_string());
            if self.broken_lookup.iter().any(|e| hash(e) == subscriber_hash) {
                return Err(RemoteError::Http(503, "unavailable".into()));
            }
            self.members.get(subscriber_hash).copied().ok_or(RemoteError::NotFound)
        }

        fn upsert_member(&self, contact: &Contact) -> std::result::Result<(), RemoteError> {
            if self.broken_upsert.iter().any(|e| e == contact.email.as_str()) {
                return Err(RemoteError::Network("connection reset".into()));
            }
            self.upserts.borrow_mut().push((
                contact.email.to_string(),
                contact.first_name.clone(),
                contact.last_name.clone(),
            ));
            Ok(())
        }
    }

    fn roster() -> Roster {
        Roster::from_rows([
            vec!["alice@example.com", "Alice", "Anders", "met at expo"],
            vec!["bob@example.com", "Bob", "Brown"],
            vec!["carol@example.com", "Carol", "Chen", "", "Dean"],
        ])
    }

    fn target(dir: &std::path::Path) -> ReportTarget {
        ReportTarget {
            dir: dir.to_path_buf(),
            prefix: "report".into(),
        }
    }

    fn report_rows(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(String::from)
            .collect()
    }

    #[test]
    fn mode_follows_push_flag() {
        assert_eq!(RunMode::from_push_flag(true), RunMode::Push);
        assert_eq!(RunMode::from_push_flag(false), RunMode::Report);
    }

    #[test]
    fn not_found_becomes_not_present() {
        let mut roster = roster();
        let remote = FakeList::with(&[("bob@example.com", SubscriptionStatus::Subscribed)]);

        let failures = resolve_statuses(&mut roster, &remote, &mut ());

        assert!(failures.is_empty());
        assert_eq!(roster.contacts["alice@example.com"].status, Some(SubscriptionStatus::NotPresent));
        assert_eq!(roster.contacts["bob@example.com"].status, Some(SubscriptionStatus::Subscribed));
        assert_eq!(remote.lookups.borrow().len(), 3);
    }

    #[test]
    fn settled_members_get_no_action() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeList::with(&[
            ("alice@example.com", SubscriptionStatus::Subscribed),
            ("bob@example.com", SubscriptionStatus::Unsubscribed),
            ("carol@example.com", SubscriptionStatus::Cleaned),
        ]);

        let mut r = roster();
        let summary = reconcile(&mut r, &remote, RunMode::Push, &target(dir.path()), &mut ()).unwrap();
        assert!(summary.pushes.is_empty());
        assert!(remote.upserts.borrow().is_empty());

        let mut r = roster();
        let summary = reconcile(&mut r, &remote, RunMode::Report, &target(dir.path()), &mut ()).unwrap();
        assert_eq!(summary.reported, 0);
        assert!(report_rows(summary.report_path.as_deref().unwrap()).is_empty());
    }

    #[test]
    fn pending_is_updated_and_missing_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeList::with(&[
            ("alice@example.com", SubscriptionStatus::Pending),
            ("bob@example.com", SubscriptionStatus::Subscribed),
        ]);
        let mut r = roster();

        let summary = reconcile(&mut r, &remote, RunMode::Push, &target(dir.path()), &mut ()).unwrap();

        let actions: Vec<(&str, PushAction, bool)> = summary
            .pushes
            .iter()
            .map(|p| (p.email.as_str(), p.action, p.ok))
            .collect();
        assert_eq!(
            actions,
            vec![
                ("alice@example.com", PushAction::Update, true),
                ("carol@example.com", PushAction::Create, true),
            ]
        );
        assert_eq!(summary.report_path, None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn push_failure_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut remote = FakeList::default();
        remote.broken_upsert.push("alice@example.com".into());
        let mut r = roster();

        let summary = reconcile(&mut r, &remote, RunMode::Push, &target(dir.path()), &mut ()).unwrap();

        assert_eq!(summary.pushes.len(), 3);
        assert_eq!(summary.failed_pushes(), 1);
        assert!(!summary.pushes[0].ok);
        assert!(summary.pushes[0].error.as_deref().unwrap().contains("connection reset"));
        assert_eq!(remote.upserts.borrow().len(), 2);
    }

    #[test]
    fn failed_lookup_leaves_contact_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let mut remote = FakeList::default();
        remote.broken_lookup.push("bob@example.com".into());
        let mut r = roster();

        let summary = reconcile(&mut r, &remote, RunMode::Push, &target(dir.path()), &mut ()).unwrap();

        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.lookup_failures[0].email, "bob@example.com");
        assert_eq!(r.contacts["bob@example.com"].status, None);
        let pushed: Vec<String> = remote.upserts.borrow().iter().map(|u| u.0.clone()).collect();
        assert_eq!(pushed, vec!["alice@example.com", "carol@example.com"]);
        // one lookup per contact, no retries
        assert_eq!(remote.lookups.borrow().len(), 3);
    }

    #[test]
    fn all_missing_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeList::default();

        let mut r = roster();
        let summary = reconcile(&mut r, &remote, RunMode::Report, &target(dir.path()), &mut ()).unwrap();
        let path = summary.report_path.clone().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text.lines().next(),
            Some("email_address,first_name,last_name,interaction_notes,job_role")
        );
        assert_eq!(
            report_rows(&path),
            vec![
                "alice@example.com,Alice,Anders,met at expo,",
                "bob@example.com,Bob,Brown,,",
                "carol@example.com,Carol,Chen,,Dean",
            ]
        );
        assert_eq!(summary.statuses.get(&SubscriptionStatus::NotPresent), Some(&3));

        let mut r = roster();
        let summary = reconcile(&mut r, &remote, RunMode::Push, &target(dir.path()), &mut ()).unwrap();
        assert!(summary.pushes.iter().all(|p| p.action == PushAction::Create && p.ok));
        assert_eq!(
            *remote.upserts.borrow(),
            vec![
                ("alice@example.com".to_string(), "Alice".to_string(), "Anders".to_string()),
                ("bob@example.com".to_string(), "Bob".to_string(), "Brown".to_string()),
                ("carol@example.com".to_string(), "Carol".to_string(), "Chen".to_string()),
            ]
        );
    }

    #[test]
    fn repeated_report_runs_produce_same_rows() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeList::with(&[("bob@example.com", SubscriptionStatus::Pending)]);

        let mut r = roster();
        let first = reconcile(&mut r, &remote, RunMode::Report, &target(dir.path()), &mut ()).unwrap();
        let mut r = roster();
        let second = reconcile(&mut r, &remote, RunMode::Report, &target(dir.path()), &mut ()).unwrap();

        let first = first.report_path.unwrap();
        let second = second.report_path.unwrap();
        assert_ne!(first, second);
        assert_eq!(report_rows(&first), report_rows(&second));
        assert_eq!(report_rows(&first).len(), 3);
    }

    #[derive(Default)]
    struct Recorder {
        looked: usize,
        push_total: Option<usize>,
        pushed: usize,
    }

    impl Progress for Recorder {
        fn lookup_done(&mut self, _contact: &Contact) {
            self.looked += 1;
        }
        fn push_started(&mut self, total: usize) {
            self.push_total = Some(total);
        }
        fn push_done(&mut self, _outcome: &PushOutcome) {
            self.pushed += 1;
        }
    }

    #[test]
    fn progress_sees_every_remote_call() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeList::with(&[("carol@example.com", SubscriptionStatus::Subscribed)]);
        let mut r = roster();
        let mut recorder = Recorder::default();

        reconcile(&mut r, &remote, RunMode::Push, &target(dir.path()), &mut recorder).unwrap();

        assert_eq!(recorder.looked, 3);
        assert_eq!(recorder.push_total, Some(2));
        assert_eq!(recorder.pushed, 2);
    }
}
