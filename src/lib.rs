// Library root
// -----------
// This crate exposes the reconciliation logic behind the `roster-sync`
// binary. `main.rs` only parses arguments, sets up logging and wires these
// modules together.
//
// Module responsibilities:
// - `contact`: validated contact records and remote subscription states.
// - `roster`: turns CSV rows into contacts, keeping rejected rows countable.
// - `api`: blocking HTTP client for the mailing-list service, behind the
//   `MailingList` trait.
// - `reconcile`: looks contacts up and pushes or reports the unresolved ones.
// - `report`: the timestamped CSV report.
// - `config`: TOML run configuration.
// - `ui`: terminal prompts, progress and summaries.
pub mod api;
pub mod config;
pub mod contact;
pub mod error;
pub mod reconcile;
pub mod report;
pub mod roster;
pub mod ui;

pub use error::{Error, Result};
