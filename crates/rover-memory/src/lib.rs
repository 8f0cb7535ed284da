//! `rover-memory` – what the robot is trying to do and what it has done.
//!
//! # Modules
//!
//! - [`directive`] – [`Directive`][directive::Directive] (goal, last heard
//!   utterance, bounded exchange history) and the
//!   [`DirectiveStore`][directive::DirectiveStore] that owns it.
//! - [`journal`] – [`DirectiveJournal`][journal::DirectiveJournal]: an
//!   append-only SQLite log that lets the store survive restarts.

pub mod directive;
pub mod journal;

pub use directive::{DEFAULT_CAPACITY, DEFAULT_GOAL, Directive, DirectiveStore, Exchange};
pub use journal::{DirectiveJournal, EntryKind, JournalEntry, JournalError};
