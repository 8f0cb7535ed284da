//! The robot's current goal and its recent history.
//!
//! A [`Directive`] is mutated from two directions: the user (a transcript
//! sets the last utterance, and the decision phase may replace the goal on
//! the user's behalf) and the orchestrator itself (each cycle appends an
//! [`Exchange`] summarising what was asked and what was done). History is
//! bounded; the oldest exchange is evicted first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rover_types::RoverError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::journal::{DirectiveJournal, JournalEntry};

pub const DEFAULT_GOAL: &str = "look for companionship and instruction";
pub const DEFAULT_CAPACITY: usize = 20;

/// One decision round: what the robot was told, and what it did about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub at: DateTime<Utc>,
    pub prompt: String,
    pub response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    goal: String,
    last_utterance: Option<String>,
    history: VecDeque<Exchange>,
    capacity: usize,
}

impl Directive {
    pub fn new(goal: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            goal: goal.into(),
            last_utterance: None,
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn last_utterance(&self) -> Option<&str> {
        self.last_utterance.as_deref()
    }

    /// Oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = &Exchange> {
        self.history.iter()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hear(&mut self, transcript: &str) {
        self.last_utterance = Some(transcript.to_string());
    }

    /// Append an exchange, evicting the oldest when full.
    pub fn record(&mut self, prompt: &str, response: &str) -> &Exchange {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(Exchange {
            at: Utc::now(),
            prompt: prompt.to_string(),
            response: response.to_string(),
        });
        &self.history[self.history.len() - 1]
    }

    /// Replace the goal. Blank goals are ignored; returns whether it changed.
    pub fn set_goal(&mut self, goal: &str) -> bool {
        let goal = goal.trim();
        if goal.is_empty() || goal == self.goal {
            return false;
        }
        self.goal = goal.to_string();
        true
    }

    fn restore_history(&mut self, exchanges: Vec<Exchange>) {
        for exchange in exchanges {
            if self.history.len() == self.capacity {
                self.history.pop_front();
            }
            self.history.push_back(exchange);
        }
    }
}

impl Default for Directive {
    fn default() -> Self {
        Self::new(DEFAULT_GOAL, DEFAULT_CAPACITY)
    }
}

/// Owns the [`Directive`] and, optionally, journals every change.
///
/// Journal write failures are logged and otherwise ignored: the in-memory
/// directive is authoritative for the running process.
pub struct DirectiveStore {
    directive: Directive,
    journal: Option<DirectiveJournal>,
}

impl DirectiveStore {
    /// A store with no persistence.
    pub fn in_memory(goal: &str, capacity: usize) -> Self {
        Self {
            directive: Directive::new(goal, capacity),
            journal: None,
        }
    }

    /// Restore the latest goal and the most recent `capacity` exchanges from
    /// `journal`, falling back to `default_goal`.
    pub fn open(
        journal: DirectiveJournal,
        default_goal: &str,
        capacity: usize,
    ) -> Result<Self, RoverError> {
        let goal = journal
            .latest_goal()?
            .unwrap_or_else(|| default_goal.to_string());
        let mut directive = Directive::new(goal, capacity);
        directive.restore_history(journal.recent_exchanges(directive.capacity())?);
        info!(
            goal = %directive.goal(),
            restored = directive.history.len(),
            "directive restored from journal"
        );
        Ok(Self {
            directive,
            journal: Some(journal),
        })
    }

    pub fn directive(&self) -> &Directive {
        &self.directive
    }

    pub fn hear(&mut self, transcript: &str) {
        self.directive.hear(transcript);
        self.journal(JournalEntry::utterance(transcript));
    }

    pub fn record(&mut self, prompt: &str, response: &str) {
        let entry = JournalEntry::exchange(self.directive.record(prompt, response));
        self.journal(entry);
    }

    pub fn set_goal(&mut self, goal: &str) -> bool {
        if !self.directive.set_goal(goal) {
            return false;
        }
        info!(goal = %self.directive.goal(), "directive goal changed");
        self.journal(JournalEntry::goal(self.directive.goal()));
        true
    }

    fn journal(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&entry) {
                warn!(error = %e, kind = ?entry.kind, "journal write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directive_uses_default_goal() {
        let d = Directive::default();
        assert_eq!(d.goal(), DEFAULT_GOAL);
        assert_eq!(d.capacity(), DEFAULT_CAPACITY);
        assert_eq!(d.history().len(), 0);
        assert_eq!(d.last_utterance(), None);
    }

    #[test]
    fn history_evicts_oldest_first() {
        let mut d = Directive::new("g", 3);
        for i in 0..5 {
            d.record(&format!("p{i}"), "ok");
        }
        let prompts: Vec<_> = d.history().map(|e| e.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["p2", "p3", "p4"]);
    }

    #[test]
    fn blank_goals_are_ignored() {
        let mut d = Directive::default();
        assert!(!d.set_goal("   "));
        assert_eq!(d.goal(), DEFAULT_GOAL);
        assert!(d.set_goal("  find the red ball "));
        assert_eq!(d.goal(), "find the red ball");
        assert!(!d.set_goal("find the red ball"));
    }

    #[test]
    fn hear_replaces_last_utterance() {
        let mut d = Directive::default();
        d.hear("hello");
        d.hear("come here");
        assert_eq!(d.last_utterance(), Some("come here"));
    }

    #[test]
    fn store_restores_goal_and_recent_history_from_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        {
            let mut store =
                DirectiveStore::open(DirectiveJournal::open(&path).unwrap(), DEFAULT_GOAL, 2)
                    .unwrap();
            assert_eq!(store.directive().goal(), DEFAULT_GOAL);
            store.hear("guard the door");
            assert!(store.set_goal("guard the door"));
            store.record("a", "stop -> ok");
            store.record("b", "wait -> ok");
            store.record("c", "turn_left -> failed");
        }

        let store =
            DirectiveStore::open(DirectiveJournal::open(&path).unwrap(), DEFAULT_GOAL, 2).unwrap();
        assert_eq!(store.directive().goal(), "guard the door");
        let prompts: Vec<_> = store
            .directive()
            .history()
            .map(|e| e.prompt.as_str())
            .collect();
        assert_eq!(prompts, vec!["b", "c"]);
    }

    #[test]
    fn in_memory_store_mutates_directive() {
        let mut store = DirectiveStore::in_memory("explore", 5);
        store.record("survey", "move_forward 1000ms -> ok");
        assert_eq!(store.directive().history().len(), 1);
        assert!(!store.set_goal(""));
    }
}
