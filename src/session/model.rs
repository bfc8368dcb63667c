//! Per-user conversation state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::{Section, StepId};

/// Progress of one user through the flow.
///
/// Serialized as JSON by persistent stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// The user's chat identity.
    pub session_id: String,
    /// Name of the step awaiting input.
    pub current: String,
    /// Normalized answers keyed by field.
    pub answers: HashMap<String, String>,
    /// Previously visited steps, oldest first. Never contains the confirm step.
    pub history: Vec<String>,
    /// Section being edited from the confirm screen, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editing: Option<Section>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Fresh session positioned at `entry`.
    pub fn new(session_id: impl Into<String>, entry: StepId) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            current: entry.to_string(),
            answers: HashMap::new(),
            history: Vec::new(),
            editing: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn answer(&self, field: &str) -> Option<&str> {
        self.answers.get(field).map(String::as_str)
    }

    /// Record an accepted answer and move to `next`.
    pub fn advance(&mut self, field: &str, value: String, next: StepId) {
        self.answers.insert(field.to_string(), value);
        let left = std::mem::replace(&mut self.current, next.to_string());
        self.history.push(left);
        self.touch();
    }

    /// Jump back to `target`, dropping history from its last visit onward.
    /// Answers are kept.
    pub fn rewind_to(&mut self, target: StepId) {
        if let Some(pos) = self.history.iter().rposition(|s| s == target.as_str()) {
            self.history.truncate(pos);
        }
        self.current = target.to_string();
        self.touch();
    }

    /// Jump to `target` without touching answers or history.
    pub fn jump_to(&mut self, target: StepId) {
        self.current = target.to_string();
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether the session has been idle for longer than `max_idle`.
    pub fn is_idle(&self, max_idle: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.updated_at > max_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_empty_at_entry() {
        let s = Session::new("42", StepId("residence"));
        assert_eq!(s.session_id, "42");
        assert_eq!(s.current, "residence");
        assert!(s.answers.is_empty());
        assert!(s.history.is_empty());
        assert!(s.editing.is_none());
    }

    #[test]
    fn advance_records_answer_and_history() {
        let mut s = Session::new("42", StepId("a"));
        s.advance("a", "yes".into(), StepId("b"));
        assert_eq!(s.current, "b");
        assert_eq!(s.answer("a"), Some("yes"));
        assert_eq!(s.history, vec!["a"]);
    }

    #[test]
    fn rewind_truncates_history_keeps_answers() {
        let mut s = Session::new("42", StepId("a"));
        s.advance("a", "1".into(), StepId("b"));
        s.advance("b", "2".into(), StepId("c"));
        s.rewind_to(StepId("b"));
        assert_eq!(s.current, "b");
        assert_eq!(s.history, vec!["a"]);
        assert_eq!(s.answer("b"), Some("2"));
    }

    #[test]
    fn rewind_to_unvisited_step_keeps_history() {
        let mut s = Session::new("42", StepId("a"));
        s.advance("a", "1".into(), StepId("b"));
        s.rewind_to(StepId("z"));
        assert_eq!(s.current, "z");
        assert_eq!(s.history, vec!["a"]);
    }

    #[test]
    fn idle_check() {
        let s = Session::new("42", StepId("a"));
        let later = s.updated_at + chrono::Duration::minutes(10);
        assert!(s.is_idle(chrono::Duration::minutes(5), later));
        assert!(!s.is_idle(chrono::Duration::minutes(15), later));
    }

    #[test]
    fn serde_roundtrip() {
        let mut s = Session::new("42", StepId("a"));
        s.advance("a", "1".into(), StepId("b"));
        s.editing = Some(Section::Contact);
        let json = serde_json::to_string(&s).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, s);
    }
}
