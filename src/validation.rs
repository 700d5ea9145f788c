// Structured validation results
// Errors are collected per field (and per list index) instead of failing fast.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name -> message map for one rejected value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for a field, replacing any earlier one
    pub fn add(&mut self, field: &str, message: &str) {
        self.0.insert(field.to_string(), message.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Names of the rejected fields, sorted
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// A rejected config or sound list, with every offending field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum ValidationError {
    #[error("Invalid config ({} field(s) rejected, check messages)", .0.len())]
    Config(FieldErrors),

    #[error("Invalid sounds ({} descriptor(s) rejected, check messages)", .0.len())]
    Sounds(BTreeMap<usize, FieldErrors>),
}

impl ValidationError {
    /// Field errors for a config rejection
    pub fn config_messages(&self) -> Option<&FieldErrors> {
        match self {
            Self::Config(errors) => Some(errors),
            Self::Sounds(_) => None,
        }
    }

    /// Per-index field errors for a sound list rejection
    pub fn sound_messages(&self) -> Option<&BTreeMap<usize, FieldErrors>> {
        match self {
            Self::Sounds(errors) => Some(errors),
            Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_keep_last_message() {
        let mut errors = FieldErrors::new();
        errors.add("id", "first");
        errors.add("id", "second");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("id"), Some("second"));
    }

    #[test]
    fn test_fields_are_sorted() {
        let mut errors = FieldErrors::new();
        errors.add("cycle_delta", "x");
        errors.add("play_chance", "x");
        errors.add("cycle_duration", "x");
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec!["cycle_delta", "cycle_duration", "play_chance"]
        );
    }

    #[test]
    fn test_error_message_counts_entries() {
        let mut errors = FieldErrors::new();
        errors.add("play_chance", "Must be a percentage [0,1].");
        let err = ValidationError::Config(errors);
        assert_eq!(
            err.to_string(),
            "Invalid config (1 field(s) rejected, check messages)"
        );
        assert!(err.sound_messages().is_none());
    }
}
