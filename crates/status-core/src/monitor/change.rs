use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of comparing a fresh observation with the persisted one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Unchanged,
    Transitioned { previous: Option<String> },
}

impl Transition {
    pub fn detect(previous: Option<&str>, current: i64) -> Self {
        if has_changed(previous, current) {
            Self::Transitioned {
                previous: previous.map(str::to_string),
            }
        } else {
            Self::Unchanged
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Transitioned { .. })
    }

    pub fn is_first_observation(&self) -> bool {
        matches!(self, Self::Transitioned { previous: None })
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::Transitioned { previous: None } => write!(f, "first observation"),
            Self::Transitioned { previous: Some(p) } => write!(f, "changed from {}", p),
        }
    }
}

/// A first observation always counts as a change. Otherwise the codes are
/// compared as text, with no ordering between them.
pub fn has_changed(previous: Option<&str>, current: i64) -> bool {
    match previous {
        None => true,
        Some(prev) => prev != current.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_a_change() {
        assert!(has_changed(None, 200));
        assert!(Transition::detect(None, 200).is_first_observation());
    }

    #[test]
    fn identical_code_is_unchanged() {
        assert!(!has_changed(Some("200"), 200));
        assert_eq!(Transition::detect(Some("-1"), -1), Transition::Unchanged);
    }

    #[test]
    fn any_textual_difference_is_a_change() {
        assert!(has_changed(Some("200"), 500));
        assert!(has_changed(Some("5000"), 3000));
        assert!(has_changed(Some("garbage"), 200));
        assert_eq!(
            Transition::detect(Some("500"), 200),
            Transition::Transitioned {
                previous: Some("500".into())
            }
        );
    }

    #[test]
    fn comparison_is_textual_not_numeric() {
        // A hand-edited file with a leading zero is a different status.
        assert!(has_changed(Some("0200"), 200));
    }

    #[test]
    fn display() {
        assert_eq!(Transition::Unchanged.to_string(), "unchanged");
        assert_eq!(Transition::detect(None, 1).to_string(), "first observation");
        assert_eq!(Transition::detect(Some("200"), 503).to_string(), "changed from 200");
    }
}
