use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-document crawl outcome states.
///
/// States partition into good (the document went through a full, effective
/// pass) and bad (anything else), plus the terminal [`DocState::Deleted`].
/// The spoiled-reference handling in finalize keys off this partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocState {
    /// First time this reference is seen.
    New,
    /// Reference seen before; content or metadata changed.
    Modified,
    /// Reference seen before; unchanged since last run.
    Unmodified,
    /// Reference was deleted through the commit sink.
    Deleted,
    /// Rejected by a pipeline stage or by an unsuccessful import.
    Rejected,
    /// Processing raised an error.
    Error,
    /// Fetch returned an unacceptable status.
    BadStatus,
    /// Fetch could not locate the reference.
    NotFound,
    /// Reference was encountered before its scheduled recrawl time.
    Premature,
}

impl DocState {
    /// Good states mean the pass completed effectively.
    pub fn is_good(&self) -> bool {
        matches!(self, Self::New | Self::Modified | Self::Unmodified)
    }

    pub fn is_bad(&self) -> bool {
        !self.is_good()
    }

    /// Whether this pass gathered fresh information for the reference.
    pub fn is_new_or_modified(&self) -> bool {
        matches!(self, Self::New | Self::Modified)
    }
}

impl fmt::Display for DocState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Modified => write!(f, "modified"),
            Self::Unmodified => write!(f, "unmodified"),
            Self::Deleted => write!(f, "deleted"),
            Self::Rejected => write!(f, "rejected"),
            Self::Error => write!(f, "error"),
            Self::BadStatus => write!(f, "bad_status"),
            Self::NotFound => write!(f, "not_found"),
            Self::Premature => write!(f, "premature"),
        }
    }
}

impl std::str::FromStr for DocState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "modified" => Ok(Self::Modified),
            "unmodified" => Ok(Self::Unmodified),
            "deleted" => Ok(Self::Deleted),
            "rejected" => Ok(Self::Rejected),
            "error" => Ok(Self::Error),
            "bad_status" => Ok(Self::BadStatus),
            "not_found" => Ok(Self::NotFound),
            "premature" => Ok(Self::Premature),
            _ => Err(format!("Invalid document state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_good_bad_partition() {
        assert!(DocState::New.is_good());
        assert!(DocState::Modified.is_good());
        assert!(DocState::Unmodified.is_good());

        assert!(DocState::Deleted.is_bad());
        assert!(DocState::Rejected.is_bad());
        assert!(DocState::Error.is_bad());
        assert!(DocState::BadStatus.is_bad());
        assert!(DocState::NotFound.is_bad());
        assert!(DocState::Premature.is_bad());
    }

    #[test]
    fn test_new_or_modified() {
        assert!(DocState::New.is_new_or_modified());
        assert!(DocState::Modified.is_new_or_modified());
        assert!(!DocState::Unmodified.is_new_or_modified());
        assert!(!DocState::Rejected.is_new_or_modified());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(DocState::BadStatus.to_string(), "bad_status");
        assert_eq!("not_found".parse::<DocState>().unwrap(), DocState::NotFound);
        assert!("unknown".parse::<DocState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let state = DocState::Premature;
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, "\"premature\"");
        let parsed: DocState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
