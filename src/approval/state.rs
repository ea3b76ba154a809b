//! Approval state definitions
//!
//! State IDs are what list queries bind as SMALLINT.

use std::fmt;

/// Maker-checker state of a change request
///
/// Terminal states: APPROVED (10), REJECTED (-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApprovalState {
    /// Submitted by a Maker, waiting for a Checker decision
    Pending = 0,

    /// Terminal: decided by Admin/Checker and synchronized to the gateway
    Approved = 10,

    /// Terminal: decided by Admin/Checker, never synchronized
    Rejected = -10,
}

impl ApprovalState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalState::Pending)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(ApprovalState::Pending),
            10 => Some(ApprovalState::Approved),
            -10 => Some(ApprovalState::Rejected),
            _ => None,
        }
    }

    /// Derive the state from the persisted checker flags
    ///
    /// Returns `None` for the impossible `approved && rejected` row.
    pub fn from_flags(approved: bool, rejected: bool) -> Option<Self> {
        match (approved, rejected) {
            (false, false) => Some(ApprovalState::Pending),
            (true, false) => Some(ApprovalState::Approved),
            (false, true) => Some(ApprovalState::Rejected),
            (true, true) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalState::Pending => "PENDING",
            ApprovalState::Approved => "APPROVED",
            ApprovalState::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ApprovalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ApprovalState::Pending),
            "APPROVED" => Ok(ApprovalState::Approved),
            "REJECTED" => Ok(ApprovalState::Rejected),
            other => Err(format!("unknown approval state: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ApprovalState::Approved.is_terminal());
        assert!(ApprovalState::Rejected.is_terminal());
        assert!(!ApprovalState::Pending.is_terminal());
    }

    #[test]
    fn test_from_flags_rejects_double_decision() {
        assert_eq!(
            ApprovalState::from_flags(false, false),
            Some(ApprovalState::Pending)
        );
        assert_eq!(
            ApprovalState::from_flags(true, false),
            Some(ApprovalState::Approved)
        );
        assert_eq!(
            ApprovalState::from_flags(false, true),
            Some(ApprovalState::Rejected)
        );
        assert_eq!(ApprovalState::from_flags(true, true), None);
    }

    #[test]
    fn test_invalid_state_id() {
        assert!(ApprovalState::from_id(20).is_none());
        assert_eq!(ApprovalState::from_id(-10), Some(ApprovalState::Rejected));
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("pending".parse::<ApprovalState>(), Ok(ApprovalState::Pending));
        assert_eq!(ApprovalState::Approved.to_string(), "APPROVED");
        assert!("done".parse::<ApprovalState>().is_err());
    }
}
