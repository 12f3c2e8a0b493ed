//! Application status tracking and transition rules.
//!
//! Applications only move forward. `accepted` and `rejected` are terminal;
//! annotating a record with review notes never changes its status.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    /// Private applicant working state.
    Draft,
    /// Handed in; an application ID has been allocated.
    Submitted,
    /// Claimed by a reviewer.
    UnderReview,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 5] = [
        Self::Draft,
        Self::Submitted,
        Self::UnderReview,
        Self::Accepted,
        Self::Rejected,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }

    /// Whether the record may appear in any reviewer-facing listing or lookup.
    pub const fn is_staff_visible(self) -> bool {
        !matches!(self, Self::Draft)
    }

    /// Validates a forward move from `self` to `next`.
    pub fn validate_transition(self, next: Self) -> Result<(), LifecycleError> {
        if self.is_terminal() {
            return Err(LifecycleError::Terminal { status: self });
        }

        let allowed = match self {
            Self::Draft => next == Self::Submitted,
            Self::Submitted => next == Self::UnderReview,
            Self::UnderReview => matches!(next, Self::Accepted | Self::Rejected),
            Self::Accepted | Self::Rejected => false,
        };

        if allowed {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| LifecycleError::UnknownStatus {
                status: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("application is {status} and can no longer change status")]
    Terminal { status: ApplicationStatus },
    #[error("cannot move application from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
    #[error("unknown application status '{status}'")]
    UnknownStatus { status: String },
}
