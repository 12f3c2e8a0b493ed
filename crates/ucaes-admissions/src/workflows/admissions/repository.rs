use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, ApplicationRecord, RecordKey, RegistrationNumber};
use super::lifecycle::ApplicationStatus;

/// Storage abstraction so the service module can be exercised in isolation.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    /// Conditional write: refused with `Conflict` unless `record.revision`
    /// matches the stored revision, or when it would replace an assigned
    /// application ID. Returns the stored record with its new revision.
    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch_by_key(&self, key: &RecordKey) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn fetch_by_application_id(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// Reviewer-facing query. Implementations must never return drafts.
    fn staff_listing(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    /// Every stored record, drafts included. Maintenance tasks only.
    fn all(&self) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists or was changed concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Filter for the staff listing; drafts are excluded regardless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListingFilter {
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListingFilter {
    pub fn matches(&self, record: &ApplicationRecord) -> bool {
        record.status.is_staff_visible()
            && self.status.map_or(true, |status| status == record.status)
    }
}

/// Hands an accepted application over to the student portal, which creates the
/// student record and issues the registration number.
pub trait StudentTransfer: Send + Sync {
    fn transfer(&self, application_id: &ApplicationId) -> Result<RegistrationNumber, TransferError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("student portal rejected transfer: {0}")]
    Rejected(String),
    #[error("student portal unavailable: {0}")]
    Unavailable(String),
}

/// Result of an acceptance or a transfer retry.
///
/// `success == false` never means the acceptance was undone; the status stays
/// `accepted` and the transfer can be retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptanceOutcome {
    pub success: bool,
    pub application_id: ApplicationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<RegistrationNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AcceptanceOutcome {
    pub fn transferred(application_id: ApplicationId, number: RegistrationNumber) -> Self {
        Self {
            success: true,
            application_id,
            registration_number: Some(number),
            error: None,
        }
    }

    pub fn failed(application_id: ApplicationId, error: impl ToString) -> Self {
        Self {
            success: false,
            application_id,
            registration_number: None,
            error: Some(error.to_string()),
        }
    }
}
