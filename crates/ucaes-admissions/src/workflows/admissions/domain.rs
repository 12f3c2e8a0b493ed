use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::lifecycle::ApplicationStatus;

/// Marker embedded in identifiers issued while the counter store was unreachable.
pub const PROVISIONAL_MARKER: &str = "-TMP";

/// Public application identifier, e.g. `UCAES20260007`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    /// Builds the sequential form `{year_key}{sequence:04}`.
    pub fn sequential(year_key: &YearKey, sequence: u64) -> Self {
        Self(format!("{}{:04}", year_key.as_str(), sequence))
    }

    /// True when the identifier came from the non-sequential fallback path.
    pub fn is_provisional(&self) -> bool {
        self.0.contains(PROVISIONAL_MARKER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Internal storage key assigned when a draft is first created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(pub String);

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permanent student identifier handed back by the student portal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationNumber(pub String);

/// Counter key for one admission year, `"UCAES" + admissionYear`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearKey(String);

impl YearKey {
    pub fn new(raw: impl Into<String>) -> Result<Self, InvalidYearKey> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidYearKey);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn for_year(prefix: &str, admission_year: &str) -> Result<Self, InvalidYearKey> {
        Self::new(format!("{prefix}{admission_year}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for YearKey {
    type Error = InvalidYearKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<YearKey> for String {
    fn from(value: YearKey) -> Self {
        value.0
    }
}

impl fmt::Display for YearKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("year key must not be empty")]
pub struct InvalidYearKey;

/// Everything the applicant fills in before submitting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantDetails {
    #[serde(default)]
    pub personal: Option<PersonalDetails>,
    #[serde(default)]
    pub contact: Option<ContactDetails>,
    #[serde(default)]
    pub program: Option<ProgramSelection>,
    #[serde(default)]
    pub documents: Vec<DocumentDescriptor>,
    #[serde(default)]
    pub payment: Option<PaymentConfirmation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalDetails {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub other_names: Option<String>,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub nationality: Option<String>,
}

impl PersonalDetails {
    pub fn full_name(&self) -> String {
        match &self.other_names {
            Some(other) if !other.trim().is_empty() => {
                format!("{} {} {}", self.first_name, other, self.last_name)
            }
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub postal_address: Option<String>,
}

/// Program choice as entered by the applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSelection {
    pub first_choice: String,
    #[serde(default)]
    pub second_choice: Option<String>,
    pub level: String,
    #[serde(default)]
    pub study_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub name: String,
    pub category: DocumentCategory,
    pub storage_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Identification,
    Transcript,
    Certificate,
    Photograph,
    Misc,
}

/// Proof that the application fee was settled by the external gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub reference: String,
    pub amount_minor: u64,
    pub paid_on: NaiveDate,
}

/// Director-approved program/level replacing the applicant's own choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramOverride {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
}

impl ProgramOverride {
    pub fn is_empty(&self) -> bool {
        self.program.is_none() && self.level.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewNote {
    pub author: String,
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

/// Stored application, from first draft to final decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub key: RecordKey,
    #[serde(default)]
    pub application_id: Option<ApplicationId>,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub registration_number: Option<RegistrationNumber>,
    pub details: ApplicantDetails,
    #[serde(default)]
    pub approved_program: Option<ProgramOverride>,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub review_notes: Vec<ReviewNote>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every successful update; writes carrying a stale
    /// revision are refused.
    #[serde(default)]
    pub revision: u64,
}

impl ApplicationRecord {
    pub fn draft(key: RecordKey, details: ApplicantDetails, now: DateTime<Utc>) -> Self {
        Self {
            key,
            application_id: None,
            status: ApplicationStatus::Draft,
            registration_number: None,
            details,
            approved_program: None,
            reviewer: None,
            review_notes: Vec::new(),
            rejection_reason: None,
            created_at: now,
            submitted_at: None,
            decided_at: None,
            updated_at: now,
            revision: 0,
        }
    }

    /// Attach the portal-issued registration number.
    ///
    /// Refused unless the application has been accepted; a draft must never
    /// carry a registration number.
    pub fn assign_registration(
        &mut self,
        number: RegistrationNumber,
    ) -> Result<(), RegistrationRefused> {
        if self.status != ApplicationStatus::Accepted {
            return Err(RegistrationRefused {
                status: self.status,
            });
        }
        self.registration_number = Some(number);
        Ok(())
    }

    pub fn awaiting_transfer(&self) -> bool {
        self.status == ApplicationStatus::Accepted && self.registration_number.is_none()
    }

    /// Program the student will actually be enrolled on.
    pub fn effective_program(&self) -> Option<String> {
        self.approved_program
            .as_ref()
            .and_then(|approved| approved.program.clone())
            .or_else(|| {
                self.details
                    .program
                    .as_ref()
                    .map(|selection| selection.first_choice.clone())
            })
    }

    pub fn effective_level(&self) -> Option<String> {
        self.approved_program
            .as_ref()
            .and_then(|approved| approved.level.clone())
            .or_else(|| {
                self.details
                    .program
                    .as_ref()
                    .map(|selection| selection.level.clone())
            })
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            key: self.key.clone(),
            application_id: self.application_id.clone(),
            status: self.status.as_str(),
            applicant_name: self
                .details
                .personal
                .as_ref()
                .map(PersonalDetails::full_name),
            program: self.effective_program(),
            level: self.effective_level(),
            registration_number: self.registration_number.clone(),
            reviewer: self.reviewer.clone(),
            notes: self.review_notes.len(),
            submitted_at: self.submitted_at,
            decided_at: self.decided_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("registration number cannot be assigned while application is {}", .status.as_str())]
pub struct RegistrationRefused {
    pub status: ApplicationStatus,
}

/// Sanitized projection returned by HTTP handlers and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationStatusView {
    pub key: RecordKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<ApplicationId>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<RegistrationNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    pub notes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
}
