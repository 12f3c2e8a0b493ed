use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::academic_year::{
    AcademicYearResolver, AcademicYearStore, AdmissionStatus, ResolvedAdmissionYear,
};
use super::domain::{
    ApplicantDetails, ApplicationId, ApplicationRecord, InvalidYearKey, ProgramOverride,
    RecordKey, RegistrationNumber, ReviewNote, YearKey,
};
use super::guard::{IncompleteApplication, SubmissionGuard, SubmissionPolicy};
use super::lifecycle::{ApplicationStatus, LifecycleError};
use super::repository::{
    AcceptanceOutcome, ApplicationRepository, ListingFilter, RepositoryError, StudentTransfer,
};
use super::sequence::{
    AllocatorSettings, CounterRecord, CounterStore, CounterStoreError, SequenceAllocator,
};

/// Tunables for the admissions service.
#[derive(Debug, Clone)]
pub struct AdmissionsSettings {
    pub id_prefix: String,
    pub allocator: AllocatorSettings,
    pub submission_policy: SubmissionPolicy,
}

impl Default for AdmissionsSettings {
    fn default() -> Self {
        Self {
            id_prefix: "UCAES".to_string(),
            allocator: AllocatorSettings::default(),
            submission_policy: SubmissionPolicy::default(),
        }
    }
}

/// Reviewer decision accepting an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AcceptanceDecision {
    pub reviewer: String,
    #[serde(default)]
    pub program_override: Option<ProgramOverride>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillEntry {
    pub key: RecordKey,
    pub application_id: ApplicationId,
}

/// Service composing the submission guard, stores, allocator, and student transfer.
pub struct AdmissionsService<R, T> {
    guard: Arc<SubmissionGuard>,
    repository: Arc<R>,
    transfer: Arc<T>,
    allocator: Arc<SequenceAllocator>,
    academic_year: Arc<AcademicYearResolver>,
}

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Re-reads allowed when an append-only write loses a revision race.
const WRITE_ATTEMPTS: usize = 3;

fn next_record_key() -> RecordKey {
    let id = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RecordKey(format!("rec-{id:06}"))
}

impl<R, T> AdmissionsService<R, T>
where
    R: ApplicationRepository + 'static,
    T: StudentTransfer + 'static,
{
    pub fn new(
        repository: Arc<R>,
        transfer: Arc<T>,
        counters: Arc<dyn CounterStore>,
        years: Arc<dyn AcademicYearStore>,
        settings: AdmissionsSettings,
    ) -> Self {
        let AdmissionsSettings {
            id_prefix,
            allocator,
            submission_policy,
        } = settings;

        Self {
            guard: Arc::new(SubmissionGuard::with_policy(submission_policy)),
            repository,
            transfer,
            allocator: Arc::new(SequenceAllocator::new(counters, allocator)),
            academic_year: Arc::new(AcademicYearResolver::new(years, id_prefix)),
        }
    }

    /// Start a private draft for an applicant.
    pub fn create_draft(
        &self,
        details: ApplicantDetails,
    ) -> Result<ApplicationRecord, AdmissionsServiceError> {
        let record = ApplicationRecord::draft(next_record_key(), details, Utc::now());
        let stored = self.repository.insert(record)?;
        debug!(key = %stored.key, "draft created");
        Ok(stored)
    }

    /// Replace the details of a draft; anything past draft is locked.
    pub fn update_draft(
        &self,
        key: &RecordKey,
        details: ApplicantDetails,
    ) -> Result<ApplicationRecord, AdmissionsServiceError> {
        let mut record = self.get_draft(key)?;
        if record.status != ApplicationStatus::Draft {
            return Err(AdmissionsServiceError::Locked {
                status: record.status,
            });
        }

        record.details = details;
        record.updated_at = Utc::now();
        Ok(self.repository.update(record)?)
    }

    /// Applicant-side lookup by record key; returns the record in any status.
    pub fn get_draft(&self, key: &RecordKey) -> Result<ApplicationRecord, AdmissionsServiceError> {
        self.repository
            .fetch_by_key(key)?
            .ok_or_else(|| AdmissionsServiceError::NotFound(key.0.clone()))
    }

    /// Hand in a completed draft.
    ///
    /// The application ID is allocated and stored on the still-private draft
    /// before the status changes, so a retried submission reuses it. Both
    /// writes are conditional on the revision read here; a submission racing
    /// another one for the same draft adopts the ID that reached the store
    /// first, and only one of them flips the status.
    pub fn submit(&self, key: &RecordKey) -> Result<ApplicationRecord, AdmissionsServiceError> {
        let mut record = self.get_draft(key)?;
        record
            .status
            .validate_transition(ApplicationStatus::Submitted)?;
        self.guard.check(&record.details)?;

        if self.academic_year.admission_status() == Some(AdmissionStatus::Closed) {
            return Err(AdmissionsServiceError::AdmissionsClosed);
        }

        if record.application_id.is_none() {
            record = self.stamp_draft_id(record)?;
        }

        let now = Utc::now();
        record.status = ApplicationStatus::Submitted;
        record.submitted_at = Some(now);
        record.updated_at = now;
        let record = self.repository.update(record)?;

        info!(
            key = %record.key,
            application_id = ?record.application_id.as_ref().map(ApplicationId::as_str),
            "application submitted"
        );
        Ok(record)
    }

    /// Store a freshly allocated ID on a draft. When another submission got
    /// there first, the stored draft is re-read and its ID reused; the number
    /// allocated here is then left unused.
    fn stamp_draft_id(
        &self,
        mut record: ApplicationRecord,
    ) -> Result<ApplicationRecord, AdmissionsServiceError> {
        let key = record.key.clone();
        let id = self.allocate()?;
        record.application_id = Some(id.clone());
        record.updated_at = Utc::now();

        match self.repository.update(record) {
            Ok(stored) => Ok(stored),
            Err(RepositoryError::Conflict) => {
                let current = self.get_draft(&key)?;
                current
                    .status
                    .validate_transition(ApplicationStatus::Submitted)?;
                if current.application_id.is_none() {
                    return Err(RepositoryError::Conflict.into());
                }
                warn!(
                    key = %key,
                    unused = %id,
                    application_id = ?current.application_id.as_ref().map(ApplicationId::as_str),
                    "concurrent submission already stored an id"
                );
                Ok(current)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Reviewer claims a submitted application.
    pub fn claim_for_review(
        &self,
        reference: &str,
        reviewer: &str,
    ) -> Result<ApplicationRecord, AdmissionsServiceError> {
        let mut record = self.find(reference)?;
        record
            .status
            .validate_transition(ApplicationStatus::UnderReview)?;

        record.status = ApplicationStatus::UnderReview;
        record.reviewer = Some(reviewer.to_string());
        record.updated_at = Utc::now();
        let record = self.repository.update(record)?;

        info!(key = %record.key, reviewer, "application under review");
        Ok(record)
    }

    /// Accept an application and hand it to the student portal.
    ///
    /// The acceptance is stored before the transfer runs; a transfer failure is
    /// reported in the outcome and leaves the application `accepted`. Only the
    /// caller whose acceptance reaches the store calls the portal; a concurrent
    /// decision on the same application fails with a repository conflict.
    pub fn accept(
        &self,
        reference: &str,
        decision: AcceptanceDecision,
    ) -> Result<AcceptanceOutcome, AdmissionsServiceError> {
        let mut record = self.find(reference)?;
        record
            .status
            .validate_transition(ApplicationStatus::Accepted)?;

        let application_id = match record.application_id.clone() {
            Some(id) => id,
            None => {
                let id = self.allocate()?;
                record.application_id = Some(id.clone());
                id
            }
        };

        let now = Utc::now();
        if let Some(program_override) = decision.program_override.filter(|o| !o.is_empty()) {
            record.approved_program = Some(program_override);
        }
        if let Some(note) = decision.note.filter(|note| !note.trim().is_empty()) {
            record.review_notes.push(ReviewNote {
                author: decision.reviewer.clone(),
                note,
                recorded_at: now,
            });
        }
        record.status = ApplicationStatus::Accepted;
        record.reviewer = Some(decision.reviewer);
        record.decided_at = Some(now);
        record.updated_at = now;
        let record = self.repository.update(record)?;

        info!(key = %record.key, %application_id, "application accepted");
        Ok(self.complete_transfer(record, application_id))
    }

    pub fn reject(
        &self,
        reference: &str,
        reviewer: &str,
        reason: &str,
    ) -> Result<ApplicationRecord, AdmissionsServiceError> {
        let mut record = self.find(reference)?;
        record
            .status
            .validate_transition(ApplicationStatus::Rejected)?;

        let now = Utc::now();
        record.status = ApplicationStatus::Rejected;
        record.reviewer = Some(reviewer.to_string());
        record.rejection_reason = Some(reason.to_string());
        record.decided_at = Some(now);
        record.updated_at = now;
        let record = self.repository.update(record)?;

        info!(key = %record.key, reviewer, "application rejected");
        Ok(record)
    }

    /// Append a review note without changing status.
    pub fn annotate(
        &self,
        reference: &str,
        author: &str,
        note: &str,
    ) -> Result<ApplicationRecord, AdmissionsServiceError> {
        let mut attempt = 1;
        loop {
            let mut record = self.find(reference)?;
            let now = Utc::now();
            record.review_notes.push(ReviewNote {
                author: author.to_string(),
                note: note.to_string(),
                recorded_at: now,
            });
            record.updated_at = now;

            match self.repository.update(record) {
                Err(RepositoryError::Conflict) if attempt < WRITE_ATTEMPTS => {
                    debug!(reference, attempt, "review note raced another write; re-reading");
                    attempt += 1;
                }
                result => return Ok(result?),
            }
        }
    }

    /// Re-run the student transfer for an accepted application without a registration number.
    ///
    /// The record is touched with a conditional write first, so of two
    /// concurrent retries only one reaches the portal.
    pub fn retry_transfer(
        &self,
        reference: &str,
    ) -> Result<AcceptanceOutcome, AdmissionsServiceError> {
        let record = self.find(reference)?;
        if record.status != ApplicationStatus::Accepted {
            return Err(AdmissionsServiceError::TransferNotPending {
                status: record.status,
            });
        }

        let application_id = record
            .application_id
            .clone()
            .ok_or_else(|| AdmissionsServiceError::NotFound(reference.to_string()))?;

        if let Some(number) = record.registration_number.clone() {
            return Ok(AcceptanceOutcome::transferred(application_id, number));
        }

        let mut record = record;
        record.updated_at = Utc::now();
        let record = self.repository.update(record)?;
        Ok(self.complete_transfer(record, application_id))
    }

    fn complete_transfer(
        &self,
        record: ApplicationRecord,
        application_id: ApplicationId,
    ) -> AcceptanceOutcome {
        let number = match self.transfer.transfer(&application_id) {
            Ok(number) => number,
            Err(error) => {
                warn!(%application_id, %error, "student transfer failed; acceptance kept");
                return AcceptanceOutcome::failed(application_id, error);
            }
        };

        match self.record_registration(record, &number) {
            Ok(stored) => {
                let number = stored.registration_number.unwrap_or(number);
                info!(%application_id, registration_number = %number.0, "student transferred");
                AcceptanceOutcome::transferred(application_id, number)
            }
            Err(error) => {
                warn!(
                    %application_id,
                    registration_number = %number.0,
                    %error,
                    "registration number issued but not recorded"
                );
                AcceptanceOutcome::failed(
                    application_id,
                    format!("registration number {} issued but not recorded: {error}", number.0),
                )
            }
        }
    }

    /// Write the portal's registration number onto the accepted record. A review
    /// note landing in between only bumps the revision, so the latest record is
    /// re-read and the number applied again. A number already on the stored
    /// record is kept.
    fn record_registration(
        &self,
        mut record: ApplicationRecord,
        number: &RegistrationNumber,
    ) -> Result<ApplicationRecord, AdmissionsServiceError> {
        let key = record.key.clone();
        let mut attempt = 1;
        loop {
            if record.registration_number.is_some() {
                return Ok(record);
            }
            record
                .assign_registration(number.clone())
                .map_err(|refused| AdmissionsServiceError::TransferNotPending {
                    status: refused.status,
                })?;
            record.updated_at = Utc::now();

            match self.repository.update(record) {
                Err(RepositoryError::Conflict) if attempt < WRITE_ATTEMPTS => {
                    attempt += 1;
                    record = self.get_draft(&key)?;
                }
                result => return Ok(result?),
            }
        }
    }

    /// Staff lookup: application ID first, then the record key for legacy
    /// records that never received an application ID. Drafts are never returned.
    pub fn find(&self, reference: &str) -> Result<ApplicationRecord, AdmissionsServiceError> {
        let reference = reference.trim();
        let by_id = self
            .repository
            .fetch_by_application_id(&ApplicationId(reference.to_string()))?;

        let record = match by_id {
            Some(record) => Some(record),
            None => {
                let legacy = self
                    .repository
                    .fetch_by_key(&RecordKey(reference.to_string()))?;
                if legacy.is_some() {
                    debug!(reference, "application resolved by record key");
                }
                legacy
            }
        };

        record
            .filter(|record| record.status.is_staff_visible())
            .ok_or_else(|| AdmissionsServiceError::NotFound(reference.to_string()))
    }

    pub fn staff_listing(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<ApplicationRecord>, AdmissionsServiceError> {
        let mut records = self.repository.staff_listing(filter)?;
        records.retain(|record| record.status.is_staff_visible());
        Ok(records)
    }

    /// Allocate IDs for submitted records that predate ID allocation.
    pub fn backfill_application_ids(&self) -> Result<Vec<BackfillEntry>, AdmissionsServiceError> {
        let mut assigned = Vec::new();
        for mut record in self.repository.all()? {
            if !record.status.is_staff_visible() || record.application_id.is_some() {
                continue;
            }

            let key = record.key.clone();
            let id = self.allocate()?;
            record.application_id = Some(id.clone());
            record.updated_at = Utc::now();
            match self.repository.update(record) {
                Ok(_) => {}
                Err(RepositoryError::Conflict) => {
                    warn!(key = %key, unused = %id, "record changed during backfill; skipped");
                    continue;
                }
                Err(error) => return Err(error.into()),
            }
            info!(key = %key, application_id = %id, "backfilled application id");
            assigned.push(BackfillEntry {
                key,
                application_id: id,
            });
        }
        Ok(assigned)
    }

    /// Records holding a fallback identifier that still need manual reconciliation.
    pub fn provisional_applications(
        &self,
    ) -> Result<Vec<ApplicationRecord>, AdmissionsServiceError> {
        Ok(self
            .repository
            .all()?
            .into_iter()
            .filter(|record| {
                record
                    .application_id
                    .as_ref()
                    .is_some_and(ApplicationId::is_provisional)
            })
            .collect())
    }

    pub fn admission_year(&self) -> ResolvedAdmissionYear {
        self.academic_year.resolve()
    }

    /// Resolved admission year together with the counter key built from it.
    pub fn current_year_key(
        &self,
    ) -> Result<(ResolvedAdmissionYear, YearKey), AdmissionsServiceError> {
        let resolved = self.academic_year.resolve();
        let year_key = YearKey::for_year(self.academic_year.prefix(), &resolved.year)?;
        Ok((resolved, year_key))
    }

    pub fn counter(
        &self,
        year_key: &YearKey,
    ) -> Result<Option<CounterRecord>, AdmissionsServiceError> {
        Ok(self.allocator.counter(year_key)?)
    }

    fn allocate(&self) -> Result<ApplicationId, AdmissionsServiceError> {
        let (_, year_key) = self.current_year_key()?;
        Ok(self.allocator.allocate(&year_key))
    }
}

/// Error raised by the admissions service.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionsServiceError {
    #[error("application {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Incomplete(#[from] IncompleteApplication),
    #[error("admissions are closed for the current academic year")]
    AdmissionsClosed,
    #[error("application is {status}; only drafts can be edited")]
    Locked { status: ApplicationStatus },
    #[error("application is {status}; no student transfer is pending")]
    TransferNotPending { status: ApplicationStatus },
    #[error(transparent)]
    YearKey(#[from] InvalidYearKey),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Counter(#[from] CounterStoreError),
}
