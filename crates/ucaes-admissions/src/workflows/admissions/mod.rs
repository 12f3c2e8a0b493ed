//! Admission applications: sequential ID allocation, lifecycle, and staff access.
//!
//! Applicants work on private drafts. Submitting a complete draft allocates the
//! application ID from the per-year counter and makes the record visible to
//! reviewers; acceptance hands the record to the student portal, which issues
//! the registration number.

pub mod academic_year;
pub mod domain;
pub mod guard;
pub mod lifecycle;
pub mod memory;
pub mod repository;
pub mod router;
pub mod sequence;
pub mod service;

#[cfg(test)]
mod tests;

pub use academic_year::{
    AcademicYearDocument, AcademicYearError, AcademicYearPointer, AcademicYearResolver,
    AcademicYearStore, AdmissionStatus, LegacyYearSettings, ResolvedAdmissionYear, YearSource,
};
pub use domain::{
    ApplicantDetails, ApplicationId, ApplicationRecord, ApplicationStatusView, ContactDetails,
    DocumentCategory, DocumentDescriptor, PaymentConfirmation, PersonalDetails, ProgramOverride,
    ProgramSelection, RecordKey, RegistrationNumber, ReviewNote, YearKey,
};
pub use guard::{ApplicationSection, IncompleteApplication, SubmissionGuard, SubmissionPolicy};
pub use lifecycle::{ApplicationStatus, LifecycleError};
pub use memory::{InMemoryApplicationRepository, InMemoryCounterStore, StaticAcademicYearStore};
pub use repository::{
    AcceptanceOutcome, ApplicationRepository, ListingFilter, RepositoryError, StudentTransfer,
    TransferError,
};
pub use router::admissions_router;
pub use sequence::{
    AllocationError, AllocatorSettings, CounterRecord, CounterStore, CounterStoreError,
    SequenceAllocator,
};
pub use service::{
    AcceptanceDecision, AdmissionsService, AdmissionsServiceError, AdmissionsSettings,
    BackfillEntry,
};
