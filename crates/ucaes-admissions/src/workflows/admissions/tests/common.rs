use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::workflows::admissions::academic_year::{AcademicYearStore, AdmissionStatus};
use crate::workflows::admissions::domain::{
    ApplicantDetails, ApplicationId, ApplicationRecord, ContactDetails, DocumentCategory,
    DocumentDescriptor, PaymentConfirmation, PersonalDetails, ProgramSelection, RecordKey,
    RegistrationNumber, YearKey,
};
use crate::workflows::admissions::memory::{
    InMemoryApplicationRepository, InMemoryCounterStore, StaticAcademicYearStore,
};
use crate::workflows::admissions::repository::{
    ApplicationRepository, ListingFilter, RepositoryError, StudentTransfer, TransferError,
};
use crate::workflows::admissions::sequence::{
    AllocatorSettings, CounterRecord, CounterStore, CounterStoreError,
};
use crate::workflows::admissions::{admissions_router, AdmissionsService, AdmissionsSettings};

pub(super) fn year_key() -> YearKey {
    YearKey::new("UCAES2026").expect("valid year key")
}

pub(super) fn complete_details() -> ApplicantDetails {
    ApplicantDetails {
        personal: Some(PersonalDetails {
            first_name: "Ama".to_string(),
            last_name: "Mensah".to_string(),
            other_names: Some("Serwaa".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(2006, 3, 14).expect("valid date"),
            nationality: Some("Ghanaian".to_string()),
        }),
        contact: Some(ContactDetails {
            email: "ama.mensah@example.com".to_string(),
            phone: "+233201234567".to_string(),
            postal_address: None,
        }),
        program: Some(ProgramSelection {
            first_choice: "BSc Agriculture".to_string(),
            second_choice: Some("BSc Environmental Science".to_string()),
            level: "100".to_string(),
            study_mode: Some("regular".to_string()),
        }),
        documents: vec![
            DocumentDescriptor {
                name: "Ghana Card".to_string(),
                category: DocumentCategory::Identification,
                storage_key: "uploads/rec/ghana-card.pdf".to_string(),
            },
            DocumentDescriptor {
                name: "WASSCE results".to_string(),
                category: DocumentCategory::Transcript,
                storage_key: "uploads/rec/wassce.pdf".to_string(),
            },
        ],
        payment: Some(PaymentConfirmation {
            reference: "PAY-88213".to_string(),
            amount_minor: 25_000,
            paid_on: NaiveDate::from_ymd_opt(2026, 1, 9).expect("valid date"),
        }),
    }
}

pub(super) fn fast_settings() -> AdmissionsSettings {
    AdmissionsSettings {
        allocator: AllocatorSettings {
            max_attempts: 3,
            retry_backoff: Duration::ZERO,
        },
        ..AdmissionsSettings::default()
    }
}

pub(super) type TestService = AdmissionsService<InMemoryApplicationRepository, MemoryTransfer>;

pub(super) struct Harness {
    pub(super) service: TestService,
    pub(super) repository: Arc<InMemoryApplicationRepository>,
    pub(super) transfer: Arc<MemoryTransfer>,
    pub(super) counters: Arc<InMemoryCounterStore>,
}

pub(super) fn build_service() -> Harness {
    build_service_with_years(StaticAcademicYearStore::current(2025, 2026))
}

pub(super) fn build_service_with_years(years: StaticAcademicYearStore) -> Harness {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let transfer = Arc::new(MemoryTransfer::default());
    let counters = Arc::new(InMemoryCounterStore::default());
    let service = AdmissionsService::new(
        repository.clone(),
        transfer.clone(),
        counters.clone(),
        Arc::new(years),
        fast_settings(),
    );
    Harness {
        service,
        repository,
        transfer,
        counters,
    }
}

/// Service over the given counter store, with in-memory records and transfer.
pub(super) fn build_service_with_counters(
    counters: Arc<dyn CounterStore>,
    settings: AdmissionsSettings,
) -> TestService {
    AdmissionsService::new(
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(MemoryTransfer::default()),
        counters,
        Arc::new(StaticAcademicYearStore::current(2025, 2026)),
        settings,
    )
}

pub(super) fn closed_year() -> StaticAcademicYearStore {
    let mut years = StaticAcademicYearStore::current(2025, 2026);
    for document in &mut years.documents {
        document.admission_status = AdmissionStatus::Closed;
    }
    years
}

/// Draft created and submitted through the service.
pub(super) fn submitted(service: &TestService) -> ApplicationRecord {
    let draft = service
        .create_draft(complete_details())
        .expect("draft created");
    service.submit(&draft.key).expect("submission succeeds")
}

/// Submitted application claimed by a reviewer.
pub(super) fn under_review(service: &TestService) -> ApplicationRecord {
    let record = submitted(service);
    let reference = record
        .application_id
        .clone()
        .expect("submitted records carry an id");
    service
        .claim_for_review(reference.as_str(), "director.owusu")
        .expect("claim succeeds")
}

/// Student portal stand-in issuing `STU{n:05}` numbers, optionally failing.
#[derive(Default)]
pub(super) struct MemoryTransfer {
    issued: AtomicU64,
    failing: Mutex<bool>,
    transferred: Mutex<Vec<ApplicationId>>,
}

impl MemoryTransfer {
    pub(super) fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("transfer mutex poisoned") = failing;
    }

    pub(super) fn transferred(&self) -> Vec<ApplicationId> {
        self.transferred
            .lock()
            .expect("transfer mutex poisoned")
            .clone()
    }
}

impl StudentTransfer for MemoryTransfer {
    fn transfer(&self, application_id: &ApplicationId) -> Result<RegistrationNumber, TransferError> {
        if *self.failing.lock().expect("transfer mutex poisoned") {
            return Err(TransferError::Unavailable("portal timed out".to_string()));
        }
        self.transferred
            .lock()
            .expect("transfer mutex poisoned")
            .push(application_id.clone());
        let number = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RegistrationNumber(format!("STU{number:05}")))
    }
}

/// Counter store whose transactions always abort.
#[derive(Default)]
pub(super) struct ContendedCounterStore {
    pub(super) attempts: AtomicUsize,
}

impl CounterStore for ContendedCounterStore {
    fn get(&self, _year_key: &YearKey) -> Result<Option<CounterRecord>, CounterStoreError> {
        Ok(None)
    }

    fn increment(&self, _year_key: &YearKey) -> Result<CounterRecord, CounterStoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(CounterStoreError::Contention)
    }
}

/// Aborts the first `failures` increments, then delegates to the in-memory store.
pub(super) struct FlakyCounterStore {
    pub(super) inner: InMemoryCounterStore,
    pub(super) remaining_failures: AtomicUsize,
}

impl FlakyCounterStore {
    pub(super) fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryCounterStore::default(),
            remaining_failures: AtomicUsize::new(failures),
        }
    }
}

impl CounterStore for FlakyCounterStore {
    fn get(&self, year_key: &YearKey) -> Result<Option<CounterRecord>, CounterStoreError> {
        self.inner.get(year_key)
    }

    fn increment(&self, year_key: &YearKey) -> Result<CounterRecord, CounterStoreError> {
        let aborted = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if aborted {
            return Err(CounterStoreError::Contention);
        }
        self.inner.increment(year_key)
    }
}

/// Delays every read so that concurrent callers all act on the same revision.
pub(super) struct SlowReadRepository {
    pub(super) inner: InMemoryApplicationRepository,
    pub(super) read_delay: Duration,
}

impl SlowReadRepository {
    pub(super) fn new(read_delay: Duration) -> Self {
        Self {
            inner: InMemoryApplicationRepository::default(),
            read_delay,
        }
    }
}

impl ApplicationRepository for SlowReadRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        self.inner.update(record)
    }

    fn fetch_by_key(&self, key: &RecordKey) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let found = self.inner.fetch_by_key(key);
        thread::sleep(self.read_delay);
        found
    }

    fn fetch_by_application_id(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let found = self.inner.fetch_by_application_id(id);
        thread::sleep(self.read_delay);
        found
    }

    fn staff_listing(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.staff_listing(filter)
    }

    fn all(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.inner.all()
    }
}

pub(super) type SlowReadService = AdmissionsService<SlowReadRepository, MemoryTransfer>;

/// Service whose repository reads stall for `read_delay`.
pub(super) fn slow_read_service(
    read_delay: Duration,
) -> (Arc<SlowReadService>, Arc<SlowReadRepository>, Arc<MemoryTransfer>) {
    let repository = Arc::new(SlowReadRepository::new(read_delay));
    let transfer = Arc::new(MemoryTransfer::default());
    let service = Arc::new(AdmissionsService::new(
        repository.clone(),
        transfer.clone(),
        Arc::new(InMemoryCounterStore::default()),
        Arc::new(StaticAcademicYearStore::current(2025, 2026)),
        fast_settings(),
    ));
    (service, repository, transfer)
}

/// Holds each increment until the test opens the gate; gives up after two seconds.
pub(super) struct GatedCounterStore {
    inner: InMemoryCounterStore,
    gate: Mutex<mpsc::Receiver<()>>,
}

impl GatedCounterStore {
    pub(super) fn new(gate: mpsc::Receiver<()>) -> Self {
        Self {
            inner: InMemoryCounterStore::default(),
            gate: Mutex::new(gate),
        }
    }
}

impl CounterStore for GatedCounterStore {
    fn get(&self, year_key: &YearKey) -> Result<Option<CounterRecord>, CounterStoreError> {
        self.inner.get(year_key)
    }

    fn increment(&self, year_key: &YearKey) -> Result<CounterRecord, CounterStoreError> {
        let opened = self
            .gate
            .lock()
            .expect("gate mutex poisoned")
            .recv_timeout(Duration::from_secs(2));
        if opened.is_err() {
            return Err(CounterStoreError::Contention);
        }
        self.inner.increment(year_key)
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_by_key(&self, _key: &RecordKey) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_by_application_id(
        &self,
        _id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn staff_listing(
        &self,
        _filter: &ListingFilter,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn all(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn unavailable_service() -> Arc<AdmissionsService<UnavailableRepository, MemoryTransfer>>
{
    Arc::new(AdmissionsService::new(
        Arc::new(UnavailableRepository),
        Arc::new(MemoryTransfer::default()),
        Arc::new(InMemoryCounterStore::default()),
        Arc::new(StaticAcademicYearStore::current(2025, 2026)) as Arc<dyn AcademicYearStore>,
        fast_settings(),
    ))
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    admissions_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
