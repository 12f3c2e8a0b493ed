use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use ucaes_admissions::config::ConfigError;
use ucaes_admissions::workflows::admissions::{
    AcademicYearStore, AdmissionsService, AdmissionsSettings, ApplicationId, CounterStore,
    InMemoryApplicationRepository, InMemoryCounterStore, RegistrationNumber,
    StaticAcademicYearStore, StudentTransfer, TransferError,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type InMemoryAdmissions = AdmissionsService<InMemoryApplicationRepository, PortalTransfer>;

/// Process-local student portal: issues `{prefix}/{yy}/{n:05}` registration numbers.
pub(crate) struct PortalTransfer {
    prefix: String,
    intake_year: u16,
    issued: AtomicU64,
    available: AtomicBool,
}

impl PortalTransfer {
    pub(crate) fn new(prefix: impl Into<String>, intake_year: u16) -> Self {
        Self {
            prefix: prefix.into(),
            intake_year,
            issued: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub(crate) fn issued(&self) -> u64 {
        self.issued.load(Ordering::Acquire)
    }
}

impl StudentTransfer for PortalTransfer {
    fn transfer(&self, application_id: &ApplicationId) -> Result<RegistrationNumber, TransferError> {
        if !self.available.load(Ordering::Acquire) {
            return Err(TransferError::Unavailable(format!(
                "student portal offline while transferring {application_id}"
            )));
        }

        let next = self.issued.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(RegistrationNumber(format!(
            "{}/{:02}/{:05}",
            self.prefix,
            self.intake_year % 100,
            next
        )))
    }
}

/// Last academic-year start whose end year still has four digits.
pub(crate) const LATEST_START_YEAR: u16 = 9998;

/// Service wired to in-memory stores for the given `start/end` academic year.
pub(crate) fn in_memory_service(
    settings: AdmissionsSettings,
    start_year: u16,
) -> Result<(Arc<InMemoryAdmissions>, Arc<PortalTransfer>), ConfigError> {
    let end_year = start_year
        .checked_add(1)
        .filter(|end| *end <= LATEST_START_YEAR + 1)
        .ok_or(ConfigError::AcademicYearOutOfRange { start: start_year })?;
    let transfer = Arc::new(PortalTransfer::new(settings.id_prefix.clone(), end_year));
    let counters: Arc<dyn CounterStore> = Arc::new(InMemoryCounterStore::default());
    let years: Arc<dyn AcademicYearStore> =
        Arc::new(StaticAcademicYearStore::current(start_year, end_year));

    let service = AdmissionsService::new(
        Arc::new(InMemoryApplicationRepository::default()),
        transfer.clone(),
        counters,
        years,
        settings,
    );
    Ok((Arc::new(service), transfer))
}
