//! Process-local stores used by the demo service and the test-suite.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use super::academic_year::{
    AcademicYearDocument, AcademicYearError, AcademicYearPointer, AcademicYearStore,
    LegacyYearSettings,
};
use super::domain::{ApplicationId, ApplicationRecord, RecordKey, YearKey};
use super::repository::{ApplicationRepository, ListingFilter, RepositoryError};
use super::sequence::{CounterRecord, CounterStore, CounterStoreError};

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, String> {
    mutex.lock().map_err(|_| format!("{name} mutex poisoned"))
}

/// Counter records behind one mutex; `increment` is the critical section.
#[derive(Default, Clone)]
pub struct InMemoryCounterStore {
    counters: Arc<Mutex<HashMap<YearKey, CounterRecord>>>,
}

impl InMemoryCounterStore {
    /// Seed a counter, e.g. when migrating an existing year. A counter never
    /// moves backwards: seeding below the current value keeps the current value.
    pub fn seed(
        &self,
        year_key: YearKey,
        last_number: u64,
    ) -> Result<CounterRecord, CounterStoreError> {
        let now = Utc::now();
        let mut counters =
            lock(&self.counters, "counter").map_err(CounterStoreError::Unavailable)?;
        let seeded = match counters.get(&year_key) {
            Some(current) if current.last_number >= last_number => return Ok(current.clone()),
            Some(current) => CounterRecord {
                last_number,
                last_updated: now,
                ..current.clone()
            },
            None => CounterRecord {
                year_key: year_key.clone(),
                last_number,
                created_at: now,
                last_updated: now,
            },
        };
        counters.insert(year_key, seeded.clone());
        Ok(seeded)
    }
}

impl CounterStore for InMemoryCounterStore {
    fn get(&self, year_key: &YearKey) -> Result<Option<CounterRecord>, CounterStoreError> {
        let counters = lock(&self.counters, "counter").map_err(CounterStoreError::Unavailable)?;
        Ok(counters.get(year_key).cloned())
    }

    fn increment(&self, year_key: &YearKey) -> Result<CounterRecord, CounterStoreError> {
        let now = Utc::now();
        let mut counters =
            lock(&self.counters, "counter").map_err(CounterStoreError::Unavailable)?;
        let next = match counters.get(year_key) {
            Some(current) => current.advanced(now),
            None => CounterRecord::first(year_key.clone(), now),
        };
        counters.insert(year_key.clone(), next.clone());
        Ok(next)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<Mutex<BTreeMap<RecordKey, ApplicationRecord>>>,
}

impl InMemoryApplicationRepository {
    pub fn len(&self) -> usize {
        lock(&self.records, "repository").map_or(0, |records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn records(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<RecordKey, ApplicationRecord>>, RepositoryError> {
        lock(&self.records, "repository").map_err(RepositoryError::Unavailable)
    }
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut records = self.records()?;
        if records.contains_key(&record.key) {
            return Err(RepositoryError::Conflict);
        }
        if let Some(id) = &record.application_id {
            if records
                .values()
                .any(|existing| existing.application_id.as_ref() == Some(id))
            {
                return Err(RepositoryError::Conflict);
            }
        }
        records.insert(record.key.clone(), record.clone());
        Ok(record)
    }

    fn update(&self, mut record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut records = self.records()?;
        let existing = records
            .get(&record.key)
            .ok_or(RepositoryError::NotFound)?;
        if existing.revision != record.revision {
            return Err(RepositoryError::Conflict);
        }
        if existing.application_id.is_some() && existing.application_id != record.application_id {
            return Err(RepositoryError::Conflict);
        }
        if let Some(id) = &record.application_id {
            if records.values().any(|other| {
                other.key != record.key && other.application_id.as_ref() == Some(id)
            }) {
                return Err(RepositoryError::Conflict);
            }
        }

        record.revision += 1;
        records.insert(record.key.clone(), record.clone());
        Ok(record)
    }

    fn fetch_by_key(&self, key: &RecordKey) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.records()?.get(key).cloned())
    }

    fn fetch_by_application_id(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let records = self.records()?;
        Ok(records
            .values()
            .find(|record| record.application_id.as_ref() == Some(id))
            .cloned())
    }

    fn staff_listing(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let records = self.records()?;
        let mut visible: Vec<ApplicationRecord> = records
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then(a.key.cmp(&b.key)));
        if let Some(limit) = filter.limit {
            visible.truncate(limit);
        }
        Ok(visible)
    }

    fn all(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(self.records()?.values().cloned().collect())
    }
}

/// Fixed academic-year configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAcademicYearStore {
    pub pointer: Option<AcademicYearPointer>,
    pub documents: Vec<AcademicYearDocument>,
    pub legacy: Option<LegacyYearSettings>,
}

impl StaticAcademicYearStore {
    /// Pointer plus one open year document for `start/end`.
    pub fn current(start: u16, end: u16) -> Self {
        let id = format!("{start}-{end}");
        let display_name = format!("{start}/{end}");
        Self {
            pointer: Some(AcademicYearPointer {
                current_academic_year_id: Some(id.clone()),
                current_academic_year: Some(display_name.clone()),
            }),
            documents: vec![AcademicYearDocument {
                id,
                year: Some(end.to_string()),
                display_name: Some(display_name),
                admission_status: Default::default(),
            }],
            legacy: None,
        }
    }
}

impl AcademicYearStore for StaticAcademicYearStore {
    fn pointer(&self) -> Result<Option<AcademicYearPointer>, AcademicYearError> {
        Ok(self.pointer.clone())
    }

    fn year_document(&self, id: &str) -> Result<Option<AcademicYearDocument>, AcademicYearError> {
        Ok(self
            .documents
            .iter()
            .find(|document| document.id == id)
            .cloned())
    }

    fn legacy_settings(&self) -> Result<Option<LegacyYearSettings>, AcademicYearError> {
        Ok(self.legacy.clone())
    }
}
