//! Per-year sequential application-ID allocation.
//!
//! Each admission year owns one counter record. Allocation is a single
//! store-side increment; the allocator only adds bounded retry around it and a
//! non-sequential fallback so submissions are never blocked on the counter.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{ApplicationId, YearKey, PROVISIONAL_MARKER};

/// Counter record persisted once per admission year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub year_key: YearKey,
    pub last_number: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl CounterRecord {
    pub fn first(year_key: YearKey, now: DateTime<Utc>) -> Self {
        Self {
            year_key,
            last_number: 1,
            created_at: now,
            last_updated: now,
        }
    }

    /// Next state of the record after one issue.
    pub fn advanced(&self, now: DateTime<Utc>) -> Self {
        Self {
            year_key: self.year_key.clone(),
            last_number: self.last_number + 1,
            created_at: self.created_at,
            last_updated: now,
        }
    }
}

/// Backing store for counter records.
///
/// `increment` must be one transactional operation: create the record with
/// `last_number = 1` when absent, otherwise add one, and return the stored
/// result. Two concurrent callers must never observe the same number.
pub trait CounterStore: Send + Sync {
    fn get(&self, year_key: &YearKey) -> Result<Option<CounterRecord>, CounterStoreError>;
    fn increment(&self, year_key: &YearKey) -> Result<CounterRecord, CounterStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CounterStoreError {
    #[error("counter transaction aborted by a concurrent writer")]
    Contention,
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("counter for {year_key} still contended after {attempts} attempts")]
    CounterContention { year_key: YearKey, attempts: u32 },
    #[error("counter for {year_key} unavailable after {attempts} attempts: {source}")]
    Store {
        year_key: YearKey,
        attempts: u32,
        #[source]
        source: CounterStoreError,
    },
}

/// Retry policy for the transactional increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorSettings {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

pub struct SequenceAllocator {
    store: Arc<dyn CounterStore>,
    settings: AllocatorSettings,
}

impl SequenceAllocator {
    pub fn new(store: Arc<dyn CounterStore>, settings: AllocatorSettings) -> Self {
        let settings = AllocatorSettings {
            max_attempts: settings.max_attempts.max(1),
            ..settings
        };
        Self { store, settings }
    }

    pub fn settings(&self) -> AllocatorSettings {
        self.settings
    }

    /// Issue the next identifier for `year_key`.
    ///
    /// Falls back to a provisional, non-sequential identifier once the retry
    /// budget is spent.
    pub fn allocate(&self, year_key: &YearKey) -> ApplicationId {
        match self.try_allocate(year_key) {
            Ok(id) => id,
            Err(error) => {
                let id = provisional_id(year_key, Utc::now());
                warn!(
                    %year_key,
                    application_id = %id,
                    error = %error,
                    "sequence allocation failed; issued provisional application id"
                );
                id
            }
        }
    }

    /// Issue the next sequential identifier without the provisional fallback.
    pub fn try_allocate(&self, year_key: &YearKey) -> Result<ApplicationId, AllocationError> {
        let max_attempts = self.settings.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.store.increment(year_key) {
                Ok(record) => {
                    let id = ApplicationId::sequential(year_key, record.last_number);
                    debug!(%year_key, last_number = record.last_number, attempt, "allocated application id");
                    return Ok(id);
                }
                Err(error) if attempt >= max_attempts => {
                    return Err(match error {
                        CounterStoreError::Contention => AllocationError::CounterContention {
                            year_key: year_key.clone(),
                            attempts: attempt,
                        },
                        source @ CounterStoreError::Unavailable(_) => AllocationError::Store {
                            year_key: year_key.clone(),
                            attempts: attempt,
                            source,
                        },
                    });
                }
                Err(error) => {
                    debug!(%year_key, attempt, %error, "retrying counter increment");
                    if !self.settings.retry_backoff.is_zero() {
                        thread::sleep(self.settings.retry_backoff * attempt);
                    }
                }
            }
        }
    }

    pub fn counter(&self, year_key: &YearKey) -> Result<Option<CounterRecord>, CounterStoreError> {
        self.store.get(year_key)
    }
}

/// `{year_key}-TMP{unix_millis}{4 hex}`; unique without touching the counter.
pub fn provisional_id(year_key: &YearKey, now: DateTime<Utc>) -> ApplicationId {
    let suffix: u16 = rand::random();
    ApplicationId(format!(
        "{}{}{}{:04X}",
        year_key.as_str(),
        PROVISIONAL_MARKER,
        now.timestamp_millis(),
        suffix
    ))
}
