//! Admission-year resolution from the academic-year configuration.
//!
//! Two configuration systems coexist: the centralized pointer record (with the
//! year document it references) and the legacy settings record. Resolution
//! tries them in priority order and ends at the calendar year.

use std::sync::{Arc, OnceLock};

use chrono::{Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{InvalidYearKey, YearKey};

/// Centralized record naming the current academic year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicYearPointer {
    #[serde(default)]
    pub current_academic_year_id: Option<String>,
    /// Display form such as `2025/2026`.
    #[serde(default)]
    pub current_academic_year: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicYearDocument {
    pub id: String,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub admission_status: AdmissionStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    #[default]
    Open,
    Closed,
    Upcoming,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyYearSettings {
    #[serde(default)]
    pub current_year: Option<String>,
}

/// Read-only access to the academic-year configuration.
pub trait AcademicYearStore: Send + Sync {
    fn pointer(&self) -> Result<Option<AcademicYearPointer>, AcademicYearError>;
    fn year_document(&self, id: &str) -> Result<Option<AcademicYearDocument>, AcademicYearError>;
    fn legacy_settings(&self) -> Result<Option<LegacyYearSettings>, AcademicYearError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcademicYearError {
    #[error("academic year configuration unavailable: {0}")]
    Unavailable(String),
}

/// Named step in a [`ResolverChain`].
pub struct Resolver<C: ?Sized, T> {
    pub name: &'static str,
    pub resolve: fn(&C) -> Option<T>,
}

/// Ordered list of resolvers; the first one returning `Some` wins.
pub struct ResolverChain<C: ?Sized, T> {
    resolvers: Vec<Resolver<C, T>>,
}

impl<C: ?Sized, T> ResolverChain<C, T> {
    pub fn new(resolvers: Vec<Resolver<C, T>>) -> Self {
        Self { resolvers }
    }

    /// Returns the resolved value together with the name of the resolver that produced it.
    pub fn resolve(&self, context: &C) -> Option<(&'static str, T)> {
        self.resolvers
            .iter()
            .find_map(|resolver| (resolver.resolve)(context).map(|value| (resolver.name, value)))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|resolver| resolver.name).collect()
    }
}

/// Where the admission year came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearSource {
    YearDocument,
    DisplayName,
    LegacySettings,
    CalendarYear,
}

impl YearSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::YearDocument => "year_document",
            Self::DisplayName => "display_name",
            Self::LegacySettings => "legacy_settings",
            Self::CalendarYear => "calendar_year",
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "year_document" => Self::YearDocument,
            "display_name" => Self::DisplayName,
            "legacy_settings" => Self::LegacySettings,
            _ => Self::CalendarYear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAdmissionYear {
    pub year: String,
    pub source: YearSource,
}

/// Snapshot of every configuration record, read once per resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct YearConfigSnapshot {
    pub pointer: Option<AcademicYearPointer>,
    pub document: Option<AcademicYearDocument>,
    pub legacy: Option<LegacyYearSettings>,
    pub calendar_year: i32,
}

fn four_digit_years(raw: &str) -> Vec<String> {
    static YEAR: OnceLock<Regex> = OnceLock::new();
    let pattern = YEAR.get_or_init(|| Regex::new(r"(?:^|\D)(\d{4})(?:\D|$)").expect("valid regex"));
    // Captures are non-overlapping, so `2025/2026` needs a second scan past the separator.
    let mut years = Vec::new();
    let mut rest = raw;
    while let Some(captures) = pattern.captures(rest) {
        let Some(year) = captures.get(1) else { break };
        years.push(year.as_str().to_string());
        rest = &rest[year.end()..];
    }
    years
}

/// Last four-digit run in `raw`.
pub fn extract_year(raw: &str) -> Option<String> {
    four_digit_years(raw).pop()
}

/// Second year of a `YYYY/YYYY` display name.
pub fn ending_year(display_name: &str) -> Option<String> {
    let (start, end) = display_name.trim().split_once('/')?;
    let start = start.trim();
    let end = end.trim();
    let is_year = |value: &str| value.len() == 4 && value.chars().all(|c| c.is_ascii_digit());
    if is_year(start) && is_year(end) {
        Some(end.to_string())
    } else {
        None
    }
}

fn from_year_document(snapshot: &YearConfigSnapshot) -> Option<String> {
    snapshot
        .document
        .as_ref()?
        .year
        .as_deref()
        .and_then(extract_year)
}

fn from_display_name(snapshot: &YearConfigSnapshot) -> Option<String> {
    let pointer_name = snapshot
        .pointer
        .as_ref()
        .and_then(|pointer| pointer.current_academic_year.as_deref());
    let document_name = snapshot
        .document
        .as_ref()
        .and_then(|document| document.display_name.as_deref());
    pointer_name
        .and_then(ending_year)
        .or_else(|| document_name.and_then(ending_year))
}

fn from_legacy_settings(snapshot: &YearConfigSnapshot) -> Option<String> {
    snapshot
        .legacy
        .as_ref()?
        .current_year
        .as_deref()
        .and_then(extract_year)
}

fn from_calendar(snapshot: &YearConfigSnapshot) -> Option<String> {
    Some(format!("{:04}", snapshot.calendar_year))
}

/// Priority order for admission-year resolution.
pub fn admission_year_chain() -> ResolverChain<YearConfigSnapshot, String> {
    ResolverChain::new(vec![
        Resolver {
            name: YearSource::YearDocument.as_str(),
            resolve: from_year_document,
        },
        Resolver {
            name: YearSource::DisplayName.as_str(),
            resolve: from_display_name,
        },
        Resolver {
            name: YearSource::LegacySettings.as_str(),
            resolve: from_legacy_settings,
        },
        Resolver {
            name: YearSource::CalendarYear.as_str(),
            resolve: from_calendar,
        },
    ])
}

/// Resolves the admission year and the counter key derived from it.
pub struct AcademicYearResolver {
    store: Arc<dyn AcademicYearStore>,
    prefix: String,
    chain: ResolverChain<YearConfigSnapshot, String>,
}

impl AcademicYearResolver {
    pub fn new(store: Arc<dyn AcademicYearStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            chain: admission_year_chain(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Read the configuration records; unreadable records count as absent.
    pub fn snapshot(&self) -> YearConfigSnapshot {
        let pointer = self.store.pointer().unwrap_or_else(|error| {
            warn!(%error, "academic year pointer unreadable");
            None
        });

        let document = pointer
            .as_ref()
            .and_then(|pointer| pointer.current_academic_year_id.as_deref())
            .and_then(|id| {
                self.store.year_document(id).unwrap_or_else(|error| {
                    warn!(%error, year_document = id, "academic year document unreadable");
                    None
                })
            });

        let legacy = self.store.legacy_settings().unwrap_or_else(|error| {
            warn!(%error, "legacy year settings unreadable");
            None
        });

        YearConfigSnapshot {
            pointer,
            document,
            legacy,
            calendar_year: Utc::now().year(),
        }
    }

    pub fn resolve(&self) -> ResolvedAdmissionYear {
        self.resolve_snapshot(&self.snapshot())
    }

    pub fn resolve_snapshot(&self, snapshot: &YearConfigSnapshot) -> ResolvedAdmissionYear {
        let (name, year) = self
            .chain
            .resolve(snapshot)
            .unwrap_or((YearSource::CalendarYear.as_str(), format!("{:04}", snapshot.calendar_year)));
        let source = YearSource::from_name(name);

        if source == YearSource::CalendarYear {
            warn!(
                year = %year,
                "academic year configuration unresolved; falling back to calendar year"
            );
        }

        ResolvedAdmissionYear { year, source }
    }

    pub fn year_key(&self) -> Result<YearKey, InvalidYearKey> {
        let resolved = self.resolve();
        YearKey::for_year(&self.prefix, &resolved.year)
    }

    /// Admission status of the current year document, if one is configured.
    pub fn admission_status(&self) -> Option<AdmissionStatus> {
        self.snapshot()
            .document
            .map(|document| document.admission_status)
    }
}
