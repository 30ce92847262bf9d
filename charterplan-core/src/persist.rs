//! Versioned persisted records for selections and filters.
//!
//! Restoring is tolerant of catalog drift: unknown providers or charters are
//! dropped and counted rather than failing the whole import. Entries of the
//! wrong JSON type are kept as invalid entries and counted the same way. Only
//! payloads that cannot be read as a record at all are errors.
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::catalog::{Catalog, ProviderKey};
use crate::filter::FilterState;
use crate::selection::{CharterChange, Selection};

/// Current schema version written by this crate.
pub const SCHEMA_VERSION: u32 = 1;

const fn current_version() -> u32 {
    SCHEMA_VERSION
}

/// One key in a persisted list, or whatever stood in its place when it was not a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RecordEntry {
    Key(String),
    Invalid(Value),
}

impl RecordEntry {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(key) => Self::Key(key),
            other => Self::Invalid(other),
        }
    }

    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => Some(key),
            Self::Invalid(_) => None,
        }
    }
}

impl From<&str> for RecordEntry {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for RecordEntry {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl fmt::Display for RecordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Invalid(value) => write!(f, "{value}"),
        }
    }
}

fn entries<'a, I>(keys: I) -> Vec<RecordEntry>
where
    I: IntoIterator<Item = &'a String>,
{
    keys.into_iter().cloned().map(RecordEntry::Key).collect()
}

/// A list field; anything other than an array becomes a single invalid entry.
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<RecordEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(RecordEntry::from_value).collect(),
        Value::Null => Vec::new(),
        other => vec![RecordEntry::Invalid(other)],
    })
}

/// The charter map; a value that is not an object is kept under an empty
/// provider key so restoring counts it as dropped.
fn lenient_charters<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<ProviderKey, RecordEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map
            .into_iter()
            .map(|(provider, charter)| (provider, RecordEntry::from_value(charter)))
            .collect(),
        Value::Null => BTreeMap::new(),
        other => BTreeMap::from([(String::new(), RecordEntry::Invalid(other))]),
    })
}

/// Persisted selection: ordered providers plus active charters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRecord {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default, deserialize_with = "lenient_list")]
    pub providers: Vec<RecordEntry>,
    #[serde(default, deserialize_with = "lenient_charters")]
    pub charters: BTreeMap<ProviderKey, RecordEntry>,
}

impl Default for SelectionRecord {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            providers: Vec::new(),
            charters: BTreeMap::new(),
        }
    }
}

impl SelectionRecord {
    #[must_use]
    pub fn capture(selection: &Selection) -> Self {
        Self {
            version: SCHEMA_VERSION,
            providers: entries(selection.providers()),
            charters: selection
                .charters()
                .iter()
                .map(|(provider, charter)| (provider.clone(), RecordEntry::Key(charter.clone())))
                .collect(),
        }
    }
}

/// Persisted filter sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRecord {
    #[serde(default, deserialize_with = "lenient_list")]
    pub capabilities: Vec<RecordEntry>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub providers: Vec<RecordEntry>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub priority: Vec<RecordEntry>,
    /// Capabilities whose prestige good must be supplied by the selection.
    #[serde(default, deserialize_with = "lenient_list")]
    pub required_prestige: Vec<RecordEntry>,
}

impl FilterRecord {
    #[must_use]
    pub fn capture(filter: &FilterState) -> Self {
        Self {
            capabilities: entries(filter.targets()),
            providers: entries(filter.enabled_providers()),
            priority: entries(filter.priority()),
            required_prestige: entries(filter.required_prestige()),
        }
    }
}

/// Persisted session: a selection record plus an optional filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(flatten)]
    pub selection: SelectionRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterRecord>,
}

impl SessionRecord {
    /// Parse and version-check a session payload.
    ///
    /// Entries of the wrong type are kept and dropped later by restoring.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON object with a numeric
    /// version or comes from a newer schema.
    pub fn from_json(json: &str) -> Result<Self, ImportError> {
        let record: Self = serde_json::from_str(json)?;
        if record.selection.version > SCHEMA_VERSION {
            return Err(ImportError::UnsupportedVersion {
                found: record.selection.version,
                supported: SCHEMA_VERSION,
            });
        }
        Ok(record)
    }

    /// Serialize as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Payloads that cannot be imported at all.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unreadable import payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported schema version {found} (this build reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Partial-success summary of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Entries applied.
    pub applied: usize,
    /// Entries present in the payload.
    pub total: usize,
    /// Entries dropped, as human-readable references.
    pub dropped: Vec<String>,
}

impl ImportReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.applied == self.total
    }

    pub(crate) fn accept(&mut self) {
        self.total += 1;
        self.applied += 1;
    }

    pub(crate) fn drop_entry(&mut self, entry: String) {
        self.total += 1;
        self.dropped.push(entry);
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.applied += other.applied;
        self.total += other.total;
        self.dropped.extend(other.dropped);
    }
}

impl std::fmt::Display for ImportReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} of {} entries applied", self.applied, self.total)?;
        if !self.dropped.is_empty() {
            write!(f, " (dropped: {})", self.dropped.join(", "))?;
        }
        Ok(())
    }
}

/// Rebuild a selection from a record, dropping references the catalog does not know.
#[must_use]
pub fn restore_selection(
    catalog: &Catalog,
    record: &SelectionRecord,
) -> (Selection, ImportReport) {
    let mut selection = Selection::new();
    let mut report = ImportReport::default();
    for entry in &record.providers {
        if entry.key().is_some_and(|key| selection.select(catalog, key)) {
            report.accept();
        } else {
            report.drop_entry(format!("provider {entry}"));
        }
    }
    for (provider, charter) in &record.charters {
        let change = charter
            .key()
            .map(|charter| selection.choose_charter(catalog, provider, charter));
        match change {
            Some(CharterChange::Chosen) => report.accept(),
            _ => report.drop_entry(format!("charter {provider}:{charter}")),
        }
    }
    if !report.dropped.is_empty() {
        warn!(
            "selection import dropped {} of {} entries",
            report.dropped.len(),
            report.total
        );
    }
    (selection, report)
}

/// Rebuild a filter from a record, dropping unknown keys.
#[must_use]
pub fn restore_filter(catalog: &Catalog, record: &FilterRecord) -> (FilterState, ImportReport) {
    let mut report = ImportReport::default();
    let mut keep = |label: &str, entries: &[RecordEntry], known: &dyn Fn(&str) -> bool| {
        let mut kept = BTreeSet::new();
        for entry in entries {
            match entry.key().filter(|key| known(key)) {
                Some(key) => {
                    report.accept();
                    kept.insert(key.to_string());
                }
                None => report.drop_entry(format!("{label} {entry}")),
            }
        }
        kept
    };
    let capabilities = keep("capability", &record.capabilities, &|key: &str| {
        catalog.contains_capability(key)
    });
    let providers = keep("provider", &record.providers, &|key: &str| {
        catalog.contains_provider(key)
    });
    let priority = keep("priority", &record.priority, &|key: &str| {
        capabilities.contains(key)
    });
    let required_prestige = keep("prestige", &record.required_prestige, &|key: &str| {
        catalog.offers_prestige(key)
    });
    if !report.dropped.is_empty() {
        warn!(
            "filter import dropped {} of {} entries",
            report.dropped.len(),
            report.total
        );
    }
    let mut filter = FilterState::from_parts(capabilities, providers, priority);
    for capability in &required_prestige {
        filter.require_prestige(catalog, capability);
    }
    (filter, report)
}
