use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::export::{DateRange, ExportKind};
use crate::models::{ApplicationStatus, JobPosting, TrackedApplication};
use crate::patterns::FieldType;
use crate::scanner::FieldBinding;
use crate::session::normalize_records;
use crate::store::{keys, save, Store};

/// A learned field: on `domain`, the control with this id or name is `field_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub label: String,
    pub last_used: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    #[serde(rename = "type")]
    pub kind: ExportKind,
    pub record_count: usize,
    pub filename: String,
    pub date_range: Option<DateRange>,
    pub timestamp: DateTime<Utc>,
}

/// Field-mapping cache, job-application tracking and export history.
pub struct Tracker<'a> {
    store: &'a dyn Store,
    max_applications: usize,
    max_export_history: usize,
}

impl<'a> Tracker<'a> {
    pub fn new(store: &'a dyn Store, max_applications: usize, max_export_history: usize) -> Self {
        Self {
            store,
            max_applications,
            max_export_history,
        }
    }

    // --- Field mappings ---

    fn all_mappings(&self) -> Result<Map<String, Value>> {
        match self.store.get(keys::FIELD_MAPPINGS)? {
            Some(Value::Object(map)) => Ok(map),
            Some(other) => {
                warn!("Ignoring malformed field mapping cache: {}", other);
                Ok(Map::new())
            }
            None => Ok(Map::new()),
        }
    }

    /// Learned mappings for `domain`, keyed by element id or name.
    pub fn mappings_for(&self, domain: &str) -> Result<Option<HashMap<String, FieldMapping>>> {
        let all = self.all_mappings()?;
        let Some(Value::Object(entries)) = all.get(domain) else {
            return Ok(None);
        };
        let mappings: HashMap<String, FieldMapping> = entries
            .iter()
            .filter_map(|(id, v)| {
                serde_json::from_value(v.clone())
                    .ok()
                    .map(|m| (id.clone(), m))
            })
            .collect();
        if mappings.is_empty() {
            Ok(None)
        } else {
            Ok(Some(mappings))
        }
    }

    /// Remembers each binding that has an identifier. Returns how many were stored.
    pub fn learn(&self, domain: &str, bindings: &[&FieldBinding]) -> Result<usize> {
        if domain.is_empty() || bindings.is_empty() {
            return Ok(0);
        }
        let mut all = self.all_mappings()?;
        let entry = all
            .entry(domain.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }

        let now = Utc::now();
        let mut learned = 0;
        if let Value::Object(domain_map) = entry {
            for binding in bindings {
                let Some(id) = binding.identifier() else {
                    continue;
                };
                let mapping = FieldMapping {
                    field_type: binding.field_type,
                    label: binding.raw_label.clone(),
                    last_used: now,
                };
                domain_map.insert(id.to_string(), serde_json::to_value(mapping)?);
                learned += 1;
            }
        }
        self.store.set(keys::FIELD_MAPPINGS, &Value::Object(all))?;
        debug!("Learned {} field mappings for {}", learned, domain);
        Ok(learned)
    }

    // --- Job applications ---

    /// Applications, newest first.
    pub fn applications(&self) -> Result<Vec<TrackedApplication>> {
        let stored = self.store.get(keys::JOB_APPLICATIONS)?;
        // Stored as {"applications": [...]}; a bare list is accepted too.
        let list = match stored {
            Some(Value::Object(mut map)) if map.contains_key("applications") => map.remove("applications"),
            other => other,
        };
        Ok(normalize_records(list))
    }

    fn save_applications(&self, applications: &[TrackedApplication]) -> Result<()> {
        save(
            self.store,
            keys::JOB_APPLICATIONS,
            &serde_json::json!({ "applications": applications }),
        )
    }

    /// Creates or refreshes the entry for `job.url`. New entries go first and
    /// the list is capped, dropping the oldest. A refreshed entry keeps its
    /// status and user-entered columns.
    pub fn record_detected(&self, job: &JobPosting, fields_detected: usize) -> Result<TrackedApplication> {
        let mut applications = self.applications()?;
        let now = Utc::now();
        let url = application_key(&job.url);

        let position = applications.iter().position(|a| a.url == url);
        let mut application = match position {
            Some(i) => applications[i].clone(),
            None => TrackedApplication {
                url: url.to_string(),
                status: ApplicationStatus::Detected,
                applied_date: Some(now),
                ..Default::default()
            },
        };
        application.domain = job.domain.clone();
        application.title = non_empty_or(&job.title, "Unknown Position");
        application.company = non_empty_or(&job.company, "Unknown Company");
        application.location = job.location.clone();
        application.salary = job.salary.clone();
        application.description = job.description.clone();
        application.fields_detected = fields_detected;
        application.last_updated = Some(now);

        match position {
            Some(i) => applications[i] = application.clone(),
            None => {
                applications.insert(0, application.clone());
                applications.truncate(self.max_applications);
            }
        }
        self.save_applications(&applications)?;
        debug!("Tracked application {} ({})", application.title, application.url);
        Ok(application)
    }

    /// Moves the entry for `url` to `filled`. Returns false if it is not tracked.
    pub fn mark_filled(&self, url: &str, filled: usize) -> Result<bool> {
        let mut applications = self.applications()?;
        let url = application_key(url);
        let Some(application) = applications.iter_mut().find(|a| a.url == url) else {
            return Ok(false);
        };
        let now = Utc::now();
        application.status = ApplicationStatus::Filled;
        application.fields_filled = filled;
        application.last_filled = Some(now);
        application.last_updated = Some(now);
        self.save_applications(&applications)?;
        Ok(true)
    }

    // --- Export history ---

    pub fn export_history(&self) -> Result<Vec<ExportRecord>> {
        Ok(normalize_records(self.store.get(keys::EXPORT_HISTORY)?))
    }

    pub fn record_export(&self, record: ExportRecord) -> Result<()> {
        let mut history = self.export_history()?;
        history.insert(0, record);
        history.truncate(self.max_export_history);
        save(self.store, keys::EXPORT_HISTORY, &history)
    }

    pub fn clear_export_history(&self) -> Result<()> {
        self.store.remove(keys::EXPORT_HISTORY)
    }
}

/// Applications are keyed by URL; pages without one share a placeholder key.
fn application_key(url: &str) -> &str {
    if url.trim().is_empty() {
        "unknown"
    } else {
        url
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
