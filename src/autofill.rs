use anyhow::Result;
use scraper::Html;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::Classifier;
use crate::models::Profile;
use crate::patterns::FieldType;
use crate::resolver::{ResolvedValue, Resolver};
use crate::scanner::{self, FieldBinding, PageScan};
use crate::tracking::Tracker;
use crate::writeback::{self, describe, FormSurface, WriteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    Filled,
    /// Would be filled; dry runs stop here.
    Planned,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReport {
    pub field_type: FieldType,
    pub label: String,
    pub element: String,
    pub value: Option<String>,
    pub status: FieldStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillSummary {
    pub detected: usize,
    pub filled: usize,
    pub skipped: usize,
    pub failed: Vec<FieldReport>,
    pub fields: Vec<FieldReport>,
}

pub fn domain_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

/// Scan, resolve and write back, recording results in the tracking caches.
pub struct AutoFiller<'a> {
    classifier: &'a Classifier,
    resolver: Resolver<'a>,
    tracker: &'a Tracker<'a>,
}

impl<'a> AutoFiller<'a> {
    pub fn new(classifier: &'a Classifier, resolver: Resolver<'a>, tracker: &'a Tracker<'a>) -> Self {
        Self {
            classifier,
            resolver,
            tracker,
        }
    }

    /// Scans with the domain's learned mappings and tracks the page as a
    /// detected application when it has fillable fields.
    pub fn scan_page(&self, document: &Html, url: &str) -> Result<PageScan> {
        let cached = self.tracker.mappings_for(&domain_of(url))?;
        let page = scanner::scan(document, url, self.classifier, cached.as_ref());
        if !page.bindings.is_empty() {
            self.tracker.record_detected(&page.job, page.bindings.len())?;
        }
        Ok(page)
    }

    /// Fills every binding in order. A field that fails is reported and
    /// the batch continues.
    pub fn fill(
        &self,
        surface: &mut dyn FormSurface,
        page: &PageScan,
        profile: &Profile,
        dry_run: bool,
    ) -> Result<FillSummary> {
        let mut summary = FillSummary {
            detected: page.bindings.len(),
            ..Default::default()
        };
        let mut filled_bindings: Vec<&FieldBinding> = Vec::new();

        for binding in &page.bindings {
            let mut report = FieldReport {
                field_type: binding.field_type,
                label: binding.raw_label.clone(),
                element: describe(&binding.element),
                value: None,
                status: FieldStatus::Skipped,
                error: None,
            };

            match self.resolver.resolve(binding.field_type, profile, &binding.hints) {
                None => {
                    debug!("No value for {} ({})", binding.field_type, report.element);
                    summary.skipped += 1;
                }
                Some(value) if dry_run => {
                    report.value = Some(value.text);
                    report.status = FieldStatus::Planned;
                }
                Some(value) => {
                    report.value = Some(value.text.clone());
                    match writeback::apply(surface, binding, &value) {
                        Ok(true) => {
                            report.status = FieldStatus::Filled;
                            summary.filled += 1;
                            filled_bindings.push(binding);
                        }
                        Ok(false) => summary.skipped += 1,
                        Err(e) => {
                            warn!("Failed to fill {} ({}): {}", binding.field_type, report.element, e);
                            report.status = FieldStatus::Failed;
                            report.error = Some(e.to_string());
                            summary.failed.push(report.clone());
                        }
                    }
                }
            }
            summary.fields.push(report);
        }

        if !dry_run && summary.filled > 0 {
            if let Err(e) = self.tracker.learn(&page.job.domain, &filled_bindings) {
                warn!("Failed to remember field mappings for {}: {:#}", page.job.domain, e);
            }
            if let Err(e) = self.tracker.mark_filled(&page.job.url, summary.filled) {
                warn!("Failed to mark {} as filled: {:#}", page.job.url, e);
            }
        }
        info!(
            "Filled {}/{} fields on {} ({} skipped, {} failed)",
            summary.filled,
            summary.detected,
            page.job.url,
            summary.skipped,
            summary.failed.len()
        );
        Ok(summary)
    }

    /// Writes a given value into the control with this id or name.
    pub fn fill_one(
        &self,
        surface: &mut dyn FormSurface,
        page: &PageScan,
        identifier: &str,
        value: &str,
    ) -> Result<bool, WriteError> {
        let binding = page
            .bindings
            .iter()
            .find(|b| b.identifier() == Some(identifier))
            .ok_or_else(|| WriteError::ElementMissing(identifier.to_string()))?;
        writeback::apply(surface, binding, &ResolvedValue::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplicationStatus;
    use crate::patterns::PatternTable;
    use crate::phone::Phone;
    use crate::scanner::BindingSource;
    use crate::store::{MemoryStore, Store};
    use crate::writeback::{FormEvent, FormSnapshot};
    use std::cell::Cell;
    use std::collections::BTreeMap;

    const FORM: &str = r#"<html><body><h1>Data Engineer</h1><form>
        <input name="first_name">
        <input name="email_address">
        <input id="phone1" placeholder="(555) 555-5555">
        <input name="xyz_q7">
    </form></body></html>"#;
    const URL: &str = "https://jobs.example.com/apply/7";

    fn profile() -> Profile {
        let mut p = Profile::default();
        p.first_name = "Ada".into();
        p.email = "ada@x.com".into();
        p.phone = Phone::parse("5755550323");
        p
    }

    fn run<F: FnOnce(&AutoFiller<'_>, &Tracker<'_>)>(f: F) {
        let table = PatternTable::builtin().unwrap();
        let classifier = Classifier::new(&table);
        let answers = BTreeMap::new();
        let sources: Vec<String> = Vec::new();
        let store = MemoryStore::new();
        let tracker = Tracker::new(&store, 50, 50);
        let filler = AutoFiller::new(&classifier, Resolver::new(&table, &answers, &sources), &tracker);
        f(&filler, &tracker);
    }

    #[test]
    fn test_end_to_end_fill() {
        run(|filler, tracker| {
            let document = Html::parse_document(FORM);
            let page = filler.scan_page(&document, URL).unwrap();
            assert_eq!(tracker.applications().unwrap()[0].status, ApplicationStatus::Detected);

            let mut form = FormSnapshot::from_document(&document);
            let summary = filler.fill(&mut form, &page, &profile(), false).unwrap();
            assert_eq!(summary.detected, 3);
            assert_eq!(summary.filled, 3);
            assert!(summary.failed.is_empty());

            let bound: Vec<_> = page
                .bindings
                .iter()
                .map(|b| (b.field_type, b.identifier().unwrap_or_default()))
                .collect();
            assert_eq!(
                bound,
                [
                    (FieldType::FirstName, "first_name"),
                    (FieldType::Email, "email_address"),
                    (FieldType::Phone, "phone1"),
                ]
            );

            let expected = ["Ada", "ada@x.com", "(575) 555-0323"];
            for (ordinal, value) in expected.iter().enumerate() {
                let control = form.control(ordinal).unwrap();
                assert_eq!(control.value, *value);
                assert_eq!(control.events, [FormEvent::Input, FormEvent::Change, FormEvent::Blur]);
            }
            assert!(form.control(3).unwrap().events.is_empty());

            let app = &tracker.applications().unwrap()[0];
            assert_eq!(app.status, ApplicationStatus::Filled);
            assert_eq!(app.fields_filled, 3);
            assert_eq!(app.title, "Data Engineer");
        });
    }

    #[test]
    fn test_phone_placeholder_picks_format() {
        run(|filler, _| {
            let document = Html::parse_document(
                r#"<form><input id="phone1" placeholder="555-555-5555"><input name="phone2"></form>"#,
            );
            let page = filler.scan_page(&document, URL).unwrap();
            let mut form = FormSnapshot::from_document(&document);
            let summary = filler.fill(&mut form, &page, &profile(), false).unwrap();
            assert_eq!(summary.filled, 2);
            assert_eq!(form.control(0).unwrap().value, "575-555-0323");
            assert_eq!(form.control(1).unwrap().value, "(575) 555-0323");
        });
    }

    #[test]
    fn test_unmatched_and_empty_values_are_not_filled() {
        run(|filler, _| {
            let document = Html::parse_document(FORM);
            let page = filler.scan_page(&document, URL).unwrap();
            assert_eq!(page.unclassified, ["xyz q7"]);

            let mut sparse = profile();
            sparse.phone = None;
            let mut form = FormSnapshot::from_document(&document);
            let summary = filler.fill(&mut form, &page, &sparse, false).unwrap();
            assert_eq!(summary.filled, 2);
            assert_eq!(summary.skipped, 1);
            assert!(form.control(2).unwrap().value.is_empty());
        });
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        run(|filler, tracker| {
            let document = Html::parse_document(FORM);
            let page = filler.scan_page(&document, URL).unwrap();
            let mut form = FormSnapshot::from_document(&document);
            let summary = filler.fill(&mut form, &page, &profile(), true).unwrap();
            assert_eq!(summary.filled, 0);
            assert!(summary.fields.iter().all(|f| f.status == FieldStatus::Planned));
            assert!(form.control(0).unwrap().value.is_empty());
            assert_eq!(tracker.applications().unwrap()[0].status, ApplicationStatus::Detected);
        });
    }

    #[test]
    fn test_failure_is_isolated() {
        run(|filler, _| {
            let document = Html::parse_document(FORM);
            let page = filler.scan_page(&document, URL).unwrap();
            // A page where the email control has been replaced by a select.
            let changed = Html::parse_document(
                r#"<form><input name="first_name"><select name="email_address"></select><input id="phone1" placeholder="(555) 555-5555"></form>"#,
            );
            let mut form = FormSnapshot::from_document(&changed);
            let summary = filler.fill(&mut form, &page, &profile(), false).unwrap();
            assert_eq!(summary.filled, 2);
            assert_eq!(summary.failed.len(), 1);
            assert_eq!(summary.failed[0].field_type, FieldType::Email);
            assert_eq!(form.control(2).unwrap().value, "(575) 555-0323");
        });
    }

    #[test]
    fn test_learned_mappings_apply_next_scan() {
        run(|filler, tracker| {
            let document = Html::parse_document(FORM);
            let page = filler.scan_page(&document, URL).unwrap();
            let mut form = FormSnapshot::from_document(&document);
            filler.fill(&mut form, &page, &profile(), false).unwrap();
            assert_eq!(tracker.mappings_for("jobs.example.com").unwrap().unwrap().len(), 3);

            let again = filler.scan_page(&document, "https://jobs.example.com/apply/8").unwrap();
            assert!(again.bindings.iter().all(|b| b.source == BindingSource::Cache));
        });
    }

    /// Accepts writes until `fail_writes` is set.
    struct BrittleStore {
        inner: MemoryStore,
        fail_writes: Cell<bool>,
    }

    impl Store for BrittleStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
            if self.fail_writes.get() {
                return Err(anyhow::anyhow!("disk full"));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.inner.remove(key)
        }

        fn keys(&self) -> anyhow::Result<Vec<String>> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_tracking_failure_keeps_summary() {
        let table = PatternTable::builtin().unwrap();
        let classifier = Classifier::new(&table);
        let answers = BTreeMap::new();
        let sources: Vec<String> = Vec::new();
        let store = BrittleStore {
            inner: MemoryStore::new(),
            fail_writes: Cell::new(false),
        };
        let tracker = Tracker::new(&store, 50, 50);
        let filler = AutoFiller::new(&classifier, Resolver::new(&table, &answers, &sources), &tracker);

        let document = Html::parse_document(FORM);
        let page = filler.scan_page(&document, URL).unwrap();
        store.fail_writes.set(true);
        let mut form = FormSnapshot::from_document(&document);
        let summary = filler.fill(&mut form, &page, &profile(), false).unwrap();
        assert_eq!(summary.filled, 3);
        assert_eq!(form.control(0).unwrap().value, "Ada");
        assert_eq!(tracker.applications().unwrap()[0].status, ApplicationStatus::Detected);
    }

    #[test]
    fn test_fill_one() {
        run(|filler, _| {
            let document = Html::parse_document(FORM);
            let page = filler.scan_page(&document, URL).unwrap();
            let mut form = FormSnapshot::from_document(&document);
            assert!(filler.fill_one(&mut form, &page, "email_address", "grace@x.com").unwrap());
            assert_eq!(form.control(1).unwrap().value, "grace@x.com");
            assert!(filler.fill_one(&mut form, &page, "nope", "x").is_err());
        });
    }
}
