//! JSON-lines request/response adapter for a browser-side host.
//!
//! Each input line is one `Request`, tagged by `action`; each output line is
//! a `Response` of `{success, data?, error?}`.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::autofill::AutoFiller;
use crate::classifier::Classifier;
use crate::config::Settings;
use crate::export::{self, DateRange, ExportKind};
use crate::extract;
use crate::linkedin;
use crate::models::{CapturedProfile, Profile};
use crate::patterns::PatternTable;
use crate::repository::ProfileRepository;
use crate::resolver::Resolver;
use crate::resume::ResumeParser;
use crate::scanner::{cap_chars, PageScan};
use crate::session::{SessionCache, TabTracker};
use crate::store::Store;
use crate::tracking::Tracker;
use crate::upload::{upload_session, Uploader};
use crate::writeback::FormSnapshot;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    /// Caches a profile, scraped from `html` when given, else taken as sent.
    SaveProfile {
        url: String,
        #[serde(default)]
        html: Option<String>,
        #[serde(default)]
        profile: Option<Profile>,
    },
    GetSessionData,
    GetCacheStats,
    SendDataNow,
    ClearCache,
    TabUpdated {
        tab_id: u64,
        url: String,
    },
    TabClosed {
        tab_id: u64,
    },
    WindowClosed {
        #[serde(default)]
        tab_ids: Vec<u64>,
    },
    LoadPage {
        url: String,
        html: String,
    },
    GetFormFields,
    FillField {
        identifier: String,
        value: String,
    },
    AutoFill {
        #[serde(default)]
        dry_run: bool,
    },
    GetProfile,
    UpdateProfile {
        profile: Value,
    },
    SetAnswer {
        key: String,
        value: String,
    },
    ImportResume {
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        text: Option<String>,
    },
    GetApplications,
    ExportProfiles {
        #[serde(default)]
        start_date: Option<NaiveDate>,
        #[serde(default)]
        end_date: Option<NaiveDate>,
    },
    ExportApplications {
        #[serde(default)]
        start_date: Option<NaiveDate>,
        #[serde(default)]
        end_date: Option<NaiveDate>,
    },
    GetDataStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

struct LoadedPage {
    scan: PageScan,
    form: FormSnapshot,
}

pub struct RpcServer<'a> {
    store: &'a dyn Store,
    settings: &'a Settings,
    table: &'a PatternTable,
    classifier: Classifier,
    uploader: &'a dyn Uploader,
    export_dir: PathBuf,
    tabs: TabTracker,
    page: Option<LoadedPage>,
}

impl<'a> RpcServer<'a> {
    pub fn new(
        store: &'a dyn Store,
        settings: &'a Settings,
        table: &'a PatternTable,
        uploader: &'a dyn Uploader,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            settings,
            table,
            classifier: Classifier::new(table),
            uploader,
            export_dir,
            tabs: TabTracker::new(&settings.sync.session_domain),
            page: None,
        }
    }

    /// Serves requests until `input` ends.
    pub fn serve<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        for line in input.lines() {
            let line = line.context("Failed to read request")?;
            if line.trim().is_empty() {
                continue;
            }
            debug!("RPC request: {}", cap_chars(&line, 120));
            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => self.dispatch(request),
                Err(e) => {
                    warn!("Rejected request: {}", e);
                    Response::failed(format!("Invalid request: {}", e))
                }
            };
            serde_json::to_writer(&mut output, &response)?;
            writeln!(output)?;
            output.flush()?;
        }
        Ok(())
    }

    pub fn dispatch(&mut self, request: Request) -> Response {
        match self.handle(request) {
            Ok(data) => Response::ok(data),
            Err(e) => Response::failed(format!("{:#}", e)),
        }
    }

    fn tracker(&self) -> Tracker<'a> {
        let limits = &self.settings.limits;
        Tracker::new(self.store, limits.max_applications, limits.max_export_history)
    }

    fn profiles(&self) -> ProfileRepository<'a> {
        ProfileRepository::new(self.store, self.settings.limits.max_skills)
    }

    fn upload(&self) -> Result<Value> {
        let report = upload_session(self.uploader, &SessionCache::new(self.store), &self.settings.sync)?;
        Ok(serde_json::to_value(report)?)
    }

    fn export(&self, kind: ExportKind, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Value> {
        let outcome = export::export(
            self.store,
            &self.tracker(),
            kind,
            DateRange::new(start, end),
            &self.export_dir,
            self.tabs.has_open_tabs(),
        )?;
        Ok(json!({
            "recordCount": outcome.record_count,
            "filename": outcome.filename,
            "path": outcome.path,
        }))
    }

    fn handle(&mut self, request: Request) -> Result<Value> {
        let cache = SessionCache::new(self.store);
        match request {
            Request::SaveProfile { url, html, profile } => {
                let captured = match (html, profile) {
                    (Some(html), _) => {
                        let document = Html::parse_document(&html);
                        linkedin::scrape_profile(&document, &url, self.settings.limits.max_profile_skills)?
                    }
                    (None, Some(profile)) => CapturedProfile::new(&url, profile, "linkedin"),
                    (None, None) => return Err(anyhow!("saveProfile needs html or profile")),
                };
                let session = cache.save_profile(captured)?;
                Ok(json!({ "profileCount": session.profile_count }))
            }
            Request::GetSessionData => Ok(serde_json::to_value(cache.load()?)?),
            Request::GetCacheStats => Ok(serde_json::to_value(cache.stats()?)?),
            Request::SendDataNow => self.upload(),
            Request::ClearCache => {
                cache.clear()?;
                Ok(json!({ "cleared": true }))
            }
            Request::TabUpdated { tab_id, url } => {
                self.tabs.tab_updated(tab_id, &url);
                Ok(json!({ "openTabs": self.tabs.open_count() }))
            }
            Request::TabClosed { tab_id } => {
                if self.tabs.tab_closed(tab_id) {
                    info!("Last session tab closed; uploading cache");
                    self.upload()
                } else {
                    Ok(json!({ "openTabs": self.tabs.open_count() }))
                }
            }
            Request::WindowClosed { tab_ids } => {
                self.tabs.window_closed(&tab_ids);
                info!("Window closed; uploading cache");
                self.upload()
            }
            Request::LoadPage { url, html } => {
                let document = Html::parse_document(&html);
                let tracker = self.tracker();
                let filler = self.filler(&tracker);
                let scan = filler.scan_page(&document, &url)?;
                let data = serde_json::to_value(&scan)?;
                self.page = Some(LoadedPage {
                    form: FormSnapshot::from_document(&document),
                    scan,
                });
                Ok(data)
            }
            Request::GetFormFields => {
                let page = self.loaded()?;
                Ok(serde_json::to_value(&page.scan)?)
            }
            Request::FillField { identifier, value } => {
                let tracker = self.tracker();
                let classifier = &self.classifier;
                let resolver = Resolver::new(self.table, &self.settings.answers, &self.settings.referral_sources);
                let filler = AutoFiller::new(classifier, resolver, &tracker);
                let page = self.page.as_mut().ok_or_else(|| anyhow!("No page loaded. Send loadPage first."))?;
                let filled = filler.fill_one(&mut page.form, &page.scan, &identifier, &value)?;
                Ok(json!({ "filled": filled }))
            }
            Request::AutoFill { dry_run } => {
                let profile = self.profiles().get()?;
                let tracker = self.tracker();
                let classifier = &self.classifier;
                let resolver = Resolver::new(self.table, &self.settings.answers, &self.settings.referral_sources);
                let filler = AutoFiller::new(classifier, resolver, &tracker);
                let page = self.page.as_mut().ok_or_else(|| anyhow!("No page loaded. Send loadPage first."))?;
                let summary = filler.fill(&mut page.form, &page.scan, &profile, dry_run)?;
                Ok(serde_json::to_value(summary)?)
            }
            Request::GetProfile => Ok(serde_json::to_value(self.profiles().get()?)?),
            Request::UpdateProfile { profile } => Ok(serde_json::to_value(self.profiles().patch(&profile)?)?),
            Request::SetAnswer { key, value } => {
                let profile = self.profiles().set_answer(&key, &value)?;
                Ok(json!({ "answers": profile.answers }))
            }
            Request::ImportResume { path, text } => {
                let text = match (text, path) {
                    (Some(text), _) => text,
                    (None, Some(path)) => extract::extract_file(&path)?,
                    (None, None) => return Err(anyhow!("importResume needs text or path")),
                };
                let limits = &self.settings.limits;
                let parser = ResumeParser::new(limits.max_skills, limits.max_experience, limits.max_certifications)?;
                let parsed = parser.parse(&text);
                let profile = self.profiles().import_resume(&parsed)?;
                Ok(json!({ "parsed": parsed, "profile": profile }))
            }
            Request::GetApplications => Ok(serde_json::to_value(self.tracker().applications()?)?),
            Request::ExportProfiles { start_date, end_date } => {
                self.export(ExportKind::Profiles, start_date, end_date)
            }
            Request::ExportApplications { start_date, end_date } => {
                self.export(ExportKind::Applications, start_date, end_date)
            }
            Request::GetDataStats => Ok(serde_json::to_value(export::data_stats(self.store, &self.tracker())?)?),
        }
    }

    fn filler<'t>(&'t self, tracker: &'t Tracker<'a>) -> AutoFiller<'t> {
        let resolver = Resolver::new(self.table, &self.settings.answers, &self.settings.referral_sources);
        AutoFiller::new(&self.classifier, resolver, tracker)
    }

    fn loaded(&self) -> Result<&LoadedPage> {
        self.page.as_ref().ok_or_else(|| anyhow!("No page loaded. Send loadPage first."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::upload::UploadPayload;
    use std::cell::Cell;
    use std::io::Cursor;

    struct CountingUploader {
        calls: Cell<u32>,
    }

    impl Uploader for CountingUploader {
        fn send(&self, _payload: &UploadPayload) -> Result<Value> {
            self.calls.set(self.calls.get() + 1);
            Ok(json!({"received": true}))
        }

        fn endpoint(&self) -> &str {
            "mock://profiles"
        }
    }

    fn with_server<F: FnOnce(&mut RpcServer<'_>, &CountingUploader)>(f: F) {
        let store = MemoryStore::new();
        let mut settings = Settings::default();
        settings.sync.retry_delay_ms = 0;
        let table = PatternTable::builtin().unwrap();
        let uploader = CountingUploader { calls: Cell::new(0) };
        let dir = tempfile::tempdir().unwrap();
        let mut server = RpcServer::new(&store, &settings, &table, &uploader, dir.path().to_path_buf());
        f(&mut server, &uploader);
    }

    fn call(server: &mut RpcServer<'_>, request: Value) -> Response {
        let request: Request = serde_json::from_value(request).unwrap();
        server.dispatch(request)
    }

    #[test]
    fn test_json_lines_round_trip() {
        with_server(|server, _| {
            let input = concat!(
                r#"{"action":"setAnswer","key":"veteranStatus","value":"decline"}"#,
                "\n\n",
                r#"{"action":"getProfile"}"#,
                "\n",
                r#"{"action":"flyToTheMoon"}"#,
                "\n",
            );
            let mut output = Vec::new();
            server.serve(Cursor::new(input), &mut output).unwrap();

            let responses: Vec<Response> = String::from_utf8(output)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect();
            assert_eq!(responses.len(), 3);
            assert!(responses[0].success);
            assert_eq!(responses[1].data.as_ref().unwrap()["answers"]["veteranStatus"], "decline");
            assert!(!responses[2].success);
            assert!(responses[2].error.as_ref().unwrap().starts_with("Invalid request"));
        });
    }

    #[test]
    fn test_load_page_and_autofill() {
        with_server(|server, _| {
            call(server, json!({"action": "updateProfile", "profile": {"firstName": "Ada", "email": "ada@x.com"}}));
            let html = r#"<form><input name="first_name"><input name="email_address"></form>"#;
            let loaded = call(server, json!({"action": "loadPage", "url": "https://jobs.example.com/a", "html": html}));
            assert_eq!(loaded.data.unwrap()["bindings"].as_array().unwrap().len(), 2);

            let filled = call(server, json!({"action": "autoFill"}));
            assert!(filled.success);
            assert_eq!(filled.data.as_ref().unwrap()["filled"], 2);

            let single = call(server, json!({"action": "fillField", "identifier": "first_name", "value": "Grace"}));
            assert_eq!(single.data.unwrap()["filled"], true);

            let apps = call(server, json!({"action": "getApplications"}));
            assert_eq!(apps.data.unwrap()[0]["status"], "filled");
        });
    }

    #[test]
    fn test_fill_without_page_fails() {
        with_server(|server, _| {
            let response = call(server, json!({"action": "autoFill", "dryRun": true}));
            assert!(!response.success);
            assert!(response.error.unwrap().contains("loadPage"));
        });
    }

    #[test]
    fn test_last_tab_close_uploads() {
        with_server(|server, uploader| {
            let profile = json!({"fullName": "Ada Lovelace"});
            call(server, json!({"action": "saveProfile", "url": "https://linkedin.com/in/ada", "profile": profile}));
            call(server, json!({"action": "tabUpdated", "tabId": 1, "url": "https://www.linkedin.com/in/ada"}));
            call(server, json!({"action": "tabUpdated", "tabId": 2, "url": "https://www.linkedin.com/feed"}));

            let export = call(server, json!({"action": "exportProfiles"}));
            assert!(!export.success);

            call(server, json!({"action": "tabClosed", "tabId": 1}));
            assert_eq!(uploader.calls.get(), 0);
            let closed = call(server, json!({"action": "tabClosed", "tabId": 2}));
            assert_eq!(uploader.calls.get(), 1);
            assert_eq!(closed.data.unwrap()["success"], true);

            let stats = call(server, json!({"action": "getCacheStats"}));
            assert_eq!(stats.data.unwrap()["profileCount"], 0);
            let export = call(server, json!({"action": "exportProfiles"}));
            assert_eq!(export.data.unwrap()["recordCount"], 1);
            let data = call(server, json!({"action": "getDataStats"}));
            assert_eq!(data.data.unwrap()["exports"]["totalExports"], 1);
        });
    }

    #[test]
    fn test_import_resume_text() {
        with_server(|server, _| {
            let text = "Ada Lovelace\nada@example.com\nAustin, TX 78730\n\nSKILLS\nRust, Python\n";
            let response = call(server, json!({"action": "importResume", "text": text}));
            assert!(response.success, "{:?}", response.error);
            let profile = call(server, json!({"action": "getProfile"})).data.unwrap();
            assert_eq!(profile["email"], "ada@example.com");
            assert_eq!(profile["state"], "TX");
            assert_eq!(profile["skills"], json!(["Python", "Rust"]));
        });
    }
}
