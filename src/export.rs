use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{CapturedProfile, TrackedApplication};
use crate::session::SessionCache;
use crate::store::Store;
use crate::tracking::{ExportRecord, Tracker};

pub const PROFILE_HEADERS: [&str; 20] = [
    "Full Name",
    "First Name",
    "Last Name",
    "Headline",
    "Location",
    "Current Company",
    "Current Title",
    "Email",
    "Phone",
    "LinkedIn URL",
    "Profile Picture URL",
    "About/Summary",
    "Total Experience (Years)",
    "Education",
    "Skills",
    "Languages",
    "Certifications",
    "Connections",
    "Saved Date",
    "Profile Source",
];

pub const APPLICATION_HEADERS: [&str; 22] = [
    "Job Title",
    "Company Name",
    "Location",
    "Job URL",
    "Application Date",
    "Status",
    "Submitted",
    "Job Description",
    "Requirements",
    "Salary Range",
    "Job Type",
    "Remote/Hybrid/Onsite",
    "Experience Level",
    "Department",
    "Source Website",
    "Notes",
    "Contact Name",
    "Contact Email",
    "Resume Used",
    "Cover Letter",
    "Follow Up Date",
    "Last Updated",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportKind {
    #[serde(rename = "recruiter")]
    Profiles,
    #[serde(rename = "talent")]
    Applications,
}

impl ExportKind {
    fn file_prefix(self) -> &'static str {
        match self {
            ExportKind::Profiles => "LinkedIn_Profiles_Export",
            ExportKind::Applications => "Job_Applications_Export",
        }
    }
}

/// Inclusive date range; a missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> Option<Self> {
        if start_date.is_none() && end_date.is_none() {
            None
        } else {
            Some(Self { start_date, end_date })
        }
    }

    /// Undated records fall outside any range with a start bound.
    pub fn contains(&self, at: Option<DateTime<Utc>>) -> bool {
        let at = at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        if let Some(start) = self.start_date {
            if at < start.and_time(NaiveTime::MIN).and_utc() {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if at.date_naive() > end {
                return false;
            }
        }
        true
    }
}

pub fn filter_by_date_range<T, F>(records: Vec<T>, range: Option<&DateRange>, date_of: F) -> Vec<T>
where
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    match range {
        Some(range) => records.into_iter().filter(|r| range.contains(date_of(r))).collect(),
        None => records,
    }
}

/// Trims, then quotes when the value holds a comma, quote or line break.
pub fn escape_csv(value: &str) -> String {
    let value = value.trim();
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| escape_csv(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn profiles_to_csv(profiles: &[CapturedProfile]) -> String {
    let mut lines = vec![PROFILE_HEADERS.join(",")];
    for captured in profiles {
        let p = &captured.profile;
        let education = p
            .education
            .iter()
            .map(|e| format!("{} at {} ({})", e.degree, e.school, e.years))
            .collect::<Vec<_>>()
            .join("; ");
        let languages = p
            .languages
            .iter()
            .map(|l| format!("{} ({})", l.language, l.proficiency))
            .collect::<Vec<_>>()
            .join("; ");
        let certifications = p
            .certifications
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let linkedin = if p.linked_in_url.is_empty() { &captured.url } else { &p.linked_in_url };
        let years = if p.years_of_experience == 0 {
            String::new()
        } else {
            p.years_of_experience.to_string()
        };
        let source = if captured.source.is_empty() { "LinkedIn" } else { &captured.source };

        lines.push(csv_row(&[
            p.display_name(),
            p.first_name.clone(),
            p.last_name.clone(),
            p.headline.clone(),
            p.location.clone(),
            p.current_company().to_string(),
            p.current_job_title().to_string(),
            p.email.clone(),
            p.phone.as_ref().map(|ph| ph.to_string()).unwrap_or_default(),
            linkedin.clone(),
            p.profile_image_url.clone(),
            p.summary.clone(),
            years,
            education,
            p.skills().join(", "),
            languages,
            certifications,
            p.connections.clone(),
            captured.captured_at.to_rfc3339(),
            source.to_string(),
        ]));
    }
    lines.join("\n")
}

pub fn applications_to_csv(applications: &[TrackedApplication]) -> String {
    let mut lines = vec![APPLICATION_HEADERS.join(",")];
    for app in applications {
        let applied = app.applied_date.map(|d| d.to_rfc3339()).unwrap_or_default();
        let updated = app.last_updated.unwrap_or_else(Utc::now).to_rfc3339();
        lines.push(csv_row(&[
            app.title.as_str(),
            &app.company,
            &app.location,
            &app.url,
            &applied,
            &app.status.to_string(),
            if app.submitted { "Yes" } else { "No" },
            &app.description,
            &app.requirements,
            &app.salary,
            &app.job_type,
            &app.work_mode,
            &app.experience_level,
            &app.department,
            &app.domain,
            &app.notes,
            &app.contact_name,
            &app.contact_email,
            &app.resume_used,
            &app.cover_letter,
            &app.follow_up_date,
            &updated,
        ]));
    }
    lines.join("\n")
}

/// `<prefix>[_<from>_to_<to>]_<YYYY-MM-DDTHH-MM-SS>.csv`
pub fn export_filename(kind: ExportKind, range: Option<&DateRange>, now: DateTime<Utc>) -> String {
    let bound = |d: Option<NaiveDate>| {
        d.map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "present".to_string())
    };
    let suffix = match range {
        Some(r) => format!("_{}_to_{}", bound(r.start_date), bound(r.end_date)),
        None => String::new(),
    };
    format!(
        "{}{}_{}.csv",
        kind.file_prefix(),
        suffix,
        now.format("%Y-%m-%dT%H-%M-%S")
    )
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOutcome {
    pub record_count: usize,
    pub filename: String,
    pub path: PathBuf,
}

/// Writes one CSV export into `out_dir` and records it in the history.
///
/// Refused while session-domain tabs are open, since the cache is still
/// being written.
pub fn export(
    store: &dyn Store,
    tracker: &Tracker<'_>,
    kind: ExportKind,
    range: Option<DateRange>,
    out_dir: &Path,
    session_tabs_open: bool,
) -> Result<ExportOutcome> {
    if session_tabs_open {
        return Err(anyhow!(
            "Cannot export while session tabs are open. Close them before exporting."
        ));
    }

    let (content, record_count) = match kind {
        ExportKind::Profiles => {
            let profiles = SessionCache::new(store).saved_profiles()?;
            if profiles.is_empty() {
                return Err(anyhow!("No saved profiles found to export"));
            }
            let profiles = filter_by_date_range(profiles, range.as_ref(), |p| Some(p.captured_at));
            if profiles.is_empty() {
                return Err(anyhow!("No profiles found in the specified date range"));
            }
            (profiles_to_csv(&profiles), profiles.len())
        }
        ExportKind::Applications => {
            let applications = tracker.applications()?;
            if applications.is_empty() {
                return Err(anyhow!("No job applications found to export"));
            }
            let applications = filter_by_date_range(applications, range.as_ref(), |a| a.applied_date);
            if applications.is_empty() {
                return Err(anyhow!("No applications found in the specified date range"));
            }
            (applications_to_csv(&applications), applications.len())
        }
    };

    let now = Utc::now();
    let filename = export_filename(kind, range.as_ref(), now);
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let path = out_dir.join(&filename);
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    tracker.record_export(ExportRecord {
        kind,
        record_count,
        filename: filename.clone(),
        date_range: range,
        timestamp: now,
    })?;
    info!("Exported {} records to {}", record_count, path.display());

    Ok(ExportOutcome {
        record_count,
        filename,
        path,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecruiterStats {
    pub total_profiles: usize,
    pub last_saved: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TalentStats {
    pub total_applications: usize,
    pub submitted: usize,
    pub pending: usize,
    pub last_saved: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStats {
    pub total_exports: usize,
    pub last_export: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataStats {
    pub recruiter: RecruiterStats,
    pub talent: TalentStats,
    pub exports: ExportStats,
}

pub fn data_stats(store: &dyn Store, tracker: &Tracker<'_>) -> Result<DataStats> {
    let profiles = SessionCache::new(store).saved_profiles()?;
    let applications = tracker.applications()?;
    let history = tracker.export_history()?;
    let submitted = applications.iter().filter(|a| a.submitted).count();

    Ok(DataStats {
        recruiter: RecruiterStats {
            total_profiles: profiles.len(),
            last_saved: profiles.first().map(|p| p.updated_at),
        },
        talent: TalentStats {
            total_applications: applications.len(),
            submitted,
            pending: applications.len() - submitted,
            last_saved: applications.first().and_then(|a| a.applied_date),
        },
        exports: ExportStats {
            total_exports: history.len(),
            last_export: history.first().map(|h| h.timestamp),
        },
    })
}
