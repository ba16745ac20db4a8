mod autofill;
mod browser;
mod classifier;
mod config;
mod export;
mod extract;
mod linkedin;
mod models;
mod patterns;
mod phone;
mod repository;
mod resolver;
mod resume;
mod rpc;
mod scanner;
mod session;
mod states;
mod store;
mod tracking;
mod upload;
mod writeback;

use anyhow::{anyhow, Context, Result};
use autofill::{AutoFiller, FieldStatus, FillSummary};
use browser::BrowserSession;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use classifier::Classifier;
use config::Settings;
use export::{DateRange, ExportKind};
use models::Profile;
use patterns::PatternTable;
use repository::ProfileRepository;
use resolver::Resolver;
use resume::ResumeParser;
use scraper::Html;
use session::SessionCache;
use std::path::{Path, PathBuf};
use store::{SqliteStore, Store};
use tracing_subscriber::EnvFilter;
use tracking::Tracker;
use upload::HttpUploader;

#[derive(Parser)]
#[command(name = "autofill")]
#[command(about = "Fill job application forms from a stored profile and track what was sent")]
struct Cli {
    /// Path to config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store and write a default config file
    Init,

    /// View and edit the stored profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Detect fillable fields on a saved page or URL
    Scan {
        /// HTML file or http(s) URL
        source: String,

        /// Page URL to record when scanning a file
        #[arg(long)]
        url: Option<String>,
    },

    /// Open a page in the browser and fill its application form
    Fill {
        /// Application page URL
        url: String,

        /// Show what would be filled without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Cache a LinkedIn profile page for the next upload
    Capture {
        /// Saved HTML file or profile URL
        source: String,

        /// Profile URL to record when capturing from a file
        #[arg(long)]
        url: Option<String>,
    },

    /// Inspect the session cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Send cached profiles to the configured endpoint
    Upload {
        /// Keep profiles in the cache after a successful send
        #[arg(long)]
        keep: bool,
    },

    /// Write a CSV export
    Export {
        /// What to export
        #[arg(value_enum)]
        kind: ExportTarget,

        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Tracked job applications
    Applications {
        #[command(subcommand)]
        command: ApplicationCommands,
    },

    /// Show totals for saved profiles, applications and exports
    Stats,

    /// Show past exports
    History {
        /// Forget the recorded export history
        #[arg(long)]
        clear: bool,
    },

    /// Serve JSON-lines requests on stdin/stdout
    Rpc,
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Print the stored profile
    Show,

    /// Set a profile field (camelCase name, e.g. firstName, phone, state, skills)
    Set {
        field: String,
        value: String,
    },

    /// Store an answer for a recurring question (e.g. veteranStatus decline)
    Answer {
        key: String,
        value: String,
    },

    /// Parse a resume (.txt, .pdf, .docx) into the profile
    Import {
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show the session summary
    Stats,

    /// List cached profiles
    List,

    /// Empty the session cache
    Clear,

    /// Dump the session cache as JSON
    Json {
        /// Dump every stored document instead
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum ApplicationCommands {
    /// List tracked applications, newest first
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportTarget {
    Profiles,
    Applications,
}

impl From<ExportTarget> for ExportKind {
    fn from(target: ExportTarget) -> Self {
        match target {
            ExportTarget::Profiles => ExportKind::Profiles,
            ExportTarget::Applications => ExportKind::Applications,
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autofill=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Reads a page from disk or over HTTP. Returns the HTML and its URL.
fn read_page(source: &str, url: Option<String>) -> Result<(String, String)> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let html = reqwest::blocking::get(source)
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .with_context(|| format!("Failed to fetch {}", source))?;
        return Ok((html, url.unwrap_or_else(|| source.to_string())));
    }
    let path = Path::new(source);
    let html = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let url = match url {
        Some(url) => url,
        None => {
            let absolute = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            format!("file://{}", absolute.display())
        }
    };
    Ok((html, url))
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = match (&cli.command, cli.config.as_deref()) {
        (Commands::Init, Some(path)) if !path.exists() => Settings::default(),
        (_, path) => Settings::resolve(path)?,
    };
    let store = SqliteStore::open()?;

    if !matches!(cli.command, Commands::Init) {
        store.ensure_initialized()?;
    }
    let table = PatternTable::load_or_builtin(settings.patterns.path.as_deref())?;
    let limits = &settings.limits;
    let tracker = Tracker::new(&store, limits.max_applications, limits.max_export_history);
    let cache = SessionCache::new(&store);
    let profiles = ProfileRepository::new(&store, limits.max_skills);

    match cli.command {
        Commands::Init => {
            store.init()?;
            println!("Store initialized at {}", store.path().display());
            let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);
            if config_path.exists() {
                println!("Using existing config at {}", config_path.display());
            } else {
                settings.write(&config_path)?;
                println!("Default config written to {}", config_path.display());
            }
        }

        Commands::Profile { command } => match command {
            ProfileCommands::Show => print_profile(&profiles.get()?),

            ProfileCommands::Set { field, value } => {
                profiles.set_field(&field, &value)?;
                println!("Set {}.", field);
            }

            ProfileCommands::Answer { key, value } => {
                profiles.set_answer(&key, &value)?;
                if value.trim().is_empty() {
                    println!("Removed answer '{}'.", key);
                } else {
                    println!("Answer '{}' set to '{}'.", key, value.trim());
                }
            }

            ProfileCommands::Import { file } => {
                let text = extract::extract_file(&file)?;
                if text.trim().is_empty() {
                    return Err(anyhow!("No text could be extracted from {}", file.display()));
                }
                let parser = ResumeParser::new(limits.max_skills, limits.max_experience, limits.max_certifications)?;
                let parsed = parser.parse(&text);
                let mut profile = profiles.import_resume(&parsed)?;
                if profile.resume_path.is_none() {
                    profile.resume_path = Some(file.canonicalize().unwrap_or(file.clone()));
                    profiles.save(&profile)?;
                }
                println!("Imported {}:", file.display());
                println!("  Name:        {}", parsed.full_name);
                println!("  Email:       {}", parsed.email);
                println!("  Skills:      {}", parsed.skills.len());
                println!("  Positions:   {}", parsed.experience.len());
                println!("  Experience:  {} years", parsed.years_of_experience);
            }
        },

        Commands::Scan { source, url } => {
            let (html, url) = read_page(&source, url)?;
            let document = Html::parse_document(&html);
            let classifier = Classifier::new(&table);
            let resolver = Resolver::new(&table, &settings.answers, &settings.referral_sources);
            let filler = AutoFiller::new(&classifier, resolver, &tracker);
            let page = filler.scan_page(&document, &url)?;

            println!("{} at {}", page.job.title, page.job.company);
            println!("{:<22} {:<8} {:<4} {:<30} {:<20}", "FIELD", "SOURCE", "REQ", "LABEL", "ELEMENT");
            println!("{}", "-".repeat(88));
            for binding in &page.bindings {
                println!(
                    "{:<22} {:<8} {:<4} {:<30} {:<20}",
                    binding.field_type.as_str(),
                    format!("{:?}", binding.source).to_lowercase(),
                    if binding.required { "*" } else { "" },
                    truncate(&binding.raw_label, 28),
                    truncate(&writeback::describe(&binding.element), 18)
                );
            }
            if !page.unclassified.is_empty() {
                println!("\nUnrecognized ({}): {}", page.unclassified.len(), page.unclassified.join(", "));
            }
            if !page.job.questions.is_empty() {
                println!("\nQuestions:");
                for question in &page.job.questions {
                    let marker = if question.required { " *" } else { "" };
                    println!("  {}{}", question.text, marker);
                }
            }
        }

        Commands::Fill { url, dry_run } => {
            let profile = profiles.get()?;
            let mut session = BrowserSession::connect(&settings.browser)?;
            let classifier = Classifier::new(&table);
            let resolver = Resolver::new(&table, &settings.answers, &settings.referral_sources);
            let filler = AutoFiller::new(&classifier, resolver, &tracker);

            let result = (|| -> Result<FillSummary> {
                let html = session.open(&url)?;
                let page_url = session.current_url()?;
                let document = Html::parse_document(&html);
                let page = filler.scan_page(&document, &page_url)?;
                filler.fill(&mut session, &page, &profile, dry_run)
            })();
            session.quit()?;
            print_summary(&result?, dry_run);
        }

        Commands::Capture { source, url } => {
            let (html, url) = if source.starts_with("http://") || source.starts_with("https://") {
                let session = BrowserSession::connect(&settings.browser)?;
                let html = session.open(&source)?;
                let url = session.current_url()?;
                session.quit()?;
                (html, url)
            } else {
                let url = url.ok_or_else(|| anyhow!("--url is required when capturing from a file"))?;
                read_page(&source, Some(url))?
            };
            let document = Html::parse_document(&html);
            let captured = linkedin::scrape_profile(&document, &url, limits.max_profile_skills)?;
            let name = captured.profile.display_name();
            let session = cache.save_profile(captured)?;
            println!("Cached {} ({} profiles in session).", name, session.profile_count);
        }

        Commands::Cache { command } => match command {
            CacheCommands::Stats => {
                let stats = cache.stats()?;
                println!("Profiles:      {}", stats.profile_count);
                println!("Session start: {}", format_time(stats.session_start));
                println!("Last update:   {}", format_time(stats.last_update));
            }

            CacheCommands::List => {
                let stats = cache.stats()?;
                if stats.profiles.is_empty() {
                    println!("Session cache is empty.");
                } else {
                    println!("{:<25} {:<45} {:<20}", "NAME", "URL", "CAPTURED");
                    println!("{}", "-".repeat(90));
                    for entry in stats.profiles {
                        println!(
                            "{:<25} {:<45} {:<20}",
                            truncate(&entry.name, 23),
                            truncate(&entry.url, 43),
                            entry.captured_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
            }

            CacheCommands::Clear => {
                cache.clear()?;
                println!("Session cache cleared.");
            }

            CacheCommands::Json { all: false } => {
                println!("{}", serde_json::to_string_pretty(&cache.load()?)?);
            }

            CacheCommands::Json { all: true } => {
                let mut documents = serde_json::Map::new();
                for key in store.keys()? {
                    if let Some(value) = store.get(&key)? {
                        documents.insert(key, value);
                    }
                }
                println!("{}", serde_json::to_string_pretty(&documents)?);
            }
        },

        Commands::Upload { keep } => {
            let mut sync = settings.sync.clone();
            if keep {
                sync.clear_after_send = false;
            }
            let uploader = HttpUploader::new(&sync)?;
            let report = upload::upload_session(&uploader, &cache, &sync)?;
            println!("{}", report.message);
            if !report.success {
                return Err(anyhow!("Upload failed"));
            }
        }

        Commands::Export { kind, from, to, out } => {
            let outcome = export::export(&store, &tracker, kind.into(), DateRange::new(from, to), &out, false)?;
            println!("Exported {} records to {}", outcome.record_count, outcome.path.display());
        }

        Commands::Applications { command } => match command {
            ApplicationCommands::List => {
                let applications = tracker.applications()?;
                if applications.is_empty() {
                    println!("No applications tracked.");
                } else {
                    println!("{:<9} {:>6} {:<30} {:<20} {:<16}", "STATUS", "FILLED", "TITLE", "COMPANY", "APPLIED");
                    println!("{}", "-".repeat(85));
                    for app in applications {
                        println!(
                            "{:<9} {:>6} {:<30} {:<20} {:<16}",
                            app.status,
                            format!("{}/{}", app.fields_filled, app.fields_detected),
                            truncate(&app.title, 28),
                            truncate(&app.company, 18),
                            format_time(app.applied_date)
                        );
                    }
                }
            }
        },

        Commands::Stats => {
            let stats = export::data_stats(&store, &tracker)?;
            println!("Saved profiles:   {}", stats.recruiter.total_profiles);
            println!("  Last saved:     {}", format_time(stats.recruiter.last_saved));
            println!("Applications:     {}", stats.talent.total_applications);
            println!("  Submitted:      {}", stats.talent.submitted);
            println!("  Pending:        {}", stats.talent.pending);
            println!("  Last saved:     {}", format_time(stats.talent.last_saved));
            println!("Exports:          {}", stats.exports.total_exports);
            println!("  Last export:    {}", format_time(stats.exports.last_export));

            let documents = store.updated_at()?;
            if !documents.is_empty() {
                println!("\nStored documents ({}):", store.path().display());
                for (key, updated) in documents {
                    println!("  {:<18} {}", key, updated);
                }
            }
        }

        Commands::History { clear: true } => {
            tracker.clear_export_history()?;
            println!("Export history cleared.");
        }

        Commands::History { clear: false } => {
            let history = tracker.export_history()?;
            if history.is_empty() {
                println!("No exports yet.");
            } else {
                println!("{:<20} {:<12} {:>7} {:<50}", "WHEN", "KIND", "RECORDS", "FILE");
                println!("{}", "-".repeat(92));
                for record in history {
                    let kind = match record.kind {
                        ExportKind::Profiles => "profiles",
                        ExportKind::Applications => "applications",
                    };
                    println!(
                        "{:<20} {:<12} {:>7} {:<50}",
                        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        kind,
                        record.record_count,
                        truncate(&record.filename, 48)
                    );
                }
            }
        }

        Commands::Rpc => {
            let uploader = HttpUploader::new(&settings.sync)?;
            let out_dir = std::env::current_dir().context("Failed to read current directory")?;
            let mut server = rpc::RpcServer::new(&store, &settings, &table, &uploader, out_dir);
            let stdin = std::io::stdin();
            server.serve(stdin.lock(), std::io::stdout().lock())?;
        }
    }

    Ok(())
}

fn print_profile(profile: &Profile) {
    let or_dash = |s: &str| if s.trim().is_empty() { "-".to_string() } else { s.to_string() };
    println!("Name:       {}", or_dash(&profile.display_name()));
    println!("Email:      {}", or_dash(&profile.email));
    println!(
        "Phone:      {}",
        profile.phone.as_ref().map(|p| p.parenthesized()).unwrap_or_else(|| "-".to_string())
    );
    let place = [profile.city.as_str(), profile.state(), profile.zip_code.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    println!("Location:   {}", or_dash(&place));
    println!("LinkedIn:   {}", or_dash(&profile.linked_in_url));
    println!("GitHub:     {}", or_dash(&profile.github_url));
    println!("Website:    {}", or_dash(&profile.website_url));
    println!("Experience: {} years", profile.years_of_experience);
    if let Some(path) = &profile.resume_path {
        println!("Resume:     {}", path.display());
    }
    if !profile.skills().is_empty() {
        println!("Skills:     {}", profile.skills().join(", "));
    }
    if !profile.experience.is_empty() {
        println!("\nPositions:");
        for job in &profile.experience {
            println!("  {} at {} ({})", job.title, job.company, or_dash(&job.duration));
        }
    }
    if !profile.education.is_empty() {
        println!("\nEducation:");
        for school in &profile.education {
            println!("  {} {} {}", school.degree, school.school, school.years);
        }
    }
    if !profile.summary.is_empty() {
        println!("\nSummary:");
        for line in textwrap::fill(&profile.summary, 70).lines() {
            println!("  {}", line);
        }
    }
    if !profile.answers.is_empty() {
        println!("\nAnswers:");
        for (key, value) in &profile.answers {
            println!("  {:<24} {}", key, value);
        }
    }
}

fn print_summary(summary: &FillSummary, dry_run: bool) {
    println!("{:<8} {:<22} {:<30} {:<25}", "STATUS", "FIELD", "LABEL", "VALUE");
    println!("{}", "-".repeat(88));
    for field in &summary.fields {
        let status = match field.status {
            FieldStatus::Filled => "filled",
            FieldStatus::Planned => "would",
            FieldStatus::Skipped => "skipped",
            FieldStatus::Failed => "FAILED",
        };
        println!(
            "{:<8} {:<22} {:<30} {:<25}",
            status,
            field.field_type.as_str(),
            truncate(&field.label, 28),
            truncate(field.value.as_deref().unwrap_or("-"), 23)
        );
    }
    if dry_run {
        println!("\n{} fields detected (dry run - nothing was written)", summary.detected);
    } else {
        println!(
            "\nFilled {}/{} fields ({} skipped, {} failed)",
            summary.filled,
            summary.detected,
            summary.skipped,
            summary.failed.len()
        );
    }
    for failure in &summary.failed {
        println!("  {}: {}", failure.element, failure.error.as_deref().unwrap_or("unknown error"));
    }
}

fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
