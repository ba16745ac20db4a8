use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Answers to "how did you hear about us" are drawn from here.
    pub referral_sources: Vec<String>,
    pub sync: SyncSettings,
    pub limits: Limits,
    pub browser: BrowserSettings,
    pub patterns: PatternSettings,
    /// Default answers for recurring application questions, keyed by field type.
    pub answers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub api_endpoint: String,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub clear_after_send: bool,
    pub session_domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_skills: usize,
    pub max_profile_skills: usize,
    pub max_experience: usize,
    pub max_certifications: usize,
    pub max_applications: usize,
    pub max_export_history: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub page_load_wait_ms: u64,
    pub highlight_color: String,
    pub highlight_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSettings {
    /// Replaces the built-in field pattern table.
    pub path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let answers = [
            ("legallyAuthorized", "Yes"),
            ("requireSponsorship", "No"),
            ("currentlyInUS", "Yes"),
            ("affirmTruthfulness", "Yes"),
            (
                "sponsorshipDetails",
                "I am authorized to work in the United States and do not require sponsorship",
            ),
            ("references", "Available upon request"),
            ("availability", "Immediate"),
        ];
        let referral_sources = [
            "LinkedIn",
            "Indeed",
            "Company Website",
            "Referral",
            "Job Board",
            "Google Search",
            "Recruiter",
        ];
        Self {
            referral_sources: referral_sources.iter().map(|s| s.to_string()).collect(),
            sync: SyncSettings::default(),
            limits: Limits::default(),
            browser: BrowserSettings::default(),
            patterns: PatternSettings::default(),
            answers: answers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_endpoint: "https://plugin.unnanu.com/api/profiles".to_string(),
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_secs: 30,
            clear_after_send: true,
            session_domain: "linkedin.com".to_string(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_skills: 50,
            max_profile_skills: 20,
            max_experience: 10,
            max_certifications: 10,
            max_applications: 50,
            max_export_history: 50,
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            page_load_wait_ms: 3000,
            highlight_color: "#d4edda".to_string(),
            highlight_ms: 1500,
        }
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        match directories::ProjectDirs::from("", "", "autofill") {
            Some(dirs) => dirs.config_dir().join("config.toml"),
            None => PathBuf::from("autofill.toml"),
        }
    }

    /// Loads `path`, or the default location when `None`. A missing default
    /// file yields the defaults; a missing explicit file is an error.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if !path.exists() => Err(ConfigError::NotFound(path.display().to_string())),
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    pub fn load_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.to_string(),
        };
        if self.sync.retry_attempts == 0 {
            return Err(invalid("sync.retry_attempts", "must be at least 1"));
        }
        if self.sync.api_endpoint.trim().is_empty() {
            return Err(invalid("sync.api_endpoint", "must not be empty"));
        }
        if self.limits.max_applications == 0 {
            return Err(invalid("limits.max_applications", "must be at least 1"));
        }
        Ok(())
    }

    /// Writes the current settings as TOML, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_defaults() {
        let settings = Settings::load_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.sync.retry_attempts, 3);
        assert_eq!(settings.sync.retry_delay_ms, 2000);
        assert_eq!(settings.limits.max_applications, 50);
        assert_eq!(settings.browser.highlight_color, "#d4edda");
        assert_eq!(settings.answers["legallyAuthorized"], "Yes");
        assert!(!settings.answers.contains_key("veteranStatus"));
        assert_eq!(settings.referral_sources.len(), 7);
    }

    #[test]
    fn test_partial_override() {
        let settings = Settings::load_str(
            r#"
            referral_sources = ["Friend"]

            [sync]
            retry_attempts = 5
            api_endpoint = "http://localhost:9000/profiles"

            [limits]
            max_skills = 10

            [answers]
            veteranStatus = "decline"
            "#,
        )
        .unwrap();
        assert_eq!(settings.sync.retry_attempts, 5);
        assert_eq!(settings.sync.retry_delay_ms, 2000);
        assert_eq!(settings.sync.api_endpoint, "http://localhost:9000/profiles");
        assert_eq!(settings.limits.max_skills, 10);
        assert_eq!(settings.limits.max_profile_skills, 20);
        assert_eq!(settings.referral_sources, ["Friend"]);
        assert_eq!(settings.answers.len(), 1);
        assert_eq!(settings.answers["veteranStatus"], "decline");
    }

    #[test]
    fn test_invalid_values() {
        let err = Settings::load_str("[sync]\nretry_attempts = 0").unwrap_err();
        assert!(err.to_string().contains("sync.retry_attempts"));
        assert!(matches!(
            Settings::load_str("[sync]\nretry_attempts = \"three\""),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_resolve_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(matches!(Settings::resolve(Some(&path)), Err(ConfigError::NotFound(_))));

        let mut settings = Settings::default();
        settings.patterns.path = Some(PathBuf::from("/etc/autofill/fields.toml"));
        settings.write(&path).unwrap();
        let back = Settings::resolve(Some(&path)).unwrap();
        assert_eq!(back, settings);
    }
}
