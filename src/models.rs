use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

use crate::phone::Phone;
use crate::states;

/// The canonical person record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub preferred_name: String,

    pub email: String,
    #[serde(deserialize_with = "lenient_phone")]
    pub phone: Option<Phone>,
    pub phone_country_code: String,

    pub address1: String,
    pub address2: String,
    pub city: String,
    state: String,
    state_full: String,
    pub zip_code: String,
    pub country: String,

    pub headline: String,
    pub location: String,
    pub profile_image_url: String,
    pub connections: String,
    pub followers: String,

    pub linked_in_url: String,
    pub github_url: String,
    pub website_url: String,
    pub portfolio_urls: Vec<String>,

    pub experience: Vec<Experience>,
    pub education: Vec<Education>,
    skills: Vec<String>,
    pub certifications: Vec<Certification>,
    pub languages: Vec<Language>,

    pub years_of_experience: u32,
    pub summary: String,
    pub cover_letter_text: String,
    pub resume_path: Option<PathBuf>,

    /// Answers to recurring application questions, keyed by field type name.
    pub answers: BTreeMap<String, String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            full_name: String::new(),
            preferred_name: String::new(),
            email: String::new(),
            phone: None,
            phone_country_code: "+1".to_string(),
            address1: String::new(),
            address2: String::new(),
            city: String::new(),
            state: String::new(),
            state_full: String::new(),
            zip_code: String::new(),
            country: String::new(),
            headline: String::new(),
            location: String::new(),
            profile_image_url: String::new(),
            connections: String::new(),
            followers: String::new(),
            linked_in_url: String::new(),
            github_url: String::new(),
            website_url: String::new(),
            portfolio_urls: Vec::new(),
            experience: Vec::new(),
            education: Vec::new(),
            skills: Vec::new(),
            certifications: Vec::new(),
            languages: Vec::new(),
            years_of_experience: 0,
            summary: String::new(),
            cover_letter_text: String::new(),
            resume_path: None,
            answers: BTreeMap::new(),
        }
    }
}

impl Profile {
    /// Two-letter state code.
    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn state_full(&self) -> &str {
        &self.state_full
    }

    /// Accepts a code or a full name and keeps both forms in step.
    /// Input outside the table is stored verbatim in both.
    pub fn set_state(&mut self, input: &str) {
        let input = input.trim();
        match states::normalize(input) {
            Some((code, name)) => {
                self.state = code.to_string();
                self.state_full = name.to_string();
            }
            None => {
                self.state = input.to_string();
                self.state_full = input.to_string();
            }
        }
    }

    pub fn skills(&self) -> &[String] {
        &self.skills
    }

    /// Adds a skill unless it is blank, already present (ignoring case),
    /// or the list is at `cap`. Returns whether it was added.
    pub fn add_skill(&mut self, skill: &str, cap: usize) -> bool {
        let skill = skill.trim();
        if skill.is_empty() || self.skills.len() >= cap {
            return false;
        }
        if self.skills.iter().any(|s| s.eq_ignore_ascii_case(skill)) {
            return false;
        }
        self.skills.push(skill.to_string());
        true
    }

    pub fn clear_skills(&mut self) {
        self.skills.clear();
    }

    pub fn display_name(&self) -> String {
        if !self.full_name.trim().is_empty() {
            return self.full_name.trim().to_string();
        }
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn current_job_title(&self) -> &str {
        self.experience.first().map(|e| e.title.as_str()).unwrap_or("")
    }

    pub fn current_company(&self) -> &str {
        self.experience.first().map(|e| e.company.as_str()).unwrap_or("")
    }

    /// Reads a stored profile, coercing fields that no longer fit instead of
    /// rejecting the document. A single object in a list field becomes a
    /// one-element list, numbers and booleans in text fields become text,
    /// list entries of the wrong shape are dropped, and anything else that
    /// does not fit falls back to its default.
    pub fn from_stored(value: Value) -> Self {
        let Value::Object(stored) = value else {
            warn!("Stored profile is not an object; starting from an empty one");
            return Self::default();
        };
        if let Ok(profile) = serde_json::from_value(Value::Object(stored.clone())) {
            return profile;
        }

        let Ok(Value::Object(mut fields)) = serde_json::to_value(Self::default()) else {
            return Self::default();
        };
        let fits = |fields: &serde_json::Map<String, Value>| {
            serde_json::from_value::<Self>(Value::Object(fields.clone())).is_ok()
        };
        for (key, raw) in stored {
            let Some(default) = fields.get(&key).cloned() else {
                continue;
            };
            let coerced = match (&default, raw) {
                (Value::Array(_), Value::Array(items)) => Value::Array(
                    items
                        .into_iter()
                        .filter(|item| {
                            let mut single = fields.clone();
                            single.insert(key.clone(), Value::Array(vec![item.clone()]));
                            fits(&single)
                        })
                        .collect(),
                ),
                (Value::Array(_), item @ Value::Object(_)) => Value::Array(vec![item]),
                (Value::Array(_), _) => Value::Array(Vec::new()),
                (Value::String(_), Value::Number(n)) => Value::String(n.to_string()),
                (Value::String(_), Value::Bool(b)) => Value::String(b.to_string()),
                (_, raw) => raw,
            };
            let previous = fields.insert(key.clone(), coerced);
            if !fits(&fields) {
                warn!("Stored profile field '{}' has an unexpected shape; using its default", key);
                if let Some(previous) = previous {
                    fields.insert(key, previous);
                }
            }
        }
        serde_json::from_value(Value::Object(fields)).unwrap_or_default()
    }

    /// Re-derives the state pair and de-duplicates skills after loading
    /// data written by other tools.
    pub fn normalize(&mut self, skill_cap: usize) {
        let state = if self.state.is_empty() {
            self.state_full.clone()
        } else {
            self.state.clone()
        };
        if !state.is_empty() {
            self.set_state(&state);
        }
        let skills = std::mem::take(&mut self.skills);
        for skill in &skills {
            self.add_skill(skill, skill_cap);
        }
    }

    /// Sets a scalar field by its camelCase name, as used by inline edits.
    pub fn set_field(&mut self, field: &str, value: &str) -> anyhow::Result<()> {
        let value = value.trim().to_string();
        match field {
            "firstName" => self.first_name = value,
            "lastName" => self.last_name = value,
            "fullName" => self.full_name = value,
            "preferredName" => self.preferred_name = value,
            "email" => self.email = value,
            "phone" => {
                self.phone = if value.is_empty() {
                    None
                } else {
                    Some(
                        Phone::parse(&value)
                            .ok_or_else(|| anyhow::anyhow!("Not a 10-digit phone number: {}", value))?,
                    )
                }
            }
            "phoneCountryCode" => self.phone_country_code = value,
            "address1" | "address" => self.address1 = value,
            "address2" => self.address2 = value,
            "city" => self.city = value,
            "state" | "stateFull" => self.set_state(&value),
            "zipCode" => self.zip_code = value,
            "country" => self.country = value,
            "headline" => self.headline = value,
            "location" => self.location = value,
            "linkedInUrl" | "linkedin" => self.linked_in_url = value,
            "githubUrl" | "github" => self.github_url = value,
            "websiteUrl" | "website" => self.website_url = value,
            "summary" => self.summary = value,
            "coverLetterText" => self.cover_letter_text = value,
            "yearsOfExperience" => {
                self.years_of_experience = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Not a number of years: {}", value))?
            }
            "resumePath" => {
                self.resume_path = if value.is_empty() { None } else { Some(PathBuf::from(value)) }
            }
            _ => {
                return Err(match closest_field(field) {
                    Some(known) => anyhow::anyhow!("Unknown profile field: {} (did you mean {}?)", field, known),
                    None => anyhow::anyhow!("Unknown profile field: {}", field),
                });
            }
        }
        Ok(())
    }
}

const SETTABLE_FIELDS: &[&str] = &[
    "firstName",
    "lastName",
    "fullName",
    "preferredName",
    "email",
    "phone",
    "phoneCountryCode",
    "address1",
    "address2",
    "city",
    "state",
    "zipCode",
    "country",
    "headline",
    "location",
    "linkedInUrl",
    "githubUrl",
    "websiteUrl",
    "summary",
    "coverLetterText",
    "yearsOfExperience",
    "resumePath",
];

fn closest_field(field: &str) -> Option<&'static str> {
    SETTABLE_FIELDS
        .iter()
        .map(|known| (*known, strsim::jaro_winkler(&field.to_lowercase(), &known.to_lowercase())))
        .filter(|(_, score)| *score >= 0.85)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(known, _)| known)
}

fn lenient_phone<'de, D>(deserializer: D) -> Result<Option<Phone>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => Phone::parse(&s),
        Some(Value::Number(n)) => Phone::parse(&n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Experience {
    pub title: String,
    pub company: String,
    #[serde(alias = "dates")]
    pub duration: String,
    pub location: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Education {
    pub school: String,
    pub degree: String,
    pub discipline: String,
    #[serde(alias = "year")]
    pub years: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Certification {
    pub name: String,
    pub full_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Language {
    pub language: String,
    pub proficiency: String,
}

/// A session cache entry, keyed by `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedProfile {
    pub url: String,
    #[serde(flatten)]
    pub profile: Profile,
    pub captured_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "linkedin".to_string()
}

impl CapturedProfile {
    pub fn new(url: &str, profile: Profile, source: &str) -> Self {
        let now = Utc::now();
        Self {
            url: url.to_string(),
            profile,
            captured_at: now,
            updated_at: now,
            source: source.to_string(),
        }
    }
}

/// A question found on an application form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationQuestion {
    pub text: String,
    pub input_type: String,
    pub required: bool,
    pub id: String,
    pub index: usize,
}

/// Job metadata extracted from an application page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobPosting {
    pub url: String,
    pub domain: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub description: String,
    pub questions: Vec<ApplicationQuestion>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Detected,
    Filled,
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationStatus::Detected => f.write_str("detected"),
            ApplicationStatus::Filled => f.write_str("filled"),
        }
    }
}

/// An entry in the job-application tracking cache, keyed by `url`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackedApplication {
    pub url: String,
    pub domain: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: String,
    pub description: String,
    pub status: ApplicationStatus,
    pub fields_detected: usize,
    pub fields_filled: usize,
    pub applied_date: Option<DateTime<Utc>>,
    pub last_filled: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,

    pub submitted: bool,
    pub requirements: String,
    pub job_type: String,
    pub work_mode: String,
    pub experience_level: String,
    pub department: String,
    pub notes: String,
    pub contact_name: String,
    pub contact_email: String,
    pub resume_used: String,
    pub cover_letter: String,
    pub follow_up_date: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = Profile::default();
        assert_eq!(profile.phone_country_code, "+1");
        assert!(profile.phone.is_none());
        assert_eq!(profile.state(), "");
    }

    #[test]
    fn test_set_state_keeps_pair_consistent() {
        let mut profile = Profile::default();
        profile.set_state("tx");
        assert_eq!((profile.state(), profile.state_full()), ("TX", "Texas"));
        profile.set_state("New Mexico");
        assert_eq!((profile.state(), profile.state_full()), ("NM", "New Mexico"));
        profile.set_state("Ontario");
        assert_eq!((profile.state(), profile.state_full()), ("Ontario", "Ontario"));
    }

    #[test]
    fn test_add_skill_dedups_and_caps() {
        let mut profile = Profile::default();
        assert!(profile.add_skill("Rust", 3));
        assert!(!profile.add_skill("rust", 3));
        assert!(!profile.add_skill("  ", 3));
        assert!(profile.add_skill("SQL", 3));
        assert!(profile.add_skill("Go", 3));
        assert!(!profile.add_skill("Python", 3));
        assert_eq!(profile.skills(), ["Rust", "SQL", "Go"]);
    }

    #[test]
    fn test_deserializes_loose_json() {
        let json = r#"{
            "firstName": "Ada",
            "phone": "(575) 555-0323",
            "stateFull": "Texas",
            "skills": ["Rust", "RUST", "Go"],
            "experience": [{"title": "Engineer", "company": "Acme", "dates": "2019 - Present"}],
            "unknownKey": 1
        }"#;
        let mut profile: Profile = serde_json::from_str(json).unwrap();
        profile.normalize(50);
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(profile.phone.as_ref().unwrap().raw(), "5755550323");
        assert_eq!(profile.state(), "TX");
        assert_eq!(profile.skills(), ["Rust", "Go"]);
        assert_eq!(profile.experience[0].duration, "2019 - Present");
        assert_eq!(profile.current_company(), "Acme");
        assert_eq!(profile.phone_country_code, "+1");
    }

    #[test]
    fn test_bad_phone_is_dropped_on_load() {
        let profile: Profile = serde_json::from_str(r#"{"phone": "12"}"#).unwrap();
        assert!(profile.phone.is_none());
        let profile: Profile = serde_json::from_str(r#"{"phone": null}"#).unwrap();
        assert!(profile.phone.is_none());
        let profile: Profile = serde_json::from_str(r#"{"phone": 5755550323}"#).unwrap();
        assert_eq!(profile.phone.unwrap().dashed(), "575-555-0323");
    }

    #[test]
    fn test_from_stored_coerces_bad_fields() {
        let stored = serde_json::json!({
            "fullName": "Ada",
            "skills": "Rust",
            "experience": {"title": "Engineer", "company": "Acme"},
            "education": [{"school": "MIT"}, 42],
            "zipCode": 78730,
            "yearsOfExperience": "lots",
            "answers": ["yes"]
        });
        let profile = Profile::from_stored(stored);
        assert_eq!(profile.full_name, "Ada");
        assert!(profile.skills().is_empty());
        assert_eq!(profile.current_company(), "Acme");
        assert_eq!(profile.education.len(), 1);
        assert_eq!(profile.education[0].school, "MIT");
        assert_eq!(profile.zip_code, "78730");
        assert_eq!(profile.years_of_experience, 0);
        assert!(profile.answers.is_empty());

        assert_eq!(Profile::from_stored(serde_json::json!("junk")), Profile::default());
    }

    #[test]
    fn test_set_field() {
        let mut profile = Profile::default();
        profile.set_field("firstName", " Ada ").unwrap();
        profile.set_field("phone", "575.555.0323").unwrap();
        profile.set_field("state", "Texas").unwrap();
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(profile.phone.as_ref().unwrap().dashed(), "575-555-0323");
        assert_eq!(profile.state(), "TX");
        assert!(profile.set_field("phone", "123").is_err());
        assert!(profile.set_field("favouriteColour", "blue").is_err());
    }

    #[test]
    fn test_unknown_field_suggests_closest() {
        let mut profile = Profile::default();
        let err = profile.set_field("firstname", "Ada").unwrap_err();
        assert!(err.to_string().contains("did you mean firstName?"));
        assert_eq!(closest_field("qqqq"), None);
    }

    #[test]
    fn test_display_name_falls_back() {
        let mut profile = Profile::default();
        profile.first_name = "Ada".into();
        profile.last_name = "Lovelace".into();
        assert_eq!(profile.display_name(), "Ada Lovelace");
        profile.full_name = "Augusta Ada King".into();
        assert_eq!(profile.display_name(), "Augusta Ada King");
    }

    #[test]
    fn test_captured_profile_flattens() {
        let mut profile = Profile::default();
        profile.full_name = "Ada Lovelace".into();
        let captured = CapturedProfile::new("https://www.linkedin.com/in/ada", profile, "linkedin");
        let value = serde_json::to_value(&captured).unwrap();
        assert_eq!(value["fullName"], "Ada Lovelace");
        assert_eq!(value["url"], "https://www.linkedin.com/in/ada");
        let back: CapturedProfile = serde_json::from_value(value).unwrap();
        assert_eq!(back, captured);
    }
}
