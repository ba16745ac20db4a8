use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use tracing::{debug, info};

use crate::models::Profile;
use crate::resume::ParsedResume;
use crate::store::{self, keys, Store};

/// Owns the stored profile. Everything else borrows a `&Profile` from here.
pub struct ProfileRepository<'a> {
    store: &'a dyn Store,
    skill_cap: usize,
}

impl<'a> ProfileRepository<'a> {
    pub fn new(store: &'a dyn Store, skill_cap: usize) -> Self {
        Self { store, skill_cap }
    }

    /// The stored profile, or an empty one before anything was saved.
    pub fn get(&self) -> Result<Profile> {
        let mut profile = self
            .store
            .get(keys::PROFILE)?
            .map(Profile::from_stored)
            .unwrap_or_default();
        profile.normalize(self.skill_cap);
        Ok(profile)
    }

    pub fn save(&self, profile: &Profile) -> Result<()> {
        store::save(self.store, keys::PROFILE, profile)
    }

    /// Overlays the keys of a JSON object onto the stored profile.
    pub fn patch(&self, changes: &Value) -> Result<Profile> {
        let Value::Object(changes) = changes else {
            return Err(anyhow!("Profile update must be a JSON object"));
        };
        let mut current = serde_json::to_value(self.get()?)?;
        if let Value::Object(fields) = &mut current {
            for (key, value) in changes {
                fields.insert(key.clone(), value.clone());
            }
        }
        let mut profile: Profile = serde_json::from_value(current).context("Invalid profile update")?;
        profile.normalize(self.skill_cap);
        self.save(&profile)?;
        debug!("Patched profile fields: {:?}", changes.keys().collect::<Vec<_>>());
        Ok(profile)
    }

    pub fn set_field(&self, field: &str, value: &str) -> Result<Profile> {
        let mut profile = self.get()?;
        if field == "skills" {
            profile.clear_skills();
            for skill in value.split(',') {
                profile.add_skill(skill, self.skill_cap);
            }
        } else {
            profile.set_field(field, value)?;
        }
        self.save(&profile)?;
        Ok(profile)
    }

    /// Stores an answer for a recurring question. An empty value removes it.
    pub fn set_answer(&self, key: &str, value: &str) -> Result<Profile> {
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!("Answer key must not be empty"));
        }
        let mut profile = self.get()?;
        if value.trim().is_empty() {
            profile.answers.remove(key);
        } else {
            profile.answers.insert(key.to_string(), value.trim().to_string());
        }
        self.save(&profile)?;
        Ok(profile)
    }

    pub fn import_resume(&self, parsed: &ParsedResume) -> Result<Profile> {
        let mut profile = self.get()?;
        merge_resume(&mut profile, parsed, self.skill_cap);
        self.save(&profile)?;
        info!("Imported resume into profile: {}", profile.display_name());
        Ok(profile)
    }
}

/// Non-empty scalars overwrite, skills are merged up to `skill_cap`, and
/// lists are replaced only when the resume has entries.
pub fn merge_resume(profile: &mut Profile, parsed: &ParsedResume, skill_cap: usize) {
    fn overwrite(target: &mut String, value: &str) {
        if !value.trim().is_empty() {
            *target = value.trim().to_string();
        }
    }

    overwrite(&mut profile.first_name, &parsed.first_name);
    overwrite(&mut profile.last_name, &parsed.last_name);
    overwrite(&mut profile.full_name, &parsed.full_name);
    overwrite(&mut profile.email, &parsed.email);
    overwrite(&mut profile.linked_in_url, &parsed.linked_in_url);
    overwrite(&mut profile.github_url, &parsed.github_url);
    overwrite(&mut profile.website_url, &parsed.website_url);
    overwrite(&mut profile.address1, &parsed.address1);
    overwrite(&mut profile.city, &parsed.city);
    overwrite(&mut profile.zip_code, &parsed.zip_code);
    overwrite(&mut profile.summary, &parsed.summary);
    if let Some(phone) = &parsed.phone {
        profile.phone = Some(phone.clone());
    }
    if !parsed.state.is_empty() {
        profile.set_state(&parsed.state);
    }
    if parsed.years_of_experience > 0 {
        profile.years_of_experience = parsed.years_of_experience;
    }

    for skill in &parsed.skills {
        profile.add_skill(skill, skill_cap);
    }
    if !parsed.experience.is_empty() {
        profile.experience = parsed.experience.clone();
    }
    if !parsed.education.is_empty() {
        profile.education = parsed.education.clone();
    }
    if !parsed.certifications.is_empty() {
        profile.certifications = parsed.certifications.clone();
    }
    if !parsed.languages.is_empty() {
        profile.languages = parsed.languages.clone();
    }
}
