use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

const BUILTIN_TABLE: &str = include_str!("patterns/fields.toml");

macro_rules! field_types {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Semantic type of a form control.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum FieldType {
            $(#[serde(rename = $name)] $variant),+
        }

        impl FieldType {
            pub const ALL: &'static [FieldType] = &[$(FieldType::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(FieldType::$variant => $name),+
                }
            }
        }
    };
}

field_types! {
    FirstName => "firstName",
    LastName => "lastName",
    FullName => "fullName",
    PreferredName => "preferredName",
    Email => "email",
    Phone => "phone",
    LinkedIn => "linkedIn",
    Address => "address",
    Address2 => "address2",
    City => "city",
    State => "state",
    ZipCode => "zipCode",
    Country => "country",
    CurrentLocation => "currentLocation",
    Skills => "skills",
    Experience => "experience",
    YearsOfExperience => "yearsOfExperience",
    Summary => "summary",
    Education => "education",
    School => "school",
    Degree => "degree",
    Discipline => "discipline",
    LocationCity => "locationCity",
    CurrentJobTitle => "currentJobTitle",
    CurrentCompany => "currentCompany",
    Github => "github",
    Twitter => "twitter",
    Portfolio => "portfolio",
    Certifications => "certifications",
    Languages => "languages",
    References => "references",
    Availability => "availability",
    Salary => "salary",
    LegallyAuthorized => "legallyAuthorized",
    RequireSponsorship => "requireSponsorship",
    WillingToRelocate => "willingToRelocate",
    RemoteWorkPreference => "remoteWorkPreference",
    RemoteExperience => "remoteExperience",
    AgencyExperience => "agencyExperience",
    StoryBrandExperience => "storyBrandExperience",
    SampleCopy => "sampleCopy",
    CurrentlyInUs => "currentlyInUS",
    TextMessaging => "textMessaging",
    AdditionalFiles => "additionalFiles",
    WritingSample => "writingSample",
    HowDidYouHear => "howDidYouHear",
    AffirmTruthfulness => "affirmTruthfulness",
    CoverLetter => "coverLetter",
    Pronouns => "pronouns",
    CurrentCountry => "currentCountry",
    CurrentStateProvince => "currentStateProvince",
    SponsorshipDetails => "sponsorshipDetails",
    HourlyRate => "hourlyRate",
    DesiredSalary => "desiredSalary",
    HybridScheduleAgreement => "hybridScheduleAgreement",
    CopywritingExperience => "copywritingExperience",
    CustomFileUpload => "customFileUpload",
    HispanicLatino => "hispanicLatino",
    RaceEthnicity => "raceEthnicity",
    GenderIdentity => "genderIdentity",
    VeteranStatus => "veteranStatus",
    DisabilityStatus => "disabilityStatus",
    ContractorOrEmployee => "contractorOrEmployee",
    WorkedHereBefore => "workedHereBefore",
    CurrentlyWorkingHere => "currentlyWorkingHere",
    ContractingAgency => "contractingAgency",
    ContinueCurrentRole => "continueCurrentRole",
    RestrictiveCovenants => "restrictiveCovenants",
    CanProvideAgreement => "canProvideAgreement",
    Resume => "resume",
}

impl FieldType {
    pub fn is_eeo(self) -> bool {
        matches!(
            self,
            FieldType::HispanicLatino
                | FieldType::RaceEthnicity
                | FieldType::GenderIdentity
                | FieldType::VeteranStatus
                | FieldType::DisabilityStatus
        )
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldType {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PatternError::UnknownType(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("failed to read pattern table: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pattern table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown field type '{0}'")]
    UnknownType(String),
    #[error("field type '{0}' is declared more than once")]
    Duplicate(FieldType),
    #[error("priority type '{0}' has no keyword entry")]
    MissingPriority(FieldType),
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldPatterns {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EeoOption {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EeoCategory {
    pub field: FieldType,
    #[serde(default)]
    pub options: Vec<EeoOption>,
}

/// The versioned keyword table the classifier runs on.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternTable {
    pub version: u32,
    #[serde(default)]
    pub priority: Vec<FieldType>,
    #[serde(default)]
    pub file_keywords: Vec<String>,
    #[serde(rename = "field")]
    pub fields: Vec<FieldPatterns>,
    #[serde(default)]
    pub eeo: Vec<EeoCategory>,
}

impl PatternTable {
    pub fn builtin() -> Result<Self, PatternError> {
        Self::load_str(BUILTIN_TABLE)
    }

    pub fn load(path: &Path) -> Result<Self, PatternError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load from `path` when given, else the table compiled into the binary.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, PatternError> {
        match path {
            Some(p) => Self::load(p),
            None => Self::builtin(),
        }
    }

    pub fn load_str(content: &str) -> Result<Self, PatternError> {
        let mut table: PatternTable = toml::from_str(content)?;
        table.validate()?;
        for entry in &mut table.fields {
            for keyword in &mut entry.keywords {
                *keyword = keyword.to_lowercase();
            }
        }
        for keyword in &mut table.file_keywords {
            *keyword = keyword.to_lowercase();
        }
        for category in &mut table.eeo {
            for option in &mut category.options {
                for keyword in &mut option.keywords {
                    *keyword = keyword.to_lowercase();
                }
            }
        }
        Ok(table)
    }

    fn validate(&self) -> Result<(), PatternError> {
        let mut seen = HashSet::new();
        for entry in &self.fields {
            if !seen.insert(entry.field_type) {
                return Err(PatternError::Duplicate(entry.field_type));
            }
        }
        if let Some(missing) = self.priority.iter().find(|t| !seen.contains(*t)) {
            return Err(PatternError::MissingPriority(*missing));
        }
        Ok(())
    }

    pub fn keywords(&self, field_type: FieldType) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|e| e.field_type == field_type)
            .map(|e| e.keywords.as_slice())
    }

    pub fn eeo_options(&self, field_type: FieldType) -> &[EeoOption] {
        self.eeo
            .iter()
            .find(|c| c.field == field_type)
            .map(|c| c.options.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_loads() {
        let table = PatternTable::builtin().unwrap();
        assert_eq!(table.version, 1);
        assert!(table.fields.len() >= 60);
        assert_eq!(table.priority[0], FieldType::HispanicLatino);
        assert!(table.keywords(FieldType::Email).unwrap().contains(&"email".to_string()));
        assert_eq!(table.eeo_options(FieldType::VeteranStatus).len(), 3);
        assert!(table.eeo_options(FieldType::Email).is_empty());
    }

    #[test]
    fn test_every_field_type_round_trips_through_its_name() {
        for field_type in FieldType::ALL {
            assert_eq!(field_type.as_str().parse::<FieldType>().unwrap(), *field_type);
        }
        assert_eq!("CURRENTLYINUS".parse::<FieldType>().unwrap(), FieldType::CurrentlyInUs);
        assert!("favouriteColour".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_rejects_duplicate_entries() {
        let content = r#"
            version = 2
            [[field]]
            type = "email"
            keywords = ["email"]
            [[field]]
            type = "email"
            keywords = ["mail"]
        "#;
        assert!(matches!(
            PatternTable::load_str(content),
            Err(PatternError::Duplicate(FieldType::Email))
        ));
    }

    #[test]
    fn test_rejects_priority_without_entry() {
        let content = r#"
            version = 2
            priority = ["veteranStatus"]
            [[field]]
            type = "email"
            keywords = ["email"]
        "#;
        assert!(matches!(
            PatternTable::load_str(content),
            Err(PatternError::MissingPriority(FieldType::VeteranStatus))
        ));
    }

    #[test]
    fn test_keywords_are_lowercased() {
        let content = r#"
            version = 3
            [[field]]
            type = "phone"
            keywords = ["Mobile Number"]
        "#;
        let table = PatternTable::load_str(content).unwrap();
        assert_eq!(table.keywords(FieldType::Phone).unwrap(), ["mobile number"]);
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "version = 7\n[[field]]\ntype = \"city\"\nkeywords = [\"town\"]").unwrap();
        let table = PatternTable::load_or_builtin(Some(file.path())).unwrap();
        assert_eq!(table.version, 7);
        assert_eq!(table.fields.len(), 1);
    }
}
