use std::collections::HashSet;

use crate::patterns::{FieldType, PatternTable};

/// Text signals gathered from one form control.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    pub name: String,
    pub id: String,
    pub placeholder: String,
    pub aria_label: String,
    pub class_name: String,
    pub label: String,
}

impl Signals {
    /// All signals lowercased and joined with single spaces.
    pub fn haystack(&self) -> String {
        [
            &self.name,
            &self.id,
            &self.placeholder,
            &self.aria_label,
            &self.class_name,
            &self.label,
        ]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
    }
}

/// Keyword classifier with the match order fixed at construction:
/// priority types first, then the rest in table order.
#[derive(Debug, Clone)]
pub struct Classifier {
    ordered: Vec<(FieldType, Vec<String>)>,
    file_keywords: Vec<String>,
}

impl Classifier {
    pub fn new(table: &PatternTable) -> Self {
        let mut ordered = Vec::with_capacity(table.fields.len());
        let mut placed = HashSet::new();

        for field_type in &table.priority {
            if let Some(keywords) = table.keywords(*field_type) {
                ordered.push((*field_type, keywords.to_vec()));
                placed.insert(*field_type);
            }
        }
        for entry in &table.fields {
            if placed.insert(entry.field_type) {
                ordered.push((entry.field_type, entry.keywords.clone()));
            }
        }

        Self {
            ordered,
            file_keywords: table.file_keywords.clone(),
        }
    }

    pub fn classify(&self, signals: &Signals) -> Option<FieldType> {
        self.classify_text(&signals.haystack())
    }

    /// File inputs are resume uploads when any file keyword matches,
    /// otherwise they go through normal classification.
    pub fn classify_file(&self, signals: &Signals) -> Option<FieldType> {
        let haystack = signals.haystack();
        if self.file_keywords.iter().any(|k| haystack.contains(k.as_str())) {
            return Some(FieldType::Resume);
        }
        self.classify_text(&haystack)
    }

    /// `haystack` must already be lowercased.
    pub fn classify_text(&self, haystack: &str) -> Option<FieldType> {
        if haystack.is_empty() {
            return None;
        }
        self.ordered
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k.as_str())))
            .map(|(field_type, _)| *field_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&PatternTable::builtin().unwrap())
    }

    fn labelled(label: &str) -> Signals {
        Signals {
            label: label.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_priority_beats_generic_keyword() {
        let c = classifier();
        // "race" appears in the generic ethnicity entry, but the Hispanic
        // question is checked first.
        let signals = labelled("Race: are you Hispanic or Latino?");
        assert_eq!(c.classify(&signals), Some(FieldType::HispanicLatino));
        assert_eq!(c.classify(&labelled("Race / Ethnicity")), Some(FieldType::RaceEthnicity));
    }

    #[test]
    fn test_screening_question_beats_company() {
        let c = classifier();
        let signals = labelled("Have you worked for this company before?");
        assert_eq!(c.classify(&signals), Some(FieldType::WorkedHereBefore));
        assert_eq!(c.classify(&labelled("Company")), Some(FieldType::CurrentCompany));
    }

    #[test]
    fn test_basic_contact_fields() {
        let c = classifier();
        let first = Signals {
            name: "first_name".into(),
            ..Default::default()
        };
        let email = Signals {
            name: "email_address".into(),
            ..Default::default()
        };
        let phone = Signals {
            id: "phone1".into(),
            placeholder: "(555) 555-5555".into(),
            ..Default::default()
        };
        assert_eq!(c.classify(&first), Some(FieldType::FirstName));
        assert_eq!(c.classify(&email), Some(FieldType::Email));
        assert_eq!(c.classify(&phone), Some(FieldType::Phone));
    }

    #[test]
    fn test_address_line_two_before_address() {
        let c = classifier();
        assert_eq!(c.classify(&labelled("Address Line 2")), Some(FieldType::Address2));
        assert_eq!(c.classify(&labelled("Street Address")), Some(FieldType::Address));
    }

    #[test]
    fn test_company_name_is_not_full_name() {
        let c = classifier();
        assert_eq!(c.classify(&labelled("Company Name")), Some(FieldType::CurrentCompany));
        assert_eq!(c.classify(&labelled("Full Name")), Some(FieldType::FullName));
    }

    #[test]
    fn test_unmatched_is_none() {
        let c = classifier();
        let signals = Signals {
            name: "xyz_q7".into(),
            ..Default::default()
        };
        assert_eq!(c.classify(&signals), None);
        assert_eq!(c.classify(&Signals::default()), None);
    }

    #[test]
    fn test_file_inputs_prefer_resume() {
        let c = classifier();
        let upload = Signals {
            name: "attachment_upload".into(),
            ..Default::default()
        };
        assert_eq!(c.classify_file(&upload), Some(FieldType::Resume));
        let portfolio = labelled("Portfolio");
        assert_eq!(c.classify_file(&portfolio), Some(FieldType::Portfolio));
    }

    #[test]
    fn test_custom_table_order() {
        let table = PatternTable::load_str(
            r#"
            version = 9
            priority = ["city"]
            [[field]]
            type = "state"
            keywords = ["state"]
            [[field]]
            type = "city"
            keywords = ["city"]
            "#,
        )
        .unwrap();
        let c = Classifier::new(&table);
        assert_eq!(c.classify(&labelled("City / State")), Some(FieldType::City));
    }
}
