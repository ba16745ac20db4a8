use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::Profile;
use crate::patterns::{FieldType, PatternTable};
use crate::phone::PhoneFormat;
use crate::scanner::{Choice, ControlKind, Hints, SelectOption};

/// Controls this small get the two-letter state code.
const STATE_CODE_MAX_LENGTH: usize = 3;
const STATE_CODE_MAX_SIZE: usize = 10;

/// The value to write, plus the words a select or radio group may be
/// matched against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedValue {
    pub text: String,
    pub keywords: Vec<String>,
}

impl ResolvedValue {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            keywords: vec![text.to_lowercase()],
            text,
        }
    }

    fn with_keywords<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for keyword in extra {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !self.keywords.contains(&keyword) {
                self.keywords.push(keyword);
            }
        }
        self
    }
}

/// Picks the value for a bound control from the profile and the
/// configured answer defaults.
pub struct Resolver<'a> {
    table: &'a PatternTable,
    defaults: &'a BTreeMap<String, String>,
    referral_sources: &'a [String],
}

impl<'a> Resolver<'a> {
    pub fn new(
        table: &'a PatternTable,
        defaults: &'a BTreeMap<String, String>,
        referral_sources: &'a [String],
    ) -> Self {
        Self {
            table,
            defaults,
            referral_sources,
        }
    }

    /// `None` means leave the control alone.
    pub fn resolve(&self, field_type: FieldType, profile: &Profile, hints: &Hints) -> Option<ResolvedValue> {
        let value = self.base_value(field_type, profile, hints)?;
        if value.text.trim().is_empty() {
            return None;
        }
        let fitted = fit_to_control(value, hints);
        if fitted.is_none() {
            debug!("No option on the {:?} control fits {}", hints.kind, field_type);
        }
        fitted
    }

    /// Profile answer, then configured default.
    fn answer(&self, field_type: FieldType, profile: &Profile) -> Option<String> {
        let key = field_type.as_str();
        profile
            .answers
            .get(key)
            .or_else(|| self.defaults.get(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn answered(&self, field_type: FieldType, profile: &Profile) -> Option<ResolvedValue> {
        self.answer(field_type, profile).map(ResolvedValue::new)
    }

    /// EEO answers may be option codes from the pattern table.
    fn eeo_value(&self, field_type: FieldType, profile: &Profile) -> Option<ResolvedValue> {
        let answer = self.answer(field_type, profile)?;
        let option = self.table.eeo_options(field_type).iter().find(|o| {
            o.value.eq_ignore_ascii_case(&answer) || o.label.eq_ignore_ascii_case(&answer)
        });
        Some(match option {
            Some(option) => ResolvedValue::new(option.label.clone()).with_keywords(&option.keywords),
            None => ResolvedValue::new(answer),
        })
    }

    fn referral(&self, profile: &Profile) -> Option<ResolvedValue> {
        if let Some(value) = self.answered(FieldType::HowDidYouHear, profile) {
            return Some(value);
        }
        self.referral_sources
            .choose(&mut rand::thread_rng())
            .map(ResolvedValue::new)
    }

    fn base_value(&self, field_type: FieldType, p: &Profile, hints: &Hints) -> Option<ResolvedValue> {
        if hints.kind == ControlKind::File {
            return match field_type {
                FieldType::Resume => p
                    .resume_path
                    .as_ref()
                    .map(|path| ResolvedValue::new(path.to_string_lossy())),
                _ => None,
            };
        }

        let text = |s: &str| Some(ResolvedValue::new(s.trim()));
        match field_type {
            FieldType::FirstName => text(&p.first_name),
            FieldType::LastName => text(&p.last_name),
            FieldType::FullName => text(&p.display_name()),
            FieldType::PreferredName => {
                if p.preferred_name.trim().is_empty() {
                    text(&p.display_name())
                } else {
                    text(&p.preferred_name)
                }
            }
            FieldType::Email => text(&p.email),
            FieldType::Phone => {
                let phone = p.phone.as_ref()?;
                text(&phone.render(PhoneFormat::from_placeholder(hints.placeholder.as_deref())))
            }
            FieldType::LinkedIn => text(&p.linked_in_url),
            FieldType::Github => text(&p.github_url),
            FieldType::Portfolio => {
                if p.website_url.trim().is_empty() {
                    p.portfolio_urls.first().and_then(|u| text(u))
                } else {
                    text(&p.website_url)
                }
            }
            FieldType::Twitter => None,

            FieldType::Address => text(&p.address1),
            FieldType::Address2 => text(&p.address2),
            FieldType::City | FieldType::LocationCity => text(&p.city),
            FieldType::State => {
                let small = hints.max_length.is_some_and(|n| n <= STATE_CODE_MAX_LENGTH)
                    || hints.size.is_some_and(|n| n <= STATE_CODE_MAX_SIZE);
                let chosen = if small || p.state_full().is_empty() {
                    p.state()
                } else {
                    p.state_full()
                };
                text(chosen).map(|v| v.with_keywords([p.state(), p.state_full()]))
            }
            FieldType::ZipCode => text(&p.zip_code),
            FieldType::Country => text(&p.country),
            FieldType::CurrentLocation => {
                if !p.city.is_empty() && !p.state().is_empty() {
                    let mut location = format!("{}, {}", p.city, p.state());
                    if !p.zip_code.is_empty() {
                        location.push(' ');
                        location.push_str(&p.zip_code);
                    }
                    text(&location)
                } else if !p.city.is_empty() {
                    text(&p.city)
                } else {
                    text(&p.location)
                }
            }
            FieldType::CurrentStateProvince => self
                .answered(field_type, p)
                .or_else(|| if p.state_full().is_empty() { text(p.state()) } else { text(p.state_full()) }),
            FieldType::CurrentCountry => self.answered(field_type, p).or_else(|| text(&p.country)),

            FieldType::Skills => text(&p.skills().join(", ")),
            FieldType::Experience => {
                if p.years_of_experience > 0 {
                    text(&format!("{} years", p.years_of_experience))
                } else {
                    None
                }
            }
            FieldType::YearsOfExperience => {
                let years = p.years_of_experience;
                let bucket = match years {
                    5.. => "5+ years".to_string(),
                    3..=4 => "3-4 years".to_string(),
                    1..=2 => "1-2 years".to_string(),
                    _ => format!("{}+ years", years),
                };
                text(&bucket).map(|v| v.with_keywords([years.to_string()]))
            }
            FieldType::Summary => text(&p.summary),
            FieldType::Education => p
                .education
                .first()
                .and_then(|e| text(&format!("{} - {}", e.degree, e.school).trim_matches([' ', '-']).to_string())),
            FieldType::School => p.education.first().and_then(|e| text(&e.school)),
            FieldType::Degree => p.education.first().and_then(|e| text(&e.degree)),
            FieldType::Discipline => p.education.first().and_then(|e| text(&e.discipline)),
            FieldType::CurrentJobTitle => text(p.current_job_title()),
            FieldType::CurrentCompany => text(p.current_company()),
            FieldType::Certifications => text(
                &p.certifications
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            FieldType::Languages => text(
                &p.languages
                    .iter()
                    .map(|l| format!("{} ({})", l.language, l.proficiency))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            FieldType::CoverLetter => text(&p.cover_letter_text),
            FieldType::WritingSample | FieldType::SampleCopy => {
                if p.portfolio_urls.is_empty() {
                    self.answered(field_type, p)
                } else {
                    text(&p.portfolio_urls.join(", "))
                }
            }

            FieldType::Salary | FieldType::CustomFileUpload | FieldType::AdditionalFiles | FieldType::Resume => None,

            FieldType::HowDidYouHear => self.referral(p),

            eeo if eeo.is_eeo() => self.eeo_value(eeo, p),

            _ => self.answered(field_type, p),
        }
    }
}

/// Narrows a value to what the control can hold. Selects and radio
/// groups must land on one of their own options.
fn fit_to_control(value: ResolvedValue, hints: &Hints) -> Option<ResolvedValue> {
    match hints.kind {
        ControlKind::Select if !hints.options.is_empty() => {
            let index = match_option(&hints.options, &value)?;
            Some(ResolvedValue {
                text: hints.options[index].text.clone(),
                keywords: value.keywords,
            })
        }
        ControlKind::Radio => choose(&hints.choices, value),
        ControlKind::Checkbox if hints.choices.len() > 1 => choose(&hints.choices, value),
        _ => Some(value),
    }
}

fn choose(choices: &[Choice], value: ResolvedValue) -> Option<ResolvedValue> {
    let index = match_choice(choices, &value)?;
    Some(ResolvedValue {
        text: choices[index].label.clone(),
        keywords: value.keywords,
    })
}

/// Exact text or value, then containment either way, then the first
/// option with a non-empty value.
pub fn match_option(options: &[SelectOption], value: &ResolvedValue) -> Option<usize> {
    let lowered: Vec<(String, String)> = options
        .iter()
        .map(|o| (o.text.trim().to_lowercase(), o.value.trim().to_lowercase()))
        .collect();
    let wanted = &value.keywords;

    let exact = wanted.iter().find_map(|w| {
        lowered
            .iter()
            .position(|(text, val)| text == w || (!val.is_empty() && val == w))
    });
    if exact.is_some() {
        return exact;
    }

    let option_contains = wanted.iter().find_map(|w| {
        lowered
            .iter()
            .position(|(text, _)| !text.is_empty() && text.contains(w.as_str()))
    });
    if option_contains.is_some() {
        return option_contains;
    }

    let value_contains = wanted.iter().find_map(|w| {
        lowered
            .iter()
            .position(|(text, _)| !text.is_empty() && w.contains(text.as_str()))
    });
    if value_contains.is_some() {
        return value_contains;
    }

    options
        .iter()
        .position(|o| !o.value.trim().is_empty() && !o.text.trim().is_empty())
}

/// Exact label, then a label containing one of the keywords. No fallback.
pub fn match_choice(choices: &[Choice], value: &ResolvedValue) -> Option<usize> {
    let labels: Vec<String> = choices.iter().map(|c| c.label.trim().to_lowercase()).collect();
    value
        .keywords
        .iter()
        .find_map(|w| labels.iter().position(|l| l == w))
        .or_else(|| {
            value
                .keywords
                .iter()
                .find_map(|w| labels.iter().position(|l| !l.is_empty() && l.contains(w.as_str())))
        })
}

pub fn is_affirmative(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "yes" | "true" | "agree" | "i agree" | "accept"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Education, Experience};
    use crate::phone::Phone;
    use crate::scanner::ElementHandle;
    use std::path::PathBuf;

    fn profile() -> Profile {
        let mut p = Profile::default();
        p.first_name = "Ada".into();
        p.last_name = "Lovelace".into();
        p.email = "ada@example.com".into();
        p.phone = Phone::parse("5755550323");
        p.city = "Austin".into();
        p.set_state("TX");
        p.zip_code = "78730".into();
        p.years_of_experience = 4;
        p.experience.push(Experience {
            title: "Engineer".into(),
            company: "Acme".into(),
            ..Default::default()
        });
        p.education.push(Education {
            school: "UT Austin".into(),
            degree: "BS".into(),
            ..Default::default()
        });
        p
    }

    fn with<F: FnOnce(&Resolver<'_>)>(defaults: &[(&str, &str)], f: F) {
        let table = PatternTable::builtin().unwrap();
        let defaults: BTreeMap<String, String> = defaults
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let sources = vec!["LinkedIn".to_string(), "Indeed".to_string()];
        f(&Resolver::new(&table, &defaults, &sources));
    }

    fn text_hints() -> Hints {
        Hints::new(ControlKind::Text)
    }

    fn select(options: &[(&str, &str)]) -> Hints {
        let mut hints = Hints::new(ControlKind::Select);
        hints.options = options
            .iter()
            .map(|(text, value)| SelectOption {
                text: text.to_string(),
                value: value.to_string(),
            })
            .collect();
        hints
    }

    fn radios(labels: &[&str]) -> Hints {
        let mut hints = Hints::new(ControlKind::Radio);
        hints.choices = labels
            .iter()
            .enumerate()
            .map(|(i, label)| Choice {
                label: label.to_string(),
                value: i.to_string(),
                element: ElementHandle {
                    ordinal: i,
                    id: None,
                    name: Some("q".into()),
                    tag: "input".into(),
                },
            })
            .collect();
        hints
    }

    fn text_of(value: Option<ResolvedValue>) -> Option<String> {
        value.map(|v| v.text)
    }

    #[test]
    fn test_direct_and_fallback_names() {
        with(&[], |r| {
            let p = profile();
            assert_eq!(text_of(r.resolve(FieldType::FirstName, &p, &text_hints())).unwrap(), "Ada");
            assert_eq!(text_of(r.resolve(FieldType::FullName, &p, &text_hints())).unwrap(), "Ada Lovelace");
            assert_eq!(
                text_of(r.resolve(FieldType::PreferredName, &p, &text_hints())).unwrap(),
                "Ada Lovelace"
            );
            assert_eq!(text_of(r.resolve(FieldType::CurrentCompany, &p, &text_hints())).unwrap(), "Acme");
            assert_eq!(text_of(r.resolve(FieldType::Education, &p, &text_hints())).unwrap(), "BS - UT Austin");
        });
    }

    #[test]
    fn test_phone_format_follows_placeholder() {
        with(&[], |r| {
            let p = profile();
            let mut hints = text_hints();
            assert_eq!(text_of(r.resolve(FieldType::Phone, &p, &hints)).unwrap(), "(575) 555-0323");
            hints.placeholder = Some("555-555-5555".into());
            assert_eq!(text_of(r.resolve(FieldType::Phone, &p, &hints)).unwrap(), "575-555-0323");
            hints.placeholder = Some("Phone number".into());
            assert_eq!(text_of(r.resolve(FieldType::Phone, &p, &hints)).unwrap(), "5755550323");
        });
    }

    #[test]
    fn test_state_by_control_size() {
        with(&[], |r| {
            let p = profile();
            let mut hints = text_hints();
            assert_eq!(text_of(r.resolve(FieldType::State, &p, &hints)).unwrap(), "Texas");
            hints.max_length = Some(2);
            assert_eq!(text_of(r.resolve(FieldType::State, &p, &hints)).unwrap(), "TX");
            hints.max_length = None;
            hints.size = Some(8);
            assert_eq!(text_of(r.resolve(FieldType::State, &p, &hints)).unwrap(), "TX");

            let hints = select(&[("Select", ""), ("New Mexico", "NM"), ("Texas", "TX")]);
            assert_eq!(text_of(r.resolve(FieldType::State, &p, &hints)).unwrap(), "Texas");
        });
    }

    #[test]
    fn test_select_yes_no() {
        with(&[("legallyAuthorized", "yes")], |r| {
            let hints = select(&[("Yes", "1"), ("No", "0")]);
            let value = r.resolve(FieldType::LegallyAuthorized, &profile(), &hints).unwrap();
            assert_eq!(value.text, "Yes");
            assert_eq!(match_option(&hints.options, &value), Some(0));
        });
    }

    #[test]
    fn test_select_containment_and_fallback() {
        let options = [
            SelectOption { text: "Please select".into(), value: "".into() },
            SelectOption { text: "Yes, I am authorized".into(), value: "a".into() },
            SelectOption { text: "No".into(), value: "b".into() },
        ];
        assert_eq!(match_option(&options, &ResolvedValue::new("Yes")), Some(1));
        assert_eq!(match_option(&options, &ResolvedValue::new("Maybe")), Some(1));
        assert_eq!(match_option(&options, &ResolvedValue::new("b")), Some(2));
    }

    #[test]
    fn test_radio_requires_a_match() {
        with(&[("requireSponsorship", "No")], |r| {
            let p = profile();
            let value = r.resolve(FieldType::RequireSponsorship, &p, &radios(&["Yes", "No"])).unwrap();
            assert_eq!(value.text, "No");
            assert!(r
                .resolve(FieldType::RequireSponsorship, &p, &radios(&["Maybe", "Later"]))
                .is_none());
        });
    }

    #[test]
    fn test_eeo_codes_map_to_labels() {
        with(&[], |r| {
            let mut p = profile();
            assert!(r.resolve(FieldType::VeteranStatus, &p, &text_hints()).is_none());

            p.answers.insert("veteranStatus".into(), "not_veteran".into());
            let hints = radios(&[
                "I identify as one or more of the classifications of protected veteran",
                "I am not a protected veteran",
                "I choose not to self-identify",
            ]);
            let value = r.resolve(FieldType::VeteranStatus, &p, &hints).unwrap();
            assert_eq!(value.text, "I am not a protected veteran");
        });
    }

    #[test]
    fn test_answer_precedence() {
        with(&[("willingToRelocate", "Yes")], |r| {
            let mut p = profile();
            assert_eq!(text_of(r.resolve(FieldType::WillingToRelocate, &p, &text_hints())).unwrap(), "Yes");
            p.answers.insert("willingToRelocate".into(), "No".into());
            assert_eq!(text_of(r.resolve(FieldType::WillingToRelocate, &p, &text_hints())).unwrap(), "No");
            assert!(r.resolve(FieldType::Pronouns, &p, &text_hints()).is_none());
        });
    }

    #[test]
    fn test_how_did_you_hear_picks_a_source() {
        with(&[], |r| {
            let value = text_of(r.resolve(FieldType::HowDidYouHear, &profile(), &text_hints())).unwrap();
            assert!(value == "LinkedIn" || value == "Indeed");
        });
    }

    #[test]
    fn test_years_buckets() {
        with(&[], |r| {
            let mut p = profile();
            let bucket = |p: &Profile| text_of(r.resolve(FieldType::YearsOfExperience, p, &text_hints())).unwrap();
            assert_eq!(bucket(&p), "3-4 years");
            p.years_of_experience = 7;
            assert_eq!(bucket(&p), "5+ years");
            p.years_of_experience = 1;
            assert_eq!(bucket(&p), "1-2 years");
            p.years_of_experience = 0;
            assert_eq!(bucket(&p), "0+ years");
        });
    }

    #[test]
    fn test_never_filled() {
        with(&[], |r| {
            let mut p = profile();
            for ft in [FieldType::Salary, FieldType::CustomFileUpload, FieldType::AdditionalFiles, FieldType::Twitter] {
                assert!(r.resolve(ft, &p, &text_hints()).is_none(), "{}", ft);
            }
            assert!(r.resolve(FieldType::Github, &p, &text_hints()).is_none());

            let file = Hints::new(ControlKind::File);
            assert!(r.resolve(FieldType::Resume, &p, &file).is_none());
            p.resume_path = Some(PathBuf::from("/tmp/cv.pdf"));
            assert_eq!(text_of(r.resolve(FieldType::Resume, &p, &file)).unwrap(), "/tmp/cv.pdf");
            assert!(r.resolve(FieldType::CoverLetter, &p, &file).is_none());
        });
    }

    #[test]
    fn test_affirmative() {
        assert!(is_affirmative("Yes"));
        assert!(is_affirmative(" I agree "));
        assert!(!is_affirmative("No"));
        assert!(!is_affirmative("yes please"));
    }
}
