use anyhow::Result;
use chrono::Datelike;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::models::{Certification, Education, Experience, Language};
use crate::phone::Phone;
use crate::scanner::{cap_chars, collapse_whitespace};
use crate::states;

const SUMMARY_LIMIT: usize = 500;
const EXPERIENCE_DESCRIPTION_LIMIT: usize = 300;

const SUMMARY_HEADINGS: &[&str] = &["summary", "professional summary", "profile", "objective", "career objective", "about me"];
const EXPERIENCE_HEADINGS: &[&str] = &[
    "experience",
    "work experience",
    "employment history",
    "professional experience",
    "career history",
];
const EDUCATION_HEADINGS: &[&str] = &["education"];
const SKILLS_HEADINGS: &[&str] = &["skills", "skill", "technical skills", "core competencies", "key skills", "proficiencies"];
const CERTIFICATION_HEADINGS: &[&str] = &["certifications", "certification", "licenses", "license", "credentials"];
const LANGUAGE_HEADINGS: &[&str] = &["languages", "language"];
const OTHER_HEADINGS: &[&str] = &["projects", "awards", "references", "interests", "volunteer", "publications"];

const SKILLS: &[&str] = &[
    // Languages
    "JavaScript", "Python", "Java", "C++", "C#", "Ruby", "PHP", "Swift", "Kotlin", "TypeScript", "Go", "Rust",
    "Scala", "R", "MATLAB", "Perl", "Objective-C",
    // Web
    "HTML", "HTML5", "CSS", "CSS3", "SASS", "LESS", "React", "Angular", "Vue", "Vue.js", "Svelte", "jQuery",
    "Bootstrap", "Tailwind", "Next.js", "Nuxt", "Gatsby",
    // Backend
    "Node.js", "Express", "Django", "Flask", "FastAPI", "Spring", "Spring Boot", "Ruby on Rails", "ASP.NET",
    "Laravel", "Symfony", "NestJS",
    // Databases
    "SQL", "MySQL", "PostgreSQL", "MongoDB", "Redis", "SQLite", "Oracle", "Microsoft SQL Server", "MariaDB",
    "Cassandra", "DynamoDB", "Elasticsearch",
    // Cloud and ops
    "AWS", "Azure", "GCP", "Google Cloud", "Docker", "Kubernetes", "Jenkins", "CI/CD", "Terraform", "Ansible",
    "CloudFormation", "Heroku", "DigitalOcean",
    // Tooling
    "Git", "GitHub", "GitLab", "Bitbucket", "SVN", "Jira", "Confluence",
    // Process
    "Agile", "Scrum", "Kanban", "Waterfall", "DevOps", "TDD", "BDD",
    // Architecture
    "REST", "RESTful", "API", "GraphQL", "Microservices", "SOA", "WebSocket",
    // Data
    "Machine Learning", "Deep Learning", "AI", "Data Analysis", "Data Science", "Pandas", "NumPy", "TensorFlow",
    "PyTorch", "Scikit-learn", "Keras",
    // Business
    "Excel", "Microsoft Excel", "Google Sheets", "Tableau", "PowerBI", "Looker", "Salesforce", "HubSpot",
    "Google Analytics", "SEO", "SEM", "Content Marketing",
    // Design
    "Photoshop", "Illustrator", "Figma", "Sketch", "InDesign", "Adobe XD", "After Effects", "Premiere Pro",
    "Canva", "GIMP",
    // Management
    "Project Management", "Product Management", "Stakeholder Management", "Budget Management",
    "Risk Management", "Change Management",
    // Soft skills
    "Leadership", "Team Leadership", "Communication", "Problem Solving", "Critical Thinking", "Time Management",
    "Collaboration", "Adaptability", "Creativity", "Customer Service", "Public Speaking", "Negotiation",
    // Mobile
    "iOS", "Android", "React Native", "Flutter", "Xamarin", "Ionic",
    // Testing
    "Jest", "Mocha", "Chai", "Selenium", "Cypress", "JUnit", "PyTest", "Unit Testing", "Integration Testing",
    "E2E Testing",
    // Other
    "WordPress", "Shopify", "Magento", "WooCommerce", "SEO Optimization", "Email Marketing",
    "Social Media Marketing", "Content Writing", "Copywriting", "Technical Writing", "Documentation",
];

const LANGUAGES: &[&str] = &[
    "English", "Spanish", "French", "German", "Chinese", "Mandarin", "Cantonese", "Japanese", "Korean", "Arabic",
    "Portuguese", "Russian", "Italian", "Hindi", "Bengali", "Punjabi", "Vietnamese", "Turkish", "Polish", "Dutch",
    "Greek", "Hebrew", "Swedish", "Norwegian", "Danish", "Finnish", "Czech", "Romanian",
];

const PROFICIENCIES: &[&str] = &[
    "Native", "Fluent", "Professional", "Intermediate", "Basic", "Beginner", "Advanced", "Conversational",
];

const DEGREE_MARKERS: &[&str] = &["bachelor", "master", "phd", "ph.d", "associate", "mba", "b.s.", "m.s.", "b.a.", "m.a."];
const DEGREE_ABBREVIATIONS: &[&str] = &["bs", "ba", "ms", "ma", "bsc", "msc", "mba", "phd"];
const SCHOOL_MARKERS: &[&str] = &["university", "college", "institute", "school"];

/// Fields recovered from resume text. Empty strings mean "not found".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedResume {
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<Phone>,
    pub linked_in_url: String,
    pub github_url: String,
    pub website_url: String,
    pub address1: String,
    pub city: String,
    pub state: String,
    pub state_full: String,
    pub zip_code: String,
    pub skills: Vec<String>,
    pub experience: Vec<Experience>,
    pub education: Vec<Education>,
    pub certifications: Vec<Certification>,
    pub languages: Vec<Language>,
    pub summary: String,
    pub years_of_experience: u32,
}

pub struct ResumeParser {
    max_skills: usize,
    max_experience: usize,
    max_certifications: usize,
    email: Regex,
    phones: [Regex; 3],
    name: Regex,
    linkedin: Regex,
    github: Regex,
    website: Regex,
    address: Regex,
    location_code_zip: Regex,
    location_name_zip: Regex,
    location_code: Regex,
    location_name: Regex,
    dates: Regex,
    place: Regex,
    year_range: Regex,
    years: Regex,
}

impl ResumeParser {
    pub fn new(max_skills: usize, max_experience: usize, max_certifications: usize) -> Result<Self> {
        const CITY: &str = r"([A-Z][a-z]+(?:[ \t]+[A-Z][a-z]+)?)";
        const ZIP: &str = r"(\d{5}(?:-\d{4})?)";
        Ok(Self {
            max_skills,
            max_experience,
            max_certifications,
            email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            phones: [
                Regex::new(r"(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}")?,
                Regex::new(r"\d{3}[-.\s]?\d{3}[-.\s]?\d{4}")?,
                Regex::new(r"\(\d{3}\)\s*\d{3}[-.\s]?\d{4}")?,
            ],
            name: Regex::new(r"^([A-Z][a-z]+(?:\s+[A-Z][a-z]*\.?)?\s+[A-Z][a-z]+)")?,
            linkedin: Regex::new(r"(?i)(?:https?://)?(?:www\.)?linkedin\.com/in/[A-Za-z0-9_-]+/?")?,
            github: Regex::new(r"(?i)(?:https?://)?(?:www\.)?github\.com/[A-Za-z0-9_-]+/?")?,
            website: Regex::new(r"(?i)(?:portfolio|website|personal site)[ \t:]+((?:https?://)?[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}(?:/\S*)?)")?,
            address: Regex::new(
                r"(?i)\b\d+ [A-Za-z ]+? (?:Street|St|Avenue|Ave|Drive|Dr|Road|Rd|Lane|Ln|Boulevard|Blvd|Court|Ct|Way|Circle|Cir)\b\.?",
            )?,
            location_code_zip: Regex::new(&format!(r"{},[ \t]*([A-Z]{{2}})[ \t]*{}", CITY, ZIP))?,
            location_name_zip: Regex::new(&format!(r"{},[ \t]*{}[ \t]*{}", CITY, CITY, ZIP))?,
            location_code: Regex::new(&format!(r"(?m)^{},[ \t]*([A-Z]{{2}})(?:\s|$)", CITY))?,
            location_name: Regex::new(&format!(r"(?m)^{},[ \t]*{}(?:\s|$)", CITY, CITY))?,
            dates: Regex::new(
                r"(?i)(?:\d{1,2}/\d{4}|[A-Za-z]+\.? \d{4}|\d{4})\s*[-–—]\s*(?:\d{1,2}/\d{4}|[A-Za-z]+\.? \d{4}|\d{4}|present|current|now)",
            )?,
            place: Regex::new(r"([A-Z][a-z]+(?: [A-Z][a-z]+)?), ([A-Z]{2}|[A-Z][a-z]+)\b")?,
            year_range: Regex::new(r"(?i)(\d{4})\s*[-–—]\s*(?:[A-Za-z]+\.?\s+|\d{1,2}/)?(\d{4}|present|current|now)")?,
            years: Regex::new(r"(?i)\d{4}(?:\s*[-–—]\s*(?:\d{4}|present|current))?")?,
        })
    }

    pub fn parse(&self, text: &str) -> ParsedResume {
        self.parse_at(text, chrono::Utc::now().year())
    }

    /// Parses with "Present" meaning `current_year`.
    pub fn parse_at(&self, text: &str, current_year: i32) -> ParsedResume {
        let text = text.replace("\r\n", "\n");
        let mut parsed = ParsedResume {
            email: self.email.find(&text).map(|m| m.as_str().to_string()).unwrap_or_default(),
            phone: self.find_phone(&text),
            linked_in_url: self.find_url(&self.linkedin, &text),
            github_url: self.find_url(&self.github, &text),
            website_url: self
                .website
                .captures(&text)
                .map(|c| with_scheme(&c[1]))
                .unwrap_or_default(),
            address1: self.address.find(&text).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
            ..Default::default()
        };

        self.find_name(&text, &mut parsed);
        self.find_location(&text, &mut parsed);

        parsed.skills = self.find_skills(&text);
        parsed.experience = self.find_experience(&text);
        parsed.education = self.find_education(&text);
        parsed.certifications = self.find_certifications(&text);
        parsed.languages = find_languages(&text);
        parsed.summary = section(&text, SUMMARY_HEADINGS)
            .map(|s| cap_chars_plain(&collapse_whitespace(&s), SUMMARY_LIMIT))
            .unwrap_or_default();
        parsed.years_of_experience = self.years_of_experience(&parsed.experience, current_year);

        debug!(
            "Parsed resume: {} skills, {} positions, {} schools",
            parsed.skills.len(),
            parsed.experience.len(),
            parsed.education.len()
        );
        parsed
    }

    fn find_phone(&self, text: &str) -> Option<Phone> {
        self.phones
            .iter()
            .flat_map(|re| re.find_iter(text))
            .find_map(|m| Phone::parse(m.as_str()))
    }

    fn find_url(&self, re: &Regex, text: &str) -> String {
        re.find(text).map(|m| with_scheme(m.as_str())).unwrap_or_default()
    }

    fn find_name(&self, text: &str, parsed: &mut ParsedResume) {
        let Some(first_line) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return;
        };
        let Some(caps) = self.name.captures(first_line) else {
            return;
        };
        let full = collapse_whitespace(&caps[1]);
        let parts: Vec<&str> = full.split(' ').collect();
        parsed.first_name = parts.first().copied().unwrap_or_default().to_string();
        parsed.last_name = parts.last().copied().unwrap_or_default().to_string();
        parsed.full_name = full;
    }

    /// "City, ST 12345", then "City, State 12345", then both forms without
    /// a zip at the start of a line. Full state names must be known.
    fn find_location(&self, text: &str, parsed: &mut ParsedResume) {
        let known = |s: &str| states::normalize(s).is_some();

        let found = self
            .location_code_zip
            .captures(text)
            .map(|c| (c[1].to_string(), c[2].to_string(), c[3].to_string()))
            .or_else(|| {
                self.location_name_zip
                    .captures_iter(text)
                    .find(|c| known(&c[2]))
                    .map(|c| (c[1].to_string(), c[2].to_string(), c[3].to_string()))
            })
            .or_else(|| {
                self.location_code
                    .captures(text)
                    .map(|c| (c[1].to_string(), c[2].to_string(), String::new()))
            })
            .or_else(|| {
                self.location_name
                    .captures_iter(text)
                    .find(|c| known(&c[2]))
                    .map(|c| (c[1].to_string(), c[2].to_string(), String::new()))
            });

        if let Some((city, state, zip)) = found {
            parsed.city = collapse_whitespace(&city);
            match states::normalize(&state) {
                Some((code, name)) => {
                    parsed.state = code.to_string();
                    parsed.state_full = name.to_string();
                }
                None => {
                    parsed.state = state.clone();
                    parsed.state_full = state;
                }
            }
            parsed.zip_code = zip;
        }
    }

    fn find_skills(&self, text: &str) -> Vec<String> {
        let scope = section(text, SKILLS_HEADINGS).unwrap_or_else(|| text.to_string());
        let haystack = scope.to_lowercase();
        SKILLS
            .iter()
            .filter(|skill| contains_term(&haystack, &skill.to_lowercase()))
            .take(self.max_skills)
            .map(|s| s.to_string())
            .collect()
    }

    fn find_experience(&self, text: &str) -> Vec<Experience> {
        let Some(body) = section(text, EXPERIENCE_HEADINGS) else {
            return Vec::new();
        };
        blocks(&body)
            .into_iter()
            .filter(|block| block.trim().chars().count() >= 10)
            .filter_map(|block| self.experience_entry(&block))
            .take(self.max_experience)
            .collect()
    }

    fn experience_entry(&self, block: &str) -> Option<Experience> {
        let lines: Vec<&str> = block.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let first = split_segments(lines.first()?);
        let title = first
            .first()
            .filter(|s| !has_year(s))
            .map(|s| s.to_string())
            .unwrap_or_default();
        let is_company = |s: &&str| !has_year(s) && !self.place.is_match(s);
        let company = first
            .get(1)
            .copied()
            .filter(is_company)
            .or_else(|| {
                let second = lines.get(1).copied()?;
                split_segments(second).into_iter().next().filter(is_company)
            })
            .map(str::to_string)
            .unwrap_or_default();
        if title.is_empty() && company.is_empty() {
            return None;
        }

        Some(Experience {
            title: if title.is_empty() { "Position".to_string() } else { title },
            company: if company.is_empty() { "Company".to_string() } else { company },
            duration: self.dates.find(block).map(|m| m.as_str().to_string()).unwrap_or_default(),
            location: self
                .place
                .captures(block)
                .map(|c| format!("{}, {}", &c[1], &c[2]))
                .unwrap_or_default(),
            description: cap_chars(block.trim(), EXPERIENCE_DESCRIPTION_LIMIT),
        })
    }

    fn find_education(&self, text: &str) -> Vec<Education> {
        let Some(body) = section(text, EDUCATION_HEADINGS) else {
            return Vec::new();
        };
        let lines: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

        let degree_line = lines.iter().find(|l| is_degree_line(l));
        let (degree, discipline) = match degree_line {
            Some(line) => {
                let line = strip_bullet(line);
                let head = split_segments(line).into_iter().next().unwrap_or(line);
                match head.split_once(" in ") {
                    Some((degree, discipline)) => (degree.trim().to_string(), discipline.trim().to_string()),
                    None => (head.trim().to_string(), String::new()),
                }
            }
            None => (String::new(), String::new()),
        };
        let school = lines
            .iter()
            .find(|l| {
                let lower = l.to_lowercase();
                SCHOOL_MARKERS.iter().any(|m| lower.contains(m))
            })
            .map(|l| {
                let l = strip_bullet(l);
                let head = l.split([',', '|']).next().unwrap_or(l);
                self.years.replace_all(head, "").trim().to_string()
            })
            .unwrap_or_default();
        let years = self.years.find(&body).map(|m| m.as_str().to_string()).unwrap_or_default();

        if degree.is_empty() && school.is_empty() {
            return Vec::new();
        }
        vec![Education {
            school,
            degree,
            discipline,
            years,
        }]
    }

    fn find_certifications(&self, text: &str) -> Vec<Certification> {
        let Some(body) = section(text, CERTIFICATION_HEADINGS) else {
            return Vec::new();
        };
        body.lines()
            .map(|l| strip_bullet(l.trim()))
            .filter(|l| l.chars().count() > 5)
            .map(|line| {
                let name = line
                    .split(" - ")
                    .next()
                    .and_then(|s| s.split(" | ").next())
                    .unwrap_or(line)
                    .trim()
                    .to_string();
                Certification {
                    name,
                    full_text: line.to_string(),
                }
            })
            .take(self.max_certifications)
            .collect()
    }

    /// Sum of `end - start` years over entries with a parsable range.
    pub fn years_of_experience(&self, experience: &[Experience], current_year: i32) -> u32 {
        experience
            .iter()
            .filter_map(|e| {
                let caps = self.year_range.captures(&e.duration)?;
                let start: i32 = caps[1].parse().ok()?;
                let end: i32 = match caps[2].parse() {
                    Ok(year) => year,
                    Err(_) => current_year,
                };
                u32::try_from(end - start).ok()
            })
            .sum()
    }
}

fn find_languages(text: &str) -> Vec<Language> {
    let Some(body) = section(text, LANGUAGE_HEADINGS) else {
        return Vec::new();
    };
    let lower = body.to_lowercase();
    LANGUAGES
        .iter()
        .filter_map(|language| {
            let needle = language.to_lowercase();
            let at = term_position(&lower, &needle)?;
            let rest = lower[at + needle.len()..].trim_start_matches([' ', '\t', '-', ':', '–', '(']);
            let proficiency = PROFICIENCIES
                .iter()
                .find(|p| rest.starts_with(&p.to_lowercase()))
                .copied()
                .unwrap_or("Unknown");
            Some(Language {
                language: language.to_string(),
                proficiency: proficiency.to_string(),
            })
        })
        .collect()
}

// --- Sections ---

fn normalized_heading(line: &str) -> String {
    collapse_whitespace(line.trim().trim_end_matches(':')).to_lowercase()
}

fn known_heading(name: &str) -> bool {
    [
        SUMMARY_HEADINGS,
        EXPERIENCE_HEADINGS,
        EDUCATION_HEADINGS,
        SKILLS_HEADINGS,
        CERTIFICATION_HEADINGS,
        LANGUAGE_HEADINGS,
        OTHER_HEADINGS,
    ]
    .iter()
    .any(|group| group.contains(&name))
}

/// A heading line and any text after "Heading:" on the same line.
fn heading(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some((head, rest)) = trimmed.split_once(':') {
        let name = normalized_heading(head);
        if known_heading(&name) {
            return Some((name, rest.trim().to_string()));
        }
    }
    let name = normalized_heading(trimmed);
    if known_heading(&name) || is_shouted(trimmed) {
        return Some((name, String::new()));
    }
    None
}

/// Short, all upper case, and not just an acronym.
fn is_shouted(line: &str) -> bool {
    let letters = line.chars().filter(|c| c.is_alphabetic()).count();
    letters >= 3
        && line.chars().count() <= 40
        && line.split_whitespace().count() <= 4
        && !line.chars().any(|c| c.is_lowercase() || c.is_ascii_digit())
}

/// Text under the first heading named in `names`, up to the next heading.
fn section(text: &str, names: &[&str]) -> Option<String> {
    let mut lines = text.lines();
    let mut body = Vec::new();
    loop {
        let line = lines.next()?;
        if let Some((name, rest)) = heading(line) {
            if names.contains(&name.as_str()) {
                if !rest.is_empty() {
                    body.push(rest);
                }
                break;
            }
        }
    }
    for line in lines {
        if heading(line).is_some() {
            break;
        }
        body.push(line.to_string());
    }
    let joined = body.join("\n");
    if joined.trim().is_empty() {
        None
    } else {
        Some(joined.trim_matches('\n').to_string())
    }
}

fn blocks(body: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

// --- Text helpers ---

fn with_scheme(url: &str) -> String {
    let url = url.trim();
    if url.to_lowercase().starts_with("http") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn split_segments(line: &str) -> Vec<&str> {
    line.split(['|', '–', '—'])
        .flat_map(|s| s.split(" - "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn has_year(s: &str) -> bool {
    let digits: Vec<bool> = s.chars().map(|c| c.is_ascii_digit()).collect();
    digits.windows(4).any(|w| w.iter().all(|d| *d))
}

fn strip_bullet(line: &str) -> &str {
    line.trim_start_matches(['•', '-', '*', '·', ' ']).trim()
}

fn is_degree_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    if DEGREE_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    let first_word = strip_bullet(&lower)
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or_default()
        .to_string();
    DEGREE_ABBREVIATIONS.contains(&first_word.as_str())
}

/// Byte offset of `term` in `haystack` where it is not part of a longer word.
fn term_position(haystack: &str, term: &str) -> Option<usize> {
    let is_word = |c: char| c.is_alphanumeric();
    haystack.match_indices(term).map(|(i, _)| i).find(|&i| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + term.len()..].chars().next();
        let starts_word = term.chars().next().is_some_and(is_word);
        let ends_word = term.chars().next_back().is_some_and(is_word);
        !(starts_word && before.is_some_and(is_word)) && !(ends_word && after.is_some_and(is_word))
    })
}

fn contains_term(haystack: &str, term: &str) -> bool {
    term_position(haystack, term).is_some()
}

fn cap_chars_plain(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESUME: &str = "Ada Lovelace
123 Main Street
Austin, TX 78730
(575) 555-0323 | ada@example.com
linkedin.com/in/ada-lovelace | github.com/ada
Portfolio: ada.dev

SUMMARY
Engineer who builds
analytical engines.

EXPERIENCE
Senior Engineer | Acme Analytics
Austin, TX | Jan 2019 - Present
Built the difference engine pipeline.

Engineer | Babbage Works
London, England | 2015 - 2018
Wrote the first published algorithm.

EDUCATION
B.S. in Mathematics
University of London, 2011 - 2015

SKILLS
Rust, Python, SQL, Docker, C++, Node.js

CERTIFICATIONS
AWS Certified Solutions Architect - 2020
Certified Kubernetes Administrator

LANGUAGES
English - Native
French: Fluent
German
";

    fn parser() -> ResumeParser {
        ResumeParser::new(50, 10, 10).unwrap()
    }

    #[test]
    fn test_contact_details() {
        let parsed = parser().parse_at(RESUME, 2025);
        assert_eq!(parsed.full_name, "Ada Lovelace");
        assert_eq!(parsed.first_name, "Ada");
        assert_eq!(parsed.last_name, "Lovelace");
        assert_eq!(parsed.email, "ada@example.com");
        assert_eq!(parsed.phone.unwrap().raw(), "5755550323");
        assert_eq!(parsed.linked_in_url, "https://linkedin.com/in/ada-lovelace");
        assert_eq!(parsed.github_url, "https://github.com/ada");
        assert_eq!(parsed.website_url, "https://ada.dev");
        assert_eq!(parsed.address1, "123 Main Street");
        assert_eq!((parsed.city.as_str(), parsed.state.as_str()), ("Austin", "TX"));
        assert_eq!(parsed.state_full, "Texas");
        assert_eq!(parsed.zip_code, "78730");
    }

    #[test]
    fn test_state_forms_normalize_the_same() {
        let p = parser();
        let abbreviated = p.parse_at("Austin, TX 78730", 2025);
        let spelled = p.parse_at("Austin, Texas 78730", 2025);
        for parsed in [&abbreviated, &spelled] {
            assert_eq!(parsed.city, "Austin");
            assert_eq!(parsed.state, "TX");
            assert_eq!(parsed.state_full, "Texas");
            assert_eq!(parsed.zip_code, "78730");
        }
    }

    #[test]
    fn test_location_without_zip() {
        let p = parser();
        let parsed = p.parse_at("Ada Lovelace\nSanta Fe, New Mexico\n", 2025);
        assert_eq!(parsed.city, "Santa Fe");
        assert_eq!(parsed.state, "NM");
        assert_eq!(parsed.zip_code, "");
        assert_eq!(p.parse_at("Gotham, Narnia\n", 2025).city, "");
    }

    #[test]
    fn test_phone_with_country_code() {
        let parsed = parser().parse_at("Call +1 575.555.0323", 2025);
        assert_eq!(parsed.phone.unwrap().dashed(), "575-555-0323");
        assert!(parser().parse_at("no digits here", 2025).phone.is_none());
    }

    #[test]
    fn test_sections() {
        let parsed = parser().parse_at(RESUME, 2025);
        assert_eq!(parsed.summary, "Engineer who builds analytical engines.");
        for skill in ["Rust", "Python", "SQL", "Docker", "C++", "Node.js"] {
            assert!(parsed.skills.iter().any(|s| s == skill), "missing {}", skill);
        }
        assert!(!parsed.skills.iter().any(|s| s == "Go" || s == "R" || s == "Java"));

        assert_eq!(parsed.experience.len(), 2);
        let first = &parsed.experience[0];
        assert_eq!(first.title, "Senior Engineer");
        assert_eq!(first.company, "Acme Analytics");
        assert_eq!(first.duration, "Jan 2019 - Present");
        assert_eq!(first.location, "Austin, TX");
        assert_eq!(parsed.experience[1].duration, "2015 - 2018");

        let school = &parsed.education[0];
        assert_eq!(school.degree, "B.S.");
        assert_eq!(school.discipline, "Mathematics");
        assert_eq!(school.school, "University of London");
        assert_eq!(school.years, "2011 - 2015");

        assert_eq!(parsed.certifications.len(), 2);
        assert_eq!(parsed.certifications[0].name, "AWS Certified Solutions Architect");
        assert_eq!(parsed.certifications[0].full_text, "AWS Certified Solutions Architect - 2020");

        let languages: Vec<_> = parsed
            .languages
            .iter()
            .map(|l| (l.language.as_str(), l.proficiency.as_str()))
            .collect();
        assert_eq!(languages, [("English", "Native"), ("French", "Fluent"), ("German", "Unknown")]);
    }

    #[test]
    fn test_years_of_experience() {
        let parsed = parser().parse_at(RESUME, 2025);
        assert_eq!(parsed.years_of_experience, 9);

        let p = parser();
        let entries = vec![
            Experience { duration: "2010 - 2012".into(), ..Default::default() },
            Experience { duration: "sometime".into(), ..Default::default() },
            Experience { duration: "2020 - Current".into(), ..Default::default() },
        ];
        assert_eq!(p.years_of_experience(&entries, 2024), 6);
    }

    #[test]
    fn test_limits() {
        let mut text = String::from("EXPERIENCE\n");
        for i in 0..12 {
            text.push_str(&format!("Engineer {} | Company {}\n2000 - 2001\n\n", i, i));
        }
        text.push_str("CERTIFICATIONS\n");
        for i in 0..12 {
            text.push_str(&format!("Certified Thing Number {}\n", i));
        }
        let parsed = ResumeParser::new(2, 10, 10).unwrap().parse_at(&text, 2025);
        assert_eq!(parsed.experience.len(), 10);
        assert_eq!(parsed.certifications.len(), 10);

        let long = format!("EXPERIENCE\nEngineer | Acme\n{}\n", "x".repeat(400));
        let parsed = parser().parse_at(&long, 2025);
        assert!(parsed.experience[0].description.ends_with("..."));
        assert_eq!(parsed.experience[0].description.chars().count(), EXPERIENCE_DESCRIPTION_LIMIT + 3);
    }

    #[test]
    fn test_empty_text() {
        let parsed = parser().parse_at("", 2025);
        assert_eq!(parsed, ParsedResume::default());
    }

    #[test]
    fn test_term_boundaries() {
        assert!(contains_term("rust, c++, go", "c++"));
        assert!(contains_term("rust, c++, go", "go"));
        assert!(!contains_term("google cloud", "go"));
        assert!(!contains_term("javascript", "java"));
    }
}
