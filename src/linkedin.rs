use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::models::{CapturedProfile, Education, Experience, Profile};
use crate::scanner::{collapse_whitespace, extract_first};

const IMAGE_SELECTORS: &[&str] = &[
    "img.pv-top-card-profile-picture__image",
    "img.profile-photo-edit__preview",
    ".pv-top-card__photo img",
    r#"button img[alt*="profile photo"]"#,
    r#"img[alt*="profile picture"]"#,
];

const NAME_SELECTORS: &[&str] = &[
    "h1.text-heading-xlarge",
    ".pv-text-details__left-panel h1",
    "h1.top-card-layout__title",
    ".pv-top-card h1",
    "h1.break-words",
];

const HEADLINE_SELECTORS: &[&str] = &[
    ".text-body-medium.break-words",
    ".pv-text-details__left-panel .text-body-medium",
    ".top-card-layout__headline",
    ".pv-top-card .text-body-medium",
];

const LOCATION_SELECTORS: &[&str] = &[
    ".text-body-small.inline.t-black--light.break-words",
    ".pv-text-details__left-panel .text-body-small",
    ".top-card-layout__first-subline",
];

const ABOUT_SELECTORS: &[&str] = &[
    r#"#about ~ * .display-flex.ph5.pv3 span[aria-hidden="true"]"#,
    r#".pv-shared-text-with-see-more span[aria-hidden="true"]"#,
    r#"#about ~ * .inline-show-more-text span[aria-hidden="true"]"#,
    ".pv-about-section .pv-about__summary-text",
];

const NETWORK_SELECTOR: &str = r#"a[href*="/in/"], span, .pv-top-card--list span"#;
const SKILL_SELECTOR: &str = r#".pvs-list__item--line-separated span[aria-hidden="true"]"#;
const LIST_ITEM_SELECTOR: &str = "li.artdeco-list__item";
const ITEM_TITLE_SELECTOR: &str = r#".display-flex.align-items-center.mr1.hoverable-link-text.t-bold span[aria-hidden="true"]"#;
const ITEM_SUBTITLE_SELECTOR: &str = r#".t-14.t-normal span[aria-hidden="true"]"#;
const ITEM_CAPTION_SELECTOR: &str = r#".t-14.t-normal.t-black--light .pvs-entity__caption-wrapper span[aria-hidden="true"]"#;
const ITEM_DESCRIPTION_SELECTOR: &str = r#".inline-show-more-text span[aria-hidden="true"]"#;

pub fn is_profile_url(url: &str) -> bool {
    url.to_lowercase().contains("linkedin.com/in/")
}

/// Reads a LinkedIn profile page into a session cache entry.
pub fn scrape_profile(document: &Html, url: &str, max_skills: usize) -> Result<CapturedProfile> {
    if !is_profile_url(url) {
        return Err(anyhow!("Not a LinkedIn profile page: {}", url));
    }

    let mut profile = Profile::default();
    profile.full_name = extract_first(document, NAME_SELECTORS, None).unwrap_or_default();
    let names: Vec<&str> = profile.full_name.split_whitespace().collect();
    if let (Some(first), Some(last)) = (names.first(), names.last()) {
        profile.first_name = first.to_string();
        if names.len() > 1 {
            profile.last_name = last.to_string();
        }
    }
    profile.headline = extract_first(document, HEADLINE_SELECTORS, None).unwrap_or_default();
    profile.location = extract_first(document, LOCATION_SELECTORS, None).unwrap_or_default();
    profile.profile_image_url = extract_first(document, IMAGE_SELECTORS, Some("src")).unwrap_or_default();
    profile.summary = extract_first(document, ABOUT_SELECTORS, None).unwrap_or_default();
    profile.linked_in_url = url.to_string();

    let (connections, followers) = network_info(document);
    profile.connections = connections;
    profile.followers = followers;

    for skill in skills(document) {
        profile.add_skill(&skill, max_skills);
    }
    profile.experience = experience(document);
    profile.education = education(document);

    debug!(
        "Scraped {}: {} positions, {} schools, {} skills",
        url,
        profile.experience.len(),
        profile.education.len(),
        profile.skills().len()
    );
    Ok(CapturedProfile::new(url, profile, "linkedin"))
}

fn text_of(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

fn first_text(scope: ElementRef<'_>, css: &str) -> String {
    Selector::parse(css)
        .ok()
        .and_then(|sel| scope.select(&sel).next())
        .map(text_of)
        .unwrap_or_default()
}

/// The parent of the element with this id, which holds the section's list.
fn section<'a>(document: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(&format!("#{}", id)).ok()?;
    let anchor = document.select(&sel).next()?;
    anchor.parent().and_then(ElementRef::wrap)
}

fn network_info(document: &Html) -> (String, String) {
    let mut connections = String::new();
    let mut followers = String::new();
    let Ok(sel) = Selector::parse(NETWORK_SELECTOR) else {
        return (connections, followers);
    };
    for element in document.select(&sel) {
        let text = text_of(element);
        let lower = text.to_lowercase();
        if connections.is_empty() && lower.contains("connection") {
            connections = text.clone();
        }
        if followers.is_empty() && lower.contains("follower") {
            followers = text;
        }
        if !connections.is_empty() && !followers.is_empty() {
            break;
        }
    }
    (connections, followers)
}

/// Skill names sit at even positions; odd ones are endorsement captions.
fn skills(document: &Html) -> Vec<String> {
    let (Some(scope), Ok(sel)) = (section(document, "skills"), Selector::parse(SKILL_SELECTOR)) else {
        return Vec::new();
    };
    let mut skills: Vec<String> = Vec::new();
    for (index, element) in scope.select(&sel).enumerate() {
        let skill = text_of(element);
        if index % 2 == 0 && !skill.is_empty() && !skills.contains(&skill) {
            skills.push(skill);
        }
    }
    skills
}

fn list_items<'a>(document: &'a Html, id: &str) -> Vec<ElementRef<'a>> {
    match (section(document, id), Selector::parse(LIST_ITEM_SELECTOR)) {
        (Some(scope), Ok(sel)) => scope.select(&sel).collect(),
        _ => Vec::new(),
    }
}

fn experience(document: &Html) -> Vec<Experience> {
    list_items(document, "experience")
        .into_iter()
        .filter_map(|item| {
            let title = first_text(item, ITEM_TITLE_SELECTOR);
            let company = first_text(item, ITEM_SUBTITLE_SELECTOR)
                .split('·')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            if title.is_empty() || company.is_empty() {
                return None;
            }
            Some(Experience {
                title,
                company,
                duration: first_text(item, ITEM_CAPTION_SELECTOR),
                location: String::new(),
                description: first_text(item, ITEM_DESCRIPTION_SELECTOR),
            })
        })
        .collect()
}

fn education(document: &Html) -> Vec<Education> {
    list_items(document, "education")
        .into_iter()
        .filter_map(|item| {
            let school = first_text(item, ITEM_TITLE_SELECTOR);
            let degree = first_text(item, ITEM_SUBTITLE_SELECTOR);
            if school.is_empty() && degree.is_empty() {
                return None;
            }
            Some(Education {
                school,
                degree,
                discipline: String::new(),
                years: first_text(item, ITEM_CAPTION_SELECTOR),
            })
        })
        .collect()
}
