use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::classifier::{Classifier, Signals};
use crate::models::{ApplicationQuestion, JobPosting};
use crate::patterns::FieldType;
use crate::tracking::FieldMapping;

/// Every element a binding can point at. Ordinals index into this query,
/// so the live browser must run the same selector.
pub const CANDIDATE_SELECTOR: &str = "input, textarea, select, [contenteditable]";

const CONTROL_SELECTOR: &str = "input, textarea, select";
const CONTAINER_LABEL_SELECTORS: &[&str] = &[
    "legend",
    "label",
    ".label",
    "[class*=\"question\"]",
    "[class*=\"label\"]",
];
const QUESTION_SELECTOR: &str = "label, legend, .question, [class*=\"question\"]";
const CONTAINER_DEPTH: usize = 3;
const DESCRIPTION_LIMIT: usize = 500;
const DEFAULT_JOB_TITLE: &str = "Job Application Form";

// --- Job metadata selectors, platform-specific first ---

const TITLE_SELECTORS: &[&str] = &[
    // Hireology
    "h1.job-title",
    ".job-posting-title",
    "[data-qa=\"job-title\"]",
    // Workday
    "h2[data-automation-id=\"jobPostingHeader\"]",
    ".job-title h2",
    // Greenhouse
    ".app-title",
    "#header h1",
    // Lever
    ".posting-headline h2",
    "h1",
    "h2",
    ".job-title",
    ".position-title",
    "[class*=\"job-title\"]",
    "[class*=\"position\"]",
    ".posting-headline",
    "[role=\"heading\"][aria-level=\"1\"]",
];

const COMPANY_SELECTORS: &[&str] = &[
    ".company-name",
    "[data-qa=\"company-name\"]",
    "[data-automation-id=\"company\"]",
    ".company",
    "#company_name",
    "[class*=\"company\"]",
    ".employer-name",
    ".organization",
    "[data-company]",
    "meta[property=\"og:site_name\"]",
];

const LOCATION_SELECTORS: &[&str] = &[
    ".job-location",
    "[data-qa=\"location\"]",
    "[data-automation-id=\"location\"]",
    ".location",
    "[class*=\"location\"]",
    "[class*=\"city\"]",
    ".office-location",
];

const SALARY_SELECTORS: &[&str] = &[
    ".salary",
    "[class*=\"salary\"]",
    "[class*=\"compensation\"]",
    "[class*=\"pay\"]",
    ".wage",
    "[data-qa=\"salary\"]",
    "[data-automation-id=\"salary\"]",
];

const DESCRIPTION_SELECTORS: &[&str] = &[
    ".job-description",
    "[class*=\"description\"]",
    "#job-description",
    ".posting-description",
    "[data-qa=\"description\"]",
    "meta[name=\"description\"]",
];

/// Locates one control in a parsed snapshot or a live page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub ordinal: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub tag: String,
}

impl ElementHandle {
    fn from_element(ordinal: usize, element: ElementRef<'_>) -> Self {
        let value = element.value();
        Self {
            ordinal,
            id: non_empty_attr(element, "id"),
            name: non_empty_attr(element, "name"),
            tag: value.name().to_string(),
        }
    }

    /// The id, else the name.
    pub fn identifier(&self) -> Option<&str> {
        self.id.as_deref().or(self.name.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Text,
    TextArea,
    ContentEditable,
    Select,
    Radio,
    Checkbox,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub text: String,
    pub value: String,
}

/// One radio button or checkbox in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub value: String,
    pub element: ElementHandle,
}

/// What the resolver needs to know about the control besides its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hints {
    pub kind: ControlKind,
    pub placeholder: Option<String>,
    pub max_length: Option<usize>,
    pub size: Option<usize>,
    pub options: Vec<SelectOption>,
    pub choices: Vec<Choice>,
}

impl Hints {
    pub fn new(kind: ControlKind) -> Self {
        Self {
            kind,
            placeholder: None,
            max_length: None,
            size: None,
            options: Vec::new(),
            choices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingSource {
    Cache,
    Pattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldBinding {
    pub element: ElementHandle,
    pub field_type: FieldType,
    pub raw_label: String,
    pub confidence: Confidence,
    pub required: bool,
    pub hints: Hints,
    pub source: BindingSource,
}

impl FieldBinding {
    /// Key used for de-duplication and the field-mapping cache.
    pub fn identifier(&self) -> Option<&str> {
        self.element.identifier()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageScan {
    pub bindings: Vec<FieldBinding>,
    /// Labels of controls no pattern matched. They are left untouched.
    pub unclassified: Vec<String>,
    pub job: JobPosting,
}

// --- Document index ---

/// Lookups built once per document so label resolution stays linear.
pub struct DocumentIndex<'a> {
    labels_for: HashMap<String, String>,
    by_id: HashMap<String, ElementRef<'a>>,
    container_selectors: Vec<Selector>,
    controls: Option<Selector>,
}

impl<'a> DocumentIndex<'a> {
    pub fn build(document: &'a Html) -> Self {
        let mut labels_for = HashMap::new();
        if let Some(sel) = selector("label[for]") {
            for label in document.select(&sel) {
                if let Some(target) = label.value().attr("for") {
                    if let Some(text) = labelled(&own_text(label)) {
                        labels_for.entry(target.to_string()).or_insert(text);
                    }
                }
            }
        }

        let mut by_id = HashMap::new();
        if let Some(sel) = selector("[id]") {
            for element in document.select(&sel) {
                if let Some(id) = element.value().attr("id") {
                    by_id.entry(id.to_string()).or_insert(element);
                }
            }
        }

        Self {
            labels_for,
            by_id,
            container_selectors: CONTAINER_LABEL_SELECTORS
                .iter()
                .filter_map(|css| selector(css))
                .collect(),
            controls: selector(CONTROL_SELECTOR),
        }
    }

    fn contains_control(&self, element: ElementRef<'_>) -> bool {
        match &self.controls {
            Some(sel) => element.select(sel).next().is_some(),
            None => false,
        }
    }

    /// Whether `container` holds a visible control other than `element`
    /// or the members of its radio/checkbox group.
    fn has_foreign_control(&self, container: ElementRef<'_>, element: ElementRef<'_>) -> bool {
        let Some(sel) = &self.controls else {
            return false;
        };
        let group = group_name(element);
        container.select(sel).any(|control| {
            control != element
                && control.value().attr("type") != Some("hidden")
                && (group.is_none() || group_name(control) != group)
        })
    }
}

fn group_name<'a>(element: ElementRef<'a>) -> Option<&'a str> {
    let value = element.value();
    if value.name() != "input" {
        return None;
    }
    let input_type = value.attr("type")?;
    if !input_type.eq_ignore_ascii_case("radio") && !input_type.eq_ignore_ascii_case("checkbox") {
        return None;
    }
    value.attr("name").map(str::trim).filter(|n| !n.is_empty())
}

// --- Label strategies ---

/// One way of finding a control's human-readable label.
pub trait LabelStrategy {
    fn confidence(&self) -> Confidence;
    fn try_extract<'a>(&self, element: ElementRef<'a>, index: &DocumentIndex<'a>) -> Option<String>;
}

struct ForAttribute;
struct AncestorLabel;
struct PreviousSiblingLabel;
struct ContainerLabel;
struct AriaLabel;
struct AriaLabelledBy;
struct DataLabel;
struct Placeholder;
struct NameTokens;

/// Tried in order; the first non-empty label wins.
const LABEL_STRATEGIES: &[&dyn LabelStrategy] = &[
    &ForAttribute,
    &AncestorLabel,
    &PreviousSiblingLabel,
    &ContainerLabel,
    &AriaLabel,
    &AriaLabelledBy,
    &DataLabel,
    &Placeholder,
    &NameTokens,
];

impl LabelStrategy for ForAttribute {
    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn try_extract<'a>(&self, element: ElementRef<'a>, index: &DocumentIndex<'a>) -> Option<String> {
        let id = element.value().attr("id")?;
        index.labels_for.get(id).cloned()
    }
}

impl LabelStrategy for AncestorLabel {
    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn try_extract<'a>(&self, element: ElementRef<'a>, _index: &DocumentIndex<'a>) -> Option<String> {
        let label = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "label")?;
        labelled(&own_text(label))
    }
}

impl LabelStrategy for PreviousSiblingLabel {
    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    fn try_extract<'a>(&self, element: ElementRef<'a>, index: &DocumentIndex<'a>) -> Option<String> {
        let sibling = element.prev_siblings().find_map(ElementRef::wrap)?;
        if sibling.value().name() != "label" || index.contains_control(sibling) {
            return None;
        }
        labelled(&own_text(sibling))
    }
}

impl LabelStrategy for ContainerLabel {
    fn confidence(&self) -> Confidence {
        Confidence::Medium
    }

    fn try_extract<'a>(&self, element: ElementRef<'a>, index: &DocumentIndex<'a>) -> Option<String> {
        for container in element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take(CONTAINER_DEPTH)
        {
            if index.has_foreign_control(container, element) {
                break;
            }
            for sel in &index.container_selectors {
                for candidate in container.select(sel) {
                    // Labels with `for` belong to a specific control.
                    if candidate == container
                        || candidate.value().attr("for").is_some()
                        || index.contains_control(candidate)
                    {
                        continue;
                    }
                    if let Some(text) = labelled(&own_text(candidate)) {
                        return Some(text);
                    }
                }
            }
        }
        None
    }
}

impl LabelStrategy for AriaLabel {
    fn confidence(&self) -> Confidence {
        Confidence::Low
    }

    fn try_extract<'a>(&self, element: ElementRef<'a>, _index: &DocumentIndex<'a>) -> Option<String> {
        element.value().attr("aria-label").and_then(labelled)
    }
}

impl LabelStrategy for AriaLabelledBy {
    fn confidence(&self) -> Confidence {
        Confidence::High
    }

    fn try_extract<'a>(&self, element: ElementRef<'a>, index: &DocumentIndex<'a>) -> Option<String> {
        let ids = element.value().attr("aria-labelledby")?;
        let text = ids
            .split_whitespace()
            .filter_map(|id| index.by_id.get(id))
            .map(|el| own_text(*el))
            .collect::<Vec<_>>()
            .join(" ");
        labelled(&text)
    }
}

impl LabelStrategy for DataLabel {
    fn confidence(&self) -> Confidence {
        Confidence::Low
    }

    fn try_extract<'a>(&self, element: ElementRef<'a>, _index: &DocumentIndex<'a>) -> Option<String> {
        let value = element.value();
        value
            .attr("data-label")
            .or_else(|| value.attr("data-field-name"))
            .and_then(labelled)
    }
}

impl LabelStrategy for Placeholder {
    fn confidence(&self) -> Confidence {
        Confidence::Low
    }

    fn try_extract<'a>(&self, element: ElementRef<'a>, _index: &DocumentIndex<'a>) -> Option<String> {
        element.value().attr("placeholder").and_then(labelled)
    }
}

impl LabelStrategy for NameTokens {
    fn confidence(&self) -> Confidence {
        Confidence::Low
    }

    fn try_extract<'a>(&self, element: ElementRef<'a>, _index: &DocumentIndex<'a>) -> Option<String> {
        element.value().attr("name").and_then(|s| labelled(&tokenize_name(s)))
    }
}

/// Runs the strategy list and returns the label with its confidence.
pub fn resolve_label<'a>(element: ElementRef<'a>, index: &DocumentIndex<'a>) -> Option<(String, Confidence)> {
    LABEL_STRATEGIES.iter().find_map(|strategy| {
        strategy
            .try_extract(element, index)
            .map(|label| (label, strategy.confidence()))
    })
}

/// Question text for a radio or checkbox group: a fieldset legend, else a
/// nearby label that is not an option label.
fn group_question<'a>(element: ElementRef<'a>, index: &DocumentIndex<'a>) -> Option<String> {
    let legend = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "fieldset")
        .and_then(|fieldset| {
            fieldset
                .children()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "legend")
        })
        .and_then(|legend| labelled(&own_text(legend)));
    legend.or_else(|| ContainerLabel.try_extract(element, index))
}

/// Text shown next to a single radio button or checkbox.
fn choice_label<'a>(element: ElementRef<'a>, index: &DocumentIndex<'a>) -> String {
    ForAttribute
        .try_extract(element, index)
        .or_else(|| AncestorLabel.try_extract(element, index))
        .or_else(|| AriaLabel.try_extract(element, index))
        .or_else(|| {
            let mut text = String::new();
            for node in element.next_siblings() {
                match node.value() {
                    Node::Text(t) => text.push_str(t),
                    Node::Element(el) if matches!(el.name(), "label" | "span") => {
                        if let Some(sibling) = ElementRef::wrap(node) {
                            text.push_str(&own_text(sibling));
                        }
                    }
                    Node::Element(_) => break,
                    _ => {}
                }
                text.push(' ');
            }
            labelled(&text)
        })
        .or_else(|| non_empty_attr(element, "value"))
        .unwrap_or_default()
}

// --- Scanning ---

struct Candidate<'a> {
    ordinal: usize,
    element: ElementRef<'a>,
    kind: ControlKind,
}

fn control_kind(element: ElementRef<'_>) -> Option<ControlKind> {
    let value = element.value();
    match value.name() {
        "textarea" => Some(ControlKind::TextArea),
        "select" => Some(ControlKind::Select),
        "input" => {
            let input_type = value.attr("type").unwrap_or("text").trim().to_lowercase();
            match input_type.as_str() {
                "hidden" | "submit" | "button" | "image" | "reset" => None,
                "radio" => Some(ControlKind::Radio),
                "checkbox" => Some(ControlKind::Checkbox),
                "file" => Some(ControlKind::File),
                _ => Some(ControlKind::Text),
            }
        }
        _ => match value.attr("contenteditable") {
            Some(v) if v.eq_ignore_ascii_case("false") => None,
            Some(_) => Some(ControlKind::ContentEditable),
            None => None,
        },
    }
}

fn is_hidden(element: ElementRef<'_>) -> bool {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|el| {
            let value = el.value();
            value.attr("hidden").is_some()
                || value.attr("aria-hidden") == Some("true")
                || value.attr("style").map(style_hides).unwrap_or(false)
        })
}

fn style_hides(style: &str) -> bool {
    let compact: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    compact.contains("display:none") || compact.contains("visibility:hidden")
}

fn is_disabled(element: ElementRef<'_>) -> bool {
    element.value().attr("disabled").is_some()
}

fn is_required(element: ElementRef<'_>, raw_label: &str) -> bool {
    let value = element.value();
    let lower = raw_label.to_lowercase();
    value.attr("required").is_some()
        || value.attr("aria-required") == Some("true")
        || lower.contains('*')
        || lower.contains("required")
}

fn signals_for(element: ElementRef<'_>, label: &str) -> Signals {
    let value = element.value();
    Signals {
        name: value.attr("name").unwrap_or_default().to_string(),
        id: value.attr("id").unwrap_or_default().to_string(),
        placeholder: value.attr("placeholder").unwrap_or_default().to_string(),
        aria_label: value.attr("aria-label").unwrap_or_default().to_string(),
        class_name: value.attr("class").unwrap_or_default().to_string(),
        label: label.to_string(),
    }
}

fn hints_for(element: ElementRef<'_>, kind: ControlKind) -> Hints {
    let value = element.value();
    let mut hints = Hints::new(kind);
    hints.placeholder = non_empty_attr(element, "placeholder");
    hints.max_length = value.attr("maxlength").and_then(|v| v.trim().parse().ok());
    hints.size = value.attr("size").and_then(|v| v.trim().parse().ok());
    if kind == ControlKind::Select {
        if let Some(sel) = selector("option") {
            hints.options = element
                .select(&sel)
                .map(|option| {
                    let text = collapse_whitespace(&option.text().collect::<String>());
                    let value = option
                        .value()
                        .attr("value")
                        .map(str::to_string)
                        .unwrap_or_else(|| text.clone());
                    SelectOption { text, value }
                })
                .collect();
        }
    }
    hints
}

/// Scans a parsed page for fillable controls and job metadata.
///
/// `cached` holds learned mappings for the page's domain, keyed by element id
/// or name. A hit there wins over the pattern classifier.
pub fn scan(
    document: &Html,
    url: &str,
    classifier: &Classifier,
    cached: Option<&HashMap<String, FieldMapping>>,
) -> PageScan {
    let index = DocumentIndex::build(document);
    let candidates = collect_candidates(document);

    let mut groups: HashMap<String, Vec<&Candidate<'_>>> = HashMap::new();
    for candidate in &candidates {
        if let Some(group) = group_key(candidate) {
            groups.entry(group).or_default().push(candidate);
        }
    }

    let mut seen = HashSet::new();
    let mut bindings = Vec::new();
    let mut unclassified = Vec::new();

    for candidate in &candidates {
        let element = candidate.element;
        let handle = ElementHandle::from_element(candidate.ordinal, element);
        let dedup_key = match group_key(candidate) {
            Some(group) => format!("group:{}", group),
            None => handle
                .identifier()
                .map(str::to_string)
                .unwrap_or_else(|| format!("ordinal:{}", candidate.ordinal)),
        };
        if !seen.insert(dedup_key) {
            continue;
        }

        let mut hints = hints_for(element, candidate.kind);
        let (raw_label, confidence) = match candidate.kind {
            ControlKind::Radio | ControlKind::Checkbox => {
                let members = group_key(candidate)
                    .and_then(|g| groups.get(&g).cloned())
                    .unwrap_or_else(|| vec![candidate]);
                hints.choices = members
                    .iter()
                    .map(|m| Choice {
                        label: choice_label(m.element, &index),
                        value: m.element.value().attr("value").unwrap_or("on").to_string(),
                        element: ElementHandle::from_element(m.ordinal, m.element),
                    })
                    .collect();
                let own = hints.choices.first().map(|c| c.label.clone()).unwrap_or_default();
                let question = group_question(element, &index);
                let label = match (candidate.kind, question, members.len()) {
                    (ControlKind::Checkbox, Some(q), 1) => format!("{} {}", q, own),
                    (ControlKind::Checkbox, None, 1) => own,
                    (_, Some(q), _) => q,
                    (_, None, _) => String::new(),
                };
                (label, Confidence::Medium)
            }
            _ => resolve_label(element, &index).unwrap_or((String::new(), Confidence::Low)),
        };
        let label = clean_label(&raw_label);
        let required = is_required(element, &raw_label);

        if let Some(mapping) = handle.identifier().and_then(|id| cached.and_then(|c| c.get(id))) {
            debug!("Cache hit for {:?}: {}", handle.identifier(), mapping.field_type);
            bindings.push(FieldBinding {
                element: handle,
                field_type: mapping.field_type,
                raw_label: mapping.label.clone(),
                confidence: Confidence::High,
                required,
                hints,
                source: BindingSource::Cache,
            });
            continue;
        }

        let signals = signals_for(element, &label);
        let field_type = match candidate.kind {
            ControlKind::File => classifier.classify_file(&signals),
            _ => classifier.classify(&signals),
        };

        match field_type {
            Some(field_type) => bindings.push(FieldBinding {
                element: handle,
                field_type,
                raw_label: label,
                confidence,
                required,
                hints,
                source: BindingSource::Pattern,
            }),
            None => {
                let shown = if label.is_empty() {
                    handle.identifier().unwrap_or(handle.tag.as_str()).to_string()
                } else {
                    label
                };
                debug!("No pattern match for control {}: {}", candidate.ordinal, shown);
                unclassified.push(shown);
            }
        }
    }

    debug!(
        "Scanned {}: {} bindings, {} unclassified",
        url,
        bindings.len(),
        unclassified.len()
    );

    PageScan {
        bindings,
        unclassified,
        job: extract_job(document, url, &index),
    }
}

fn collect_candidates(document: &Html) -> Vec<Candidate<'_>> {
    let Some(sel) = selector(CANDIDATE_SELECTOR) else {
        return Vec::new();
    };
    document
        .select(&sel)
        .enumerate()
        .filter_map(|(ordinal, element)| {
            let kind = control_kind(element)?;
            if is_disabled(element) || is_hidden(element) {
                return None;
            }
            Some(Candidate {
                ordinal,
                element,
                kind,
            })
        })
        .collect()
}

/// Radios group by name; named checkboxes sharing a name group too.
fn group_key(candidate: &Candidate<'_>) -> Option<String> {
    match candidate.kind {
        ControlKind::Radio | ControlKind::Checkbox => {
            let name = candidate.element.value().attr("name")?.trim();
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        }
        _ => None,
    }
}

// --- Job metadata ---

/// First non-empty match over `selectors`, whitespace collapsed.
///
/// With `attribute`, that attribute is read; `meta[...]` selectors read
/// `content`; everything else reads text.
pub fn extract_first(document: &Html, selectors: &[&str], attribute: Option<&str>) -> Option<String> {
    for css in selectors {
        let Some(sel) = selector(css) else {
            debug!("Skipping invalid selector {}", css);
            continue;
        };
        let Some(element) = document.select(&sel).next() else {
            continue;
        };
        let raw = match attribute {
            Some(attr) => element.value().attr(attr).unwrap_or_default().to_string(),
            None if css.starts_with("meta[") => element.value().attr("content").unwrap_or_default().to_string(),
            None => element.text().collect::<Vec<_>>().join(" "),
        };
        let text = collapse_whitespace(&raw);
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

fn extract_job(document: &Html, url: &str, index: &DocumentIndex<'_>) -> JobPosting {
    let domain = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    JobPosting {
        url: url.to_string(),
        domain,
        title: extract_first(document, TITLE_SELECTORS, None).unwrap_or_else(|| DEFAULT_JOB_TITLE.to_string()),
        company: extract_first(document, COMPANY_SELECTORS, None).unwrap_or_default(),
        location: extract_first(document, LOCATION_SELECTORS, None).unwrap_or_default(),
        salary: extract_first(document, SALARY_SELECTORS, None).unwrap_or_default(),
        description: extract_first(document, DESCRIPTION_SELECTORS, None)
            .map(|d| cap_chars(&d, DESCRIPTION_LIMIT))
            .unwrap_or_default(),
        questions: extract_questions(document, index),
    }
}

/// Labels and question blocks, with the control each one belongs to.
pub fn extract_questions(document: &Html, index: &DocumentIndex<'_>) -> Vec<ApplicationQuestion> {
    let (Some(sel), Some(controls)) = (selector(QUESTION_SELECTOR), selector(CONTROL_SELECTOR)) else {
        return Vec::new();
    };
    let mut questions = Vec::new();
    for (i, label) in document.select(&sel).enumerate() {
        let text = collapse_whitespace(&own_text(label));
        if text.chars().count() < 3 {
            continue;
        }

        let target = label
            .value()
            .attr("for")
            .and_then(|id| index.by_id.get(id).copied())
            .or_else(|| label.select(&controls).next());

        let mut question = ApplicationQuestion {
            text: collapse_whitespace(&text.replace('*', "")),
            input_type: "unknown".to_string(),
            required: false,
            id: String::new(),
            index: i,
        };
        if let Some(input) = target {
            let value = input.value();
            question.input_type = value.name().to_string();
            question.required = value.attr("required").is_some() || value.attr("aria-required") == Some("true");
            question.id = value
                .attr("id")
                .or_else(|| value.attr("name"))
                .unwrap_or_default()
                .to_string();
        }
        if !question.required {
            let lower = text.to_lowercase();
            question.required = lower.contains('*') || lower.contains("required") || lower.contains("mandatory");
        }
        questions.push(question);
    }
    questions
}

// --- Text helpers ---

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Collapsed text, or `None` when nothing is left once markers are stripped.
fn labelled(s: &str) -> Option<String> {
    let text = collapse_whitespace(s);
    if clean_label(&text).is_empty() { None } else { Some(text) }
}

fn non_empty_attr(element: ElementRef<'_>, attr: &str) -> Option<String> {
    element
        .value()
        .attr(attr)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Text under `element`, skipping option lists and script bodies.
fn own_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    collapse_whitespace(&out)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) => {
                if matches!(el.name(), "select" | "option" | "textarea" | "script" | "style") {
                    continue;
                }
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace and strips required-markers at either end.
pub fn clean_label(s: &str) -> String {
    collapse_whitespace(s)
        .trim_matches(|c: char| c == '*' || c.is_whitespace())
        .to_string()
}

/// "applicant_firstName[0]" becomes "applicant first name 0".
pub fn tokenize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    let mut prev_lower = false;
    for c in name.chars() {
        if matches!(c, '_' | '-' | '.' | '[' | ']' | ':' | '/') {
            out.push(' ');
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower {
            out.push(' ');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        out.extend(c.to_lowercase());
    }
    collapse_whitespace(&out)
}

pub fn cap_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        let head: String = s.chars().take(limit).collect();
        format!("{}...", head)
    }
}
