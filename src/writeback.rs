use scraper::{Html, Selector};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::resolver::{is_affirmative, match_choice, ResolvedValue};
use crate::scanner::{ControlKind, ElementHandle, FieldBinding, SelectOption, CANDIDATE_SELECTOR};

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("element {0} is no longer on the page")]
    ElementMissing(String),
    #[error("{0} controls cannot be written here")]
    Unsupported(String),
    #[error("no option matches '{0}'")]
    NoMatchingOption(String),
    #[error("browser driver error: {0}")]
    Driver(String),
}

impl WriteError {
    pub fn missing(element: &ElementHandle) -> Self {
        WriteError::ElementMissing(describe(element))
    }
}

pub fn describe(element: &ElementHandle) -> String {
    match element.identifier() {
        Some(id) => format!("{} '{}'", element.tag, id),
        None => format!("{} #{}", element.tag, element.ordinal),
    }
}

/// The write primitives a page must offer.
pub trait FormSurface {
    /// Writes through the native value setter, then dispatches `input`,
    /// `change` and `blur`, in that order.
    fn set_text(&mut self, element: &ElementHandle, value: &str) -> Result<(), WriteError>;

    /// Selects the option at `index` and dispatches `change`.
    fn select_index(&mut self, element: &ElementHandle, index: usize) -> Result<(), WriteError>;

    /// Checks a radio button or checkbox and dispatches `change`.
    fn check(&mut self, element: &ElementHandle) -> Result<(), WriteError>;

    fn highlight(&mut self, _element: &ElementHandle) -> Result<(), WriteError> {
        Ok(())
    }

    fn attach_file(&mut self, element: &ElementHandle, _path: &Path) -> Result<(), WriteError> {
        Err(WriteError::Unsupported(format!("file input {}", describe(element))))
    }
}

/// Case-insensitive exact match on option text or value, then substring.
pub fn select_match(options: &[SelectOption], wanted: &str) -> Option<usize> {
    let wanted = wanted.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    let lowered: Vec<(String, String)> = options
        .iter()
        .map(|o| (o.text.trim().to_lowercase(), o.value.trim().to_lowercase()))
        .collect();
    lowered
        .iter()
        .position(|(text, value)| *text == wanted || *value == wanted)
        .or_else(|| {
            lowered.iter().position(|(text, value)| {
                (!text.is_empty() && text.contains(&wanted)) || (!value.is_empty() && value.contains(&wanted))
            })
        })
}

/// Writes `value` into the bound control. `Ok(false)` means the control
/// was deliberately left alone, such as an unticked checkbox.
pub fn apply(surface: &mut dyn FormSurface, binding: &FieldBinding, value: &ResolvedValue) -> Result<bool, WriteError> {
    let element = &binding.element;
    let hints = &binding.hints;

    match hints.kind {
        ControlKind::Text | ControlKind::TextArea | ControlKind::ContentEditable => {
            surface.set_text(element, &value.text)?;
        }
        ControlKind::Select => {
            let index = select_match(&hints.options, &value.text)
                .ok_or_else(|| WriteError::NoMatchingOption(value.text.clone()))?;
            surface.select_index(element, index)?;
        }
        ControlKind::Radio => {
            let index = match_choice(&hints.choices, value)
                .ok_or_else(|| WriteError::NoMatchingOption(value.text.clone()))?;
            surface.check(&hints.choices[index].element)?;
        }
        ControlKind::Checkbox if hints.choices.len() > 1 => {
            let index = match_choice(&hints.choices, value)
                .ok_or_else(|| WriteError::NoMatchingOption(value.text.clone()))?;
            surface.check(&hints.choices[index].element)?;
        }
        ControlKind::Checkbox => {
            if !is_affirmative(&value.text) {
                debug!("Leaving checkbox {} unticked for '{}'", describe(element), value.text);
                return Ok(false);
            }
            surface.check(element)?;
        }
        ControlKind::File => {
            surface.attach_file(element, Path::new(&value.text))?;
        }
    }

    if let Err(e) = surface.highlight(element) {
        debug!("Highlight failed for {}: {}", describe(element), e);
    }
    Ok(true)
}

// --- In-memory surface ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormEvent {
    Input,
    Change,
    Blur,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    pub tag: String,
    pub value: String,
    pub checked: bool,
    pub selected: Option<usize>,
    pub option_count: usize,
    pub events: Vec<FormEvent>,
    pub highlighted: bool,
}

/// A parsed page that records writes instead of performing them.
/// Controls are addressed by their ordinal in the candidate query.
#[derive(Debug, Clone, Default)]
pub struct FormSnapshot {
    controls: BTreeMap<usize, ControlState>,
}

impl FormSnapshot {
    pub fn from_document(document: &Html) -> Self {
        let mut controls = BTreeMap::new();
        let (Ok(candidates), Ok(options)) = (Selector::parse(CANDIDATE_SELECTOR), Selector::parse("option")) else {
            return Self { controls };
        };
        for (ordinal, element) in document.select(&candidates).enumerate() {
            let value = element.value();
            controls.insert(
                ordinal,
                ControlState {
                    tag: value.name().to_string(),
                    value: value.attr("value").unwrap_or_default().to_string(),
                    checked: value.attr("checked").is_some(),
                    option_count: element.select(&options).count(),
                    ..Default::default()
                },
            );
        }
        Self { controls }
    }

    pub fn control(&self, ordinal: usize) -> Option<&ControlState> {
        self.controls.get(&ordinal)
    }

    fn locate(&mut self, element: &ElementHandle) -> Result<&mut ControlState, WriteError> {
        match self.controls.get_mut(&element.ordinal) {
            Some(state) if state.tag == element.tag => Ok(state),
            _ => Err(WriteError::missing(element)),
        }
    }
}

impl FormSurface for FormSnapshot {
    fn set_text(&mut self, element: &ElementHandle, value: &str) -> Result<(), WriteError> {
        let state = self.locate(element)?;
        state.value = value.to_string();
        state
            .events
            .extend([FormEvent::Input, FormEvent::Change, FormEvent::Blur]);
        Ok(())
    }

    fn select_index(&mut self, element: &ElementHandle, index: usize) -> Result<(), WriteError> {
        let state = self.locate(element)?;
        if index >= state.option_count {
            return Err(WriteError::NoMatchingOption(format!("option #{}", index)));
        }
        state.selected = Some(index);
        state.events.push(FormEvent::Change);
        Ok(())
    }

    fn check(&mut self, element: &ElementHandle) -> Result<(), WriteError> {
        let state = self.locate(element)?;
        state.checked = true;
        state.events.push(FormEvent::Change);
        Ok(())
    }

    fn highlight(&mut self, element: &ElementHandle) -> Result<(), WriteError> {
        self.locate(element)?.highlighted = true;
        Ok(())
    }

    fn attach_file(&mut self, element: &ElementHandle, path: &Path) -> Result<(), WriteError> {
        let state = self.locate(element)?;
        state.value = path.display().to_string();
        state.events.push(FormEvent::Change);
        Ok(())
    }
}
