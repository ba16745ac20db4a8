use serde::{Deserialize, Serialize};

/// A US phone number stored as its canonical 10 digits.
///
/// The dashed and parenthesized forms are views over the same digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Phone {
    digits: String,
}

/// Which rendering a form field expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneFormat {
    Raw,
    Dashed,
    Parenthesized,
}

impl Phone {
    /// Strips everything but digits, drops a leading country code "1" from
    /// 11-digit numbers, and accepts the result only if exactly 10 digits remain.
    pub fn parse(input: &str) -> Option<Self> {
        let mut digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() == 11 && digits.starts_with('1') {
            digits.remove(0);
        }
        if digits.len() == 10 {
            Some(Self { digits })
        } else {
            None
        }
    }

    pub fn raw(&self) -> &str {
        &self.digits
    }

    pub fn dashed(&self) -> String {
        format!("{}-{}-{}", &self.digits[..3], &self.digits[3..6], &self.digits[6..])
    }

    pub fn parenthesized(&self) -> String {
        format!("({}) {}-{}", &self.digits[..3], &self.digits[3..6], &self.digits[6..])
    }

    pub fn render(&self, format: PhoneFormat) -> String {
        match format {
            PhoneFormat::Raw => self.digits.clone(),
            PhoneFormat::Dashed => self.dashed(),
            PhoneFormat::Parenthesized => self.parenthesized(),
        }
    }
}

impl PhoneFormat {
    /// Guess the expected format from a placeholder such as "(555) 555-5555".
    pub fn from_placeholder(placeholder: Option<&str>) -> Self {
        match placeholder.map(str::trim).filter(|p| !p.is_empty()) {
            None => PhoneFormat::Parenthesized,
            Some(p) if p.contains('(') || p.contains(')') => PhoneFormat::Parenthesized,
            Some(p) if p.contains('-') => PhoneFormat::Dashed,
            Some(_) => PhoneFormat::Raw,
        }
    }
}

impl TryFrom<String> for Phone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Phone::parse(&value).ok_or_else(|| format!("not a 10-digit phone number: {}", value))
    }
}

impl From<Phone> for String {
    fn from(phone: Phone) -> Self {
        phone.digits
    }
}

impl std::fmt::Display for Phone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.parenthesized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_share_digits() {
        let inputs = ["5755550323", "575-555-0323", "(575) 555-0323", "+1 575.555.0323", "15755550323"];
        for input in inputs {
            let phone = Phone::parse(input).unwrap();
            assert_eq!(phone.raw(), "5755550323");
            assert_eq!(phone.dashed(), "575-555-0323");
            assert_eq!(phone.parenthesized(), "(575) 555-0323");
            let strip = |s: String| s.chars().filter(|c| c.is_ascii_digit()).collect::<String>();
            assert_eq!(strip(phone.dashed()), phone.raw());
            assert_eq!(strip(phone.parenthesized()), phone.raw());
        }
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        assert!(Phone::parse("555-0323").is_none());
        assert!(Phone::parse("25755550323").is_none());
        assert!(Phone::parse("").is_none());
    }

    #[test]
    fn test_format_from_placeholder() {
        assert_eq!(PhoneFormat::from_placeholder(Some("(555) 555-5555")), PhoneFormat::Parenthesized);
        assert_eq!(PhoneFormat::from_placeholder(Some("555-555-5555")), PhoneFormat::Dashed);
        assert_eq!(PhoneFormat::from_placeholder(Some("5555555555")), PhoneFormat::Raw);
        assert_eq!(PhoneFormat::from_placeholder(Some("  ")), PhoneFormat::Parenthesized);
        assert_eq!(PhoneFormat::from_placeholder(None), PhoneFormat::Parenthesized);
    }

    #[test]
    fn test_serializes_as_digits() {
        let phone = Phone::parse("(575) 555-0323").unwrap();
        assert_eq!(serde_json::to_string(&phone).unwrap(), "\"5755550323\"");
        let back: Phone = serde_json::from_str("\"575-555-0323\"").unwrap();
        assert_eq!(back, phone);
    }
}
