//! Validator registry: pure input checks for each step.
//!
//! A validator never fails loudly: every input maps to either an accepted,
//! normalized value or a rejection carrying a retry instruction for the user.

use std::sync::LazyLock;

use regex::Regex;

use crate::engine::event::EventKind;
use crate::flow::Step;

/// Domestic mobile number, optionally prefixed with +7 / 7 / 8 and separators.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\+7|7|8)?[\s\-]?\(?[489][0-9]{2}\)?[\s\-]?[0-9]{3}[\s\-]?[0-9]{2}[\s\-]?[0-9]{2}$")
        .expect("phone pattern is a valid regex")
});

/// International country code digit.
const COUNTRY_CODE: char = '7';
/// Domestic trunk prefix replaced by the country code.
const TRUNK_PREFIX: char = '8';
/// Length of a canonical number (country code + 10 significant digits).
const PHONE_DIGITS: usize = 11;

/// Why an input was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Blank text.
    Empty,
    /// Text shorter than the step requires.
    TooShort { min_chars: usize },
    /// Not one of the step's options.
    NotAnOption,
    /// Phone text or contact that does not normalize to a valid number.
    BadPhone,
    /// Event kind the step cannot take (e.g. a button press on a free-text step).
    UnexpectedInput,
}

impl Rejection {
    /// Retry instruction shown to the user.
    pub fn message(&self) -> String {
        match self {
            Self::Empty => "Пожалуйста, введите ответ текстом.".to_string(),
            Self::TooShort { min_chars } => {
                format!("Слишком коротко: нужно минимум {min_chars} символа. Попробуйте ещё раз.")
            }
            Self::NotAnOption => "Пожалуйста, выберите один из вариантов ниже.".to_string(),
            Self::BadPhone => "Пожалуйста, введите корректный номер телефона в формате \
                 +7XXXXXXXXXX или нажмите кнопку для отправки контакта."
                .to_string(),
            Self::UnexpectedInput => {
                "Сейчас нужен другой ответ. Пожалуйста, ответьте на вопрос ниже.".to_string()
            }
        }
    }
}

/// Result of validating one input against one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted(String),
    Rejected(Rejection),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Validation rule attached to a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    /// Input must be one of the step's option labels. With `allow_free_text`,
    /// any non-blank typed text is accepted as-is too.
    Choice { allow_free_text: bool },
    /// Non-blank text of at least `min_chars` characters.
    FreeText { min_chars: usize },
    /// A contact payload or a typed domestic mobile number.
    Phone,
}

impl Validator {
    /// Check `payload` of the given kind against `step`.
    pub fn validate(&self, step: &Step, kind: EventKind, payload: &str) -> ValidationOutcome {
        match self {
            Self::Choice { allow_free_text } => {
                validate_choice(step, kind, payload, *allow_free_text)
            }
            Self::FreeText { min_chars } => validate_free_text(kind, payload, *min_chars),
            Self::Phone => validate_phone(kind, payload),
        }
    }
}

fn validate_choice(
    step: &Step,
    kind: EventKind,
    payload: &str,
    allow_free_text: bool,
) -> ValidationOutcome {
    let trimmed = payload.trim();
    if kind == EventKind::Contact {
        return ValidationOutcome::Rejected(Rejection::UnexpectedInput);
    }
    if let Some(option) = step.options.iter().find(|o| **o == trimmed) {
        return ValidationOutcome::Accepted(option.to_string());
    }
    if allow_free_text && kind == EventKind::Text {
        if trimmed.is_empty() {
            return ValidationOutcome::Rejected(Rejection::Empty);
        }
        return ValidationOutcome::Accepted(trimmed.to_string());
    }
    ValidationOutcome::Rejected(Rejection::NotAnOption)
}

fn validate_free_text(kind: EventKind, payload: &str, min_chars: usize) -> ValidationOutcome {
    if kind != EventKind::Text {
        return ValidationOutcome::Rejected(Rejection::UnexpectedInput);
    }
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return ValidationOutcome::Rejected(Rejection::Empty);
    }
    if trimmed.chars().count() < min_chars {
        return ValidationOutcome::Rejected(Rejection::TooShort { min_chars });
    }
    ValidationOutcome::Accepted(trimmed.to_string())
}

fn validate_phone(kind: EventKind, payload: &str) -> ValidationOutcome {
    match kind {
        EventKind::Contact => {}
        EventKind::Text if PHONE_PATTERN.is_match(payload.trim()) => {}
        EventKind::Text => return ValidationOutcome::Rejected(Rejection::BadPhone),
        EventKind::Choice => return ValidationOutcome::Rejected(Rejection::UnexpectedInput),
    }
    match normalize_phone(payload) {
        Some(phone) => ValidationOutcome::Accepted(phone),
        None => ValidationOutcome::Rejected(Rejection::BadPhone),
    }
}

/// Reduce a phone number to canonical digits (E.164 without the plus).
///
/// Returns `None` unless the result is exactly 11 digits starting with the
/// country code.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.starts_with(TRUNK_PREFIX) {
        digits.replace_range(..1, &COUNTRY_CODE.to_string());
    }
    if digits.len() == PHONE_DIGITS && digits.starts_with(COUNTRY_CODE) {
        Some(digits)
    } else {
        None
    }
}
