//! Query Classifier
//!
//! Detects structured postal-code input (Irish Eircode) in free text.

use crate::domain::value_objects::PostalCode;
use regex::Regex;
use std::sync::OnceLock;

/// Routing key (letter + two digits, or the special `D6W`) followed by a
/// four character unique identifier. Letters that An Post never issues
/// (B, G, I, J, L, M, O, Q, S, U, Z) are excluded.
const EIRCODE_PATTERN: &str = r"^(?:[AC-FHKNPRTV-Y][0-9]{2}|D6W)[0-9AC-FHKNPRTV-Y]{4}$";

fn eircode_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EIRCODE_PATTERN).expect("eircode pattern compiles"))
}

/// Outcome of classifying a raw query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryClass {
    pub is_structured_code: bool,
    /// Whitespace-free, upper-case form of the input.
    pub normalized_code: String,
}

impl QueryClass {
    /// The recognised postal code, if any.
    pub fn postal_code(&self) -> Option<PostalCode> {
        self.is_structured_code
            .then(|| PostalCode::from_normalized(self.normalized_code.clone()))
    }
}

/// Classify a raw query string.
pub fn classify(raw: &str) -> QueryClass {
    let normalized_code: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    let is_structured_code = normalized_code.len() == 7 && eircode_regex().is_match(&normalized_code);

    QueryClass {
        is_structured_code,
        normalized_code,
    }
}
