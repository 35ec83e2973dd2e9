//! Query intent classification.
//!
//! A query is classified once, by a fixed sequence of pure predicates; the
//! first predicate that fires decides the intent.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// What the user is asking for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryIntent {
    Greeting,
    ProductIntent {
        /// "best"/"top" style request.
        best_of: bool,
        /// Count from a "list N" request.
        requested_count: Option<usize>,
    },
    BrandQuery {
        brand: String,
    },
    ContactRequest,
    /// Refers back to the previous results ("the link?").
    FollowUp,
    Other,
}

const FOLLOW_UP_EXACT: &[&str] = &["link", "link?", "the link", "the link?", "that link?", "links?"];

const FOLLOW_UP_PHRASES: &[&str] = &[
    "the one you mentioned",
    "the ones you mentioned",
    "you mentioned above",
    "send the link",
    "show me the link",
];

const CONTACT_PHRASES: &[&str] = &[
    "whatsapp",
    "how do i contact",
    "how can i contact",
    "contact info",
    "contact information",
    "phone number",
    "reach you",
    "reach out",
];

const GREETINGS: &[&str] = &["hi", "hello", "hey", "good morning", "good afternoon", "good evening"];

const PRODUCT_KEYWORDS: &[&str] = &[
    "soap",
    "cream",
    "lotion",
    "serum",
    "body wash",
    "buy",
    "order",
    "price",
    "skincare",
    "niacinamide",
];

const VAGUE_PHRASES: &[&str] = &[
    "i need something",
    "help me",
    "i need help",
    "what do you have",
];

const ACKNOWLEDGEMENTS: &[&str] = &[
    "yes", "no", "okay", "ok", "thanks", "thank you", "sure", "maybe",
];

/// Words that name a product category rather than a brand.
const GENERIC_TYPES: &[&str] = &[
    "soap",
    "soaps",
    "lotion",
    "lotions",
    "cream",
    "creams",
    "serum",
    "serums",
    "product",
    "products",
    "moisturizer",
    "moisturizers",
    "fragrance",
    "fragrances",
];

const COMMON_TYPOS: &[(&str, &str)] = &[
    ("uour", "your"),
    ("whats", "what is"),
    ("wher", "where"),
    ("adress", "address"),
    ("phne", "phone"),
    ("contatc", "contact"),
    ("numbr", "number"),
    ("moisturiser", "moisturizer"),
];

#[allow(clippy::unwrap_used)]
static BRAND_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:do you sell|brand)\s+([a-z0-9&+.'\- ]+)").unwrap());

#[allow(clippy::unwrap_used)]
static LIST_COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\blist\s*(\d+)").unwrap());

/// Replace common misspellings word by word.
pub fn correct_typos(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            COMMON_TYPOS
                .iter()
                .find(|(typo, _)| word.eq_ignore_ascii_case(typo))
                .map_or(word, |&(_, fixed)| fixed)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify a query. `known_brands` holds lower-cased brand names.
pub fn classify(query: &str, known_brands: &HashSet<String>) -> QueryIntent {
    let text = correct_typos(query).to_lowercase();
    let text = text.trim();

    if is_follow_up(text) {
        QueryIntent::FollowUp
    } else if is_contact_request(text) {
        QueryIntent::ContactRequest
    } else if let Some(brand) = brand_mentioned(text, known_brands) {
        QueryIntent::BrandQuery { brand }
    } else if is_greeting(text) {
        QueryIntent::Greeting
    } else if is_product_intent(text) {
        QueryIntent::ProductIntent {
            best_of: is_best_of(text),
            requested_count: requested_count(text),
        }
    } else {
        QueryIntent::Other
    }
}

fn is_follow_up(text: &str) -> bool {
    FOLLOW_UP_EXACT.contains(&text) || FOLLOW_UP_PHRASES.iter().any(|p| text.contains(p))
}

fn is_contact_request(text: &str) -> bool {
    CONTACT_PHRASES.iter().any(|p| text.contains(p))
        || text.split(|c: char| !c.is_alphanumeric()).any(|w| w == "contact")
}

fn brand_mentioned(text: &str, known_brands: &HashSet<String>) -> Option<String> {
    if let Some(captures) = BRAND_QUESTION.captures(text) {
        let brand = captures[1].trim().trim_end_matches(['?', '.', '!']).trim();
        if !brand.is_empty() && !GENERIC_TYPES.contains(&brand) {
            return Some(brand.to_string());
        }
    }

    let mut brands: Vec<&String> = known_brands
        .iter()
        .filter(|b| !b.is_empty() && text.contains(b.as_str()))
        .collect();
    // Longest name wins so "la roche" does not shadow "la roche-posay".
    brands.sort_by_key(|b| std::cmp::Reverse(b.len()));
    brands.into_iter().next().cloned()
}

fn is_greeting(text: &str) -> bool {
    let stripped = text.trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    GREETINGS
        .iter()
        .any(|g| stripped == *g || stripped.strip_prefix(g).is_some_and(|rest| rest.trim() == "there"))
}

fn is_product_intent(text: &str) -> bool {
    if ACKNOWLEDGEMENTS.contains(&text) {
        return false;
    }
    if VAGUE_PHRASES.iter().any(|p| text.contains(p)) {
        return false;
    }
    PRODUCT_KEYWORDS.iter().any(|k| text.contains(k))
}

fn is_best_of(text: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|w| w == "best" || w == "top")
}

fn requested_count(text: &str) -> Option<usize> {
    LIST_COUNT
        .captures(text)
        .and_then(|c| c[1].parse().ok())
        .filter(|&n| n > 0)
}
