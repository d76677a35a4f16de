//! Email and phone extraction from raw HTML.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid email regex")
});

/// `(31) 99999-9999`, `31 3333 4444` and similar.
static LOCAL_PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(?\d{2}\)?\s*\d{4,5}[-.\s]?\d{4}").expect("valid phone regex")
});

/// `+55 31 99999-9999`.
static INTL_PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+55\s*\d{2}\s*\d{4,5}[-.\s]?\d{4}").expect("valid phone regex")
});

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Substrings that mark placeholder, vendor or asset addresses.
const INVALID_EMAIL_PATTERNS: &[&str] = &[
    "example.com",
    "teste.com",
    "email.com",
    "sentry.io",
    "wix.com",
    ".png",
    ".jpg",
    ".gif",
];

/// Minimum digits for a phone number (area code + local number).
const MIN_PHONE_DIGITS: usize = 10;

pub fn is_valid_email(email: &str) -> bool {
    let lower = email.to_lowercase();
    lower.contains('@')
        && lower.contains('.')
        && !INVALID_EMAIL_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Address from a `mailto:` href, without query string.
pub fn mailto_address(href: &str) -> Option<String> {
    let rest = href.strip_prefix("mailto:")?;
    let address = rest.split('?').next().unwrap_or(rest).trim();
    is_valid_email(address).then(|| address.to_lowercase())
}

/// First plausible email: `mailto:` links first, then any address in the markup.
pub fn find_email(doc: &Html, html: &str) -> Option<String> {
    doc.select(&ANCHOR_SEL)
        .filter_map(|a| a.value().attr("href"))
        .find_map(mailto_address)
        .or_else(|| {
            EMAIL_RE
                .find_iter(html)
                .map(|m| m.as_str())
                .find(|e| is_valid_email(e))
                .map(str::to_lowercase)
        })
}

/// Digits of the first Brazilian-looking phone number with at least 10 digits.
pub fn find_phone(text: &str) -> Option<String> {
    [&*LOCAL_PHONE_RE, &*INTL_PHONE_RE]
        .into_iter()
        .filter_map(|re| re.find(text))
        .map(|m| digits(m.as_str()))
        .find(|d| d.len() >= MIN_PHONE_DIGITS)
}

/// Digits of a `tel:` href.
pub fn tel_number(href: &str) -> Option<String> {
    let number = digits(href.strip_prefix("tel:")?);
    (number.len() >= MIN_PHONE_DIGITS).then_some(number)
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}
