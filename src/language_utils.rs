//! Language utilities for ISO language code handling
//!
//! Prompts name the target language in English ("Chinese", "French"), while
//! configuration uses ISO 639-1 or 639-2 codes.

use anyhow::{Result, anyhow};
use isolang::Language;

/// ISO 639-2/B codes whose 639-2/T spelling differs
fn bibliographic_to_terminology(code: &str) -> Option<&'static str> {
    let mapped = match code {
        "fre" => "fra",
        "ger" => "deu",
        "dut" => "nld",
        "gre" => "ell",
        "chi" => "zho",
        "cze" => "ces",
        "ice" => "isl",
        "alb" => "sqi",
        "arm" => "hye",
        "baq" => "eus",
        "bur" => "mya",
        "per" => "fas",
        "geo" => "kat",
        "may" => "msa",
        "mac" => "mkd",
        "rum" => "ron",
        "slo" => "slk",
        "wel" => "cym",
        _ => return None,
    };
    Some(mapped)
}

/// Resolve a 2- or 3-letter code to a language
fn resolve(code: &str) -> Result<Language> {
    let normalized = code.trim().to_lowercase();
    let language = match normalized.len() {
        2 => Language::from_639_1(&normalized),
        3 => Language::from_639_3(bibliographic_to_terminology(&normalized).unwrap_or(&normalized)),
        _ => None,
    };
    language.ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// Check if two language codes match (represent the same language)
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (resolve(code1), resolve(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    Ok(resolve(code)?.to_name().to_string())
}
