/*!
 * Placeholder-based text protection.
 *
 * Before a unit is sent to the model, links and glossary terms are swapped for opaque
 * tokens so they cannot be translated, reformatted or partially replaced. After the
 * model answers, the tokens are swapped back: links get their original text, terms get
 * the glossary's target rendering.
 *
 * Links are claimed first. A glossary term that happens to occur inside a URL or a
 * domain is therefore never touched.
 */

use crate::translation::glossary::Glossary;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

const TOKEN_OPEN: char = '⟦';
const TOKEN_CLOSE: char = '⟧';

// Characters that end a link, CJK punctuation included
// ASCII word boundaries let links start or end right next to CJK text
const LINK_BODY: &str = r#"[^\s<>"'()\[\]{}，。；：、）】》]"#;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)(?-u:\b)(?:https?|ftps?)://{LINK_BODY}+")).unwrap());

static DOI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)(?:(?-u:\b)(?:dx\.)?doi\.org/{LINK_BODY}+|(?-u:\b)doi:\s?10\.\d{{4,9}}/{LINK_BODY}+)"
    ))
    .unwrap()
});

// Labels ignore case, the top-level domain must be lowercase so "results.In" stays prose
static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?-u:\b)(?:(?i:www\.[a-z0-9][a-z0-9-]*(?:\.[a-z0-9-]+)+)|(?:(?i:[a-z0-9][a-z0-9-]*)\.)+(?:com|org|net|edu|gov|int|mil|io|ai|info|biz|co|uk|cn|de|fr|jp|eu|us|ca|au|nl|ch|se|in|br|es|it|kr))(?-u:\b)(?:/{LINK_BODY}*)?"
    ))
    .unwrap()
});

/// What a protected span stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Url,
    Doi,
    Domain,
    Term,
}

impl SpanKind {
    fn tag(self) -> char {
        match self {
            Self::Url => 'U',
            Self::Doi => 'D',
            Self::Domain => 'H',
            Self::Term => 'T',
        }
    }
}

/// A substring replaced by a placeholder token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedSpan {
    /// Token inserted into the protected text
    pub token: String,
    /// Substring of the source text the token replaced
    pub original: String,
    /// Class of the span
    pub kind: SpanKind,
    /// Text the token restores to; the original for links, the glossary target for terms
    pub replacement: String,
}

/// Result of [`TerminologyProtector::protect`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedText {
    /// Text with every span replaced by its token
    pub text: String,
    /// Spans in issue order
    pub spans: Vec<ProtectedSpan>,
}

/// Result of [`TerminologyProtector::restore`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoredText {
    /// Translated text with tokens substituted
    pub text: String,
    /// Tokens that were not found in the translated text
    pub missing: Vec<String>,
}

impl RestoredText {
    /// True when at least one placeholder could not be restored
    pub fn is_degraded(&self) -> bool {
        !self.missing.is_empty()
    }
}

struct Candidate {
    start: usize,
    end: usize,
    kind: SpanKind,
    replacement: String,
}

/// Reversible text transform shielding links and glossary terms from translation
#[derive(Debug, Clone)]
pub struct TerminologyProtector {
    glossary: Arc<Glossary>,
}

impl Default for TerminologyProtector {
    fn default() -> Self {
        Self::new(Arc::new(Glossary::default()))
    }
}

impl TerminologyProtector {
    /// Create a protector over a shared glossary
    pub fn new(glossary: Arc<Glossary>) -> Self {
        Self { glossary }
    }

    /// The glossary terms are taken from
    pub fn glossary(&self) -> &Glossary {
        &self.glossary
    }

    /// Replace links, then glossary terms, with placeholder tokens
    pub fn protect(&self, text: &str) -> ProtectedText {
        let mut candidates = find_links(text);

        let mut terms = Vec::new();
        let mut gap_start = 0;
        for link in candidates.iter().map(|c| (c.start, c.end)).chain(std::iter::once((text.len(), text.len()))) {
            for found in self.glossary.find_matches_between(text, gap_start, link.0) {
                terms.push(Candidate {
                    start: found.start,
                    end: found.end,
                    kind: SpanKind::Term,
                    replacement: found.entry.target.clone(),
                });
            }
            gap_start = link.1;
        }
        candidates.extend(terms);
        candidates.sort_by_key(|c| c.start);

        if candidates.is_empty() {
            return ProtectedText {
                text: text.to_string(),
                spans: Vec::new(),
            };
        }

        let salt = choose_salt(text);
        let mut protected = String::with_capacity(text.len());
        let mut spans = Vec::with_capacity(candidates.len());
        let mut cursor = 0;
        for (index, candidate) in candidates.into_iter().enumerate() {
            let token = format!("{TOKEN_OPEN}{salt}{}{index}{TOKEN_CLOSE}", candidate.kind.tag());
            protected.push_str(&text[cursor..candidate.start]);
            protected.push_str(&token);
            cursor = candidate.end;
            spans.push(ProtectedSpan {
                token,
                original: text[candidate.start..candidate.end].to_string(),
                kind: candidate.kind,
                replacement: candidate.replacement,
            });
        }
        protected.push_str(&text[cursor..]);

        debug!("Protected {} spans", spans.len());
        ProtectedText {
            text: protected,
            spans,
        }
    }

    /// Substitute every token in issue order; tokens the model dropped are reported, never guessed
    pub fn restore(&self, translated: &str, spans: &[ProtectedSpan]) -> RestoredText {
        let mut text = translated.to_string();
        let mut missing = Vec::new();

        for span in spans {
            if text.contains(&span.token) {
                text = text.replace(&span.token, &span.replacement);
            } else {
                missing.push(span.token.clone());
            }
        }

        if !missing.is_empty() {
            debug!("{} of {} placeholders missing after translation", missing.len(), spans.len());
        }
        RestoredText { text, missing }
    }
}

/// URL, DOI and domain spans, non-overlapping, sorted by position
fn find_links(text: &str) -> Vec<Candidate> {
    let mut links: Vec<Candidate> = Vec::new();
    let classes: [(&Regex, SpanKind); 3] = [
        (&*URL_PATTERN, SpanKind::Url),
        (&*DOI_PATTERN, SpanKind::Doi),
        (&*DOMAIN_PATTERN, SpanKind::Domain),
    ];

    for (pattern, kind) in classes {
        for found in pattern.find_iter(text) {
            let start = found.start();
            let end = start + trim_link_tail(found.as_str()).len();
            if end <= start || links.iter().any(|l| start < l.end && l.start < end) {
                continue;
            }
            let kind = if kind == SpanKind::Url && found.as_str().to_lowercase().contains("doi.org/") {
                SpanKind::Doi
            } else {
                kind
            };
            links.push(Candidate {
                start,
                end,
                kind,
                replacement: text[start..end].to_string(),
            });
        }
    }

    links.sort_by_key(|l| l.start);
    links
}

// Sentence punctuation directly after a link is not part of it
fn trim_link_tail(link: &str) -> &str {
    link.trim_end_matches(['.', ',', ';', ':', '!', '?'])
}

// Shortest run of '#' that, after the opening bracket, does not occur in the source text
fn choose_salt(text: &str) -> String {
    let mut salt = String::new();
    while text.contains(&format!("{TOKEN_OPEN}{salt}")) {
        salt.push('#');
    }
    salt
}
