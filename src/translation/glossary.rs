/*!
 * Terminology glossary.
 *
 * A glossary maps source terms to their fixed target-language rendering. It is loaded
 * once per batch from any number of two-column tables (CSV or TSV), merged with the
 * first occurrence of a term winning, and then shared read-only by every worker.
 *
 * Matching is case-sensitive and prefers the longest term at a given position, so
 * "heart disease" is never split into a match on "heart".
 */

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One glossary row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlossaryEntry {
    /// Term as it appears in the source text
    pub source: String,
    /// Required rendering in the target language
    pub target: String,
}

/// A term located in a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMatch<'g> {
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// The matched entry
    pub entry: &'g GlossaryEntry,
}

/// Immutable source → target term table
#[derive(Debug, Clone)]
pub struct Glossary {
    entries: Vec<GlossaryEntry>,
    by_source: HashMap<String, usize>,
    // Entry indices keyed by first character, longest source first
    by_first_char: HashMap<char, Vec<usize>>,
    whole_word_only: bool,
}

impl Default for Glossary {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Glossary {
    /// Create an empty glossary
    pub fn new(whole_word_only: bool) -> Self {
        Self {
            entries: Vec::new(),
            by_source: HashMap::new(),
            by_first_char: HashMap::new(),
            whole_word_only,
        }
    }

    /// Build a glossary from pairs; earlier pairs win over later duplicates
    pub fn from_pairs<I, S, T>(pairs: I, whole_word_only: bool) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut glossary = Self::new(whole_word_only);
        for (source, target) in pairs {
            glossary.insert(source, target);
        }
        glossary
    }

    /// Add a term. Returns false when the term is empty or already present.
    pub fn insert(&mut self, source: impl Into<String>, target: impl Into<String>) -> bool {
        let source = source.into().trim().to_string();
        let target = target.into().trim().to_string();
        if source.is_empty() || target.is_empty() || self.by_source.contains_key(&source) {
            return false;
        }

        let Some(first) = source.chars().next() else {
            return false;
        };

        let index = self.entries.len();
        self.by_source.insert(source.clone(), index);
        self.entries.push(GlossaryEntry { source, target });

        let bucket = self.by_first_char.entry(first).or_default();
        bucket.push(index);
        let entries = &self.entries;
        bucket.sort_by(|a, b| entries[*b].source.len().cmp(&entries[*a].source.len()));
        true
    }

    /// Number of terms
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the glossary has no terms
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Target rendering of an exact source term
    pub fn get(&self, source: &str) -> Option<&str> {
        self.by_source
            .get(source)
            .map(|&index| self.entries[index].target.as_str())
    }

    /// All entries in load order
    pub fn entries(&self) -> &[GlossaryEntry] {
        &self.entries
    }

    /// Longest term starting exactly at byte offset `pos`
    pub fn longest_match_at(&self, text: &str, pos: usize) -> Option<&GlossaryEntry> {
        self.longest_match_within(text, pos, text.len())
    }

    fn longest_match_within(&self, text: &str, pos: usize, limit: usize) -> Option<&GlossaryEntry> {
        let rest = text.get(pos..limit)?;
        let first = rest.chars().next()?;
        let candidates = self.by_first_char.get(&first)?;

        candidates
            .iter()
            .map(|&index| &self.entries[index])
            .find(|entry| {
                rest.starts_with(entry.source.as_str())
                    && (!self.whole_word_only || self.at_word_boundary(text, pos, pos + entry.source.len()))
            })
    }

    /// Non-overlapping matches scanning left to right, longest first at each position
    pub fn find_matches<'g>(&'g self, text: &str) -> Vec<TermMatch<'g>> {
        self.find_matches_between(text, 0, text.len())
    }

    /// Matches lying entirely inside `text[from..to]`; word boundaries are judged on the whole text
    pub fn find_matches_between<'g>(&'g self, text: &str, from: usize, to: usize) -> Vec<TermMatch<'g>> {
        let mut matches = Vec::new();
        if self.is_empty() {
            return matches;
        }

        let to = to.min(text.len());
        let mut pos = from;
        while pos < to {
            if let Some(entry) = self.longest_match_within(text, pos, to) {
                let end = pos + entry.source.len();
                matches.push(TermMatch { start: pos, end, entry });
                pos = end;
                continue;
            }
            pos += text[pos..].chars().next().map_or(1, char::len_utf8);
        }
        matches
    }

    fn at_word_boundary(&self, text: &str, start: usize, end: usize) -> bool {
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        let term_first = text[start..end].chars().next();
        let term_last = text[start..end].chars().next_back();

        // Only word-like term edges need a boundary; "C++" or "(R)" match anywhere
        let left_ok = !term_first.is_some_and(is_word_char) || !before.is_some_and(is_word_char);
        let right_ok = !term_last.is_some_and(is_word_char) || !after.is_some_and(is_word_char);
        left_ok && right_ok
    }

    /// Merge entries from another glossary; existing terms are kept
    pub fn merge(&mut self, other: &Glossary) -> usize {
        other
            .entries
            .iter()
            .filter(|entry| self.insert(entry.source.clone(), entry.target.clone()))
            .count()
    }

    /// Load and merge all tables in order
    pub fn load_from_paths(paths: &[PathBuf], whole_word_only: bool) -> Result<Self> {
        let mut glossary = Self::new(whole_word_only);
        for path in paths {
            let table = Self::load_table(path, whole_word_only)?;
            let added = glossary.merge(&table);
            let skipped = table.len() - added;
            if skipped > 0 {
                debug!("{}: {} duplicate terms ignored", path.display(), skipped);
            }
            info!("Loaded {} glossary terms from {}", added, path.display());
        }
        Ok(glossary)
    }

    /// Load one two-column table; the delimiter follows the file extension
    pub fn load_table(path: &Path, whole_word_only: bool) -> Result<Self> {
        let delimiter = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("tab") => b'\t',
            _ => b',',
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open glossary table: {:?}", path))?;

        let mut glossary = Self::new(whole_word_only);
        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Malformed row {} in {:?}", row + 1, path))?;
            let (Some(source), Some(target)) = (record.get(0), record.get(1)) else {
                continue;
            };
            if row == 0 && is_header_row(source, target) {
                continue;
            }
            if !glossary.insert(source, target) && !source.trim().is_empty() && target.trim().is_empty() {
                warn!("{:?} row {}: term '{}' has no translation", path, row + 1, source.trim());
            }
        }
        Ok(glossary)
    }
}

// Scripts written without spaces never form word boundaries
fn is_word_char(c: char) -> bool {
    let unspaced = matches!(c as u32, 0x3040..=0x30FF | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xAC00..=0xD7AF);
    (c.is_alphanumeric() && !unspaced) || c == '_'
}

fn is_header_row(source: &str, target: &str) -> bool {
    const HEADERS: [&str; 8] = ["source", "term", "english", "en", "original", "target", "translation", "chinese"];
    let source = source.trim().to_lowercase();
    let target = target.trim().to_lowercase();
    HEADERS.contains(&source.as_str()) && HEADERS.contains(&target.as_str())
}
