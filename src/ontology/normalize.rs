//! Identifier and label normalization
//!
//! Every label, relationship type and node id that leaves an agent passes
//! through this module before it reaches the master schema or an instance.
//! The same logical name must always map to the same canonical string, so
//! `"Complicación"`, `"complicacion"` and `"COMPLICACION"` all end up as the
//! label `Complicacion`.
//!
//! Normalization is a two step process:
//!
//! 1. [`fold_ascii`]: NFKD decomposition, removal of combining marks and of any
//!    character that still is not ASCII.
//! 2. A casing [`Convention`] chosen by the call site.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Casing convention applied after ASCII folding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Convention {
    /// Node labels: `CapitalizedCamel` (e.g. `FactorRiesgo`)
    Label,
    /// Relationship types: `UPPER_SNAKE` (e.g. `PROVOCA_EFECTO`)
    RelationshipType,
    /// Node ids: `UPPER_SNAKE` (e.g. `LEY_27275`)
    Id,
}

/// Strip diacritics and return an ASCII-only string.
///
/// Characters with no ASCII decomposition (CJK, `ß`, ...) are dropped.
pub fn fold_ascii(input: &str) -> String {
    input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(char::is_ascii)
        .collect()
}

/// Normalize `input` under the given convention.
///
/// The result only contains `[A-Za-z0-9_]`. It is empty when the input holds
/// no alphanumeric ASCII content after folding.
pub fn normalize(input: &str, convention: Convention) -> String {
    let folded = fold_ascii(input);
    match convention {
        Convention::Label => join_camel(&split_words(&folded, true)),
        Convention::RelationshipType | Convention::Id => split_words(&folded, false)
            .iter()
            .map(|w| w.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join("_"),
    }
}

/// Normalize a node label (`CapitalizedCamel`)
pub fn normalize_label(input: &str) -> String {
    normalize(input, Convention::Label)
}

/// Normalize a relationship type (`UPPER_SNAKE`)
pub fn normalize_relationship_type(input: &str) -> String {
    normalize(input, Convention::RelationshipType)
}

/// Normalize a node id (`UPPER_SNAKE`)
pub fn normalize_id(input: &str) -> String {
    normalize(input, Convention::Id)
}

/// Whether `s` can be used as a bare label or relationship type in Cypher.
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Split folded text into words on separators and camel-case boundaries.
///
/// A boundary is any non-alphanumeric character or a lowercase letter
/// followed by an uppercase letter (`provocaEfecto` -> `provoca`, `Efecto`).
/// With `digit_boundary` a digit followed by an uppercase letter also splits.
fn split_words(folded: &str, digit_boundary: bool) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in folded.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        }

        if let Some(p) = prev {
            let splits = p.is_ascii_lowercase() || (digit_boundary && p.is_ascii_digit());
            if splits && c.is_ascii_uppercase() {
                words.push(std::mem::take(&mut current));
            }
        }

        current.push(c);
        prev = Some(c);
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}

/// Concatenate capitalized words.
///
/// A word that would follow an uppercase letter is lowercased instead, so two
/// capitals never touch and splitting the output again yields the same words.
fn join_camel(words: &[String]) -> String {
    let mut out = String::new();
    for word in words {
        if out.ends_with(|c: char| c.is_ascii_uppercase()) {
            out.push_str(&word.to_ascii_lowercase());
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

/// `complicacion` -> `Complicacion`, `COMPLICACION` -> `Complicacion`
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            let mut out = String::with_capacity(word.len());
            out.push(first.to_ascii_uppercase());
            out.extend(chars.map(|c| c.to_ascii_lowercase()));
            out
        }
        None => String::new(),
    }
}
