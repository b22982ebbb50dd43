// src/extract.rs
//! Budget / category extraction from Codeur.com item bodies.
//!
//! The marketplace renders its metadata as a single line inside the RSS
//! description:
//!
//! ```text
//! Budget : Moins de 500 € - Catégories : Développement spécifique, API
//! Voir ce projet sur Codeur
//! ```
//!
//! This layout is owned by the marketplace and can change without notice, so
//! the contract lives here in one place: a regex for the `Budget : … -
//! Catégories :` head and a scanner that decides where the category list
//! stops. The list stops at the first of: the "view this project" marker, a
//! line break, or an uppercase letter that follows whitespace but not a comma
//! (the start of the next sentence). Known edge case: a category whose second
//! word is capitalised ("Développement Web") is cut before that word.

use std::ops::Range;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Budget reported when the description carries no metadata line.
pub const BUDGET_FALLBACK: &str = "Non spécifié";

/// Trailing call-to-action line appended by the marketplace.
pub const VIEW_MARKER: &str = "Voir ce projet sur";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub budget: String,
    pub categories: Vec<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            budget: BUDGET_FALLBACK.to_string(),
            categories: Vec::new(),
        }
    }
}

struct Located<'a> {
    budget: &'a str,
    list: &'a str,
    span: Range<usize>,
}

fn head_regex() -> &'static Regex {
    static RE_HEAD: OnceCell<Regex> = OnceCell::new();
    RE_HEAD.get_or_init(|| {
        Regex::new(r"Budget\s*:\s*(?P<budget>.+?)\s*-\s*Cat[ée]gories\s*:[ \t]*")
            .expect("budget head regex")
    })
}

fn marker_regex() -> &'static Regex {
    static RE_MARKER: OnceCell<Regex> = OnceCell::new();
    RE_MARKER.get_or_init(|| Regex::new(r"(?m)Voir ce projet sur.*$").expect("marker regex"))
}

fn whitespace_regex() -> &'static Regex {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"))
}

/// Byte offset in `tail` where the category list ends.
fn list_end(tail: &str) -> usize {
    let marker = tail.find(VIEW_MARKER).unwrap_or(tail.len());
    let line = tail.find('\n').unwrap_or(tail.len());
    let limit = marker.min(line);

    let mut prev: Option<char> = None;
    let mut after_space = false;
    for (i, c) in tail[..limit].char_indices() {
        if c.is_whitespace() {
            after_space = true;
            continue;
        }
        if after_space && c.is_uppercase() && prev.is_some_and(|p| p != ',') {
            return i;
        }
        after_space = false;
        prev = Some(c);
    }
    limit
}

fn locate(raw: &str) -> Option<Located<'_>> {
    let caps = head_regex().captures(raw)?;
    let head = caps.get(0)?;
    let budget = caps.name("budget")?.as_str().trim();

    let tail = &raw[head.end()..];
    let end = list_end(tail);
    let list = tail[..end].trim();
    if budget.is_empty() || list.is_empty() {
        return None;
    }

    Some(Located {
        budget,
        list,
        span: head.start()..head.end() + end,
    })
}

/// Pull budget and categories out of a markup-free description.
/// Input without the metadata line yields [`Metadata::default`].
pub fn extract(raw: &str) -> Metadata {
    let Some(found) = locate(raw) else {
        return Metadata::default();
    };

    let categories = found
        .list
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    Metadata {
        budget: found.budget.to_string(),
        categories,
    }
}

/// Description with the metadata span and the view-link line removed and
/// whitespace collapsed.
pub fn strip_metadata(raw: &str) -> String {
    let without_span = match locate(raw) {
        Some(found) => {
            let mut s = String::with_capacity(raw.len());
            s.push_str(&raw[..found.span.start]);
            s.push(' ');
            s.push_str(&raw[found.span.end..]);
            s
        }
        None => raw.to_string(),
    };

    let without_marker = marker_regex().replace_all(&without_span, "");
    whitespace_regex()
        .replace_all(&without_marker, " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Budget : Moins de 500 € - Catégories : Développement spécifique, API Voir ce projet sur Codeur";

    #[test]
    fn sample_line_yields_budget_and_categories() {
        let m = extract(SAMPLE);
        assert_eq!(m.budget, "Moins de 500 €");
        assert_eq!(m.categories, vec!["Développement spécifique", "API"]);
    }

    #[test]
    fn strip_removes_span_and_marker() {
        let raw = format!("Refonte d'un site vitrine.\n{SAMPLE}");
        assert_eq!(strip_metadata(&raw), "Refonte d'un site vitrine.");
    }

    #[test]
    fn no_marker_falls_back() {
        let m = extract("Un projet   sans\n métadonnées");
        assert_eq!(m, Metadata::default());
        assert_eq!(m.budget, BUDGET_FALLBACK);
        assert_eq!(
            strip_metadata("Un projet   sans\n métadonnées"),
            "Un projet sans métadonnées"
        );
    }

    #[test]
    fn budget_may_contain_a_dash() {
        let m = extract("Budget : 500 € - 1 000 € - Catégories : WordPress");
        assert_eq!(m.budget, "500 € - 1 000 €");
        assert_eq!(m.categories, vec!["WordPress"]);
    }

    #[test]
    fn list_stops_at_next_sentence() {
        let m = extract("Budget : 1 000 € - Catégories : Design, Logo Nous cherchons un graphiste.");
        assert_eq!(m.categories, vec!["Design", "Logo"]);
    }

    #[test]
    fn list_stops_at_line_break_and_glued_marker() {
        let m = extract("Budget : À définir - Catégories : SEO, Rédaction web\nSuite du texte");
        assert_eq!(m.categories, vec!["SEO", "Rédaction web"]);

        let glued = extract("Budget : 200 € - Catégories : APIVoir ce projet sur Codeur");
        assert_eq!(glued.categories, vec!["API"]);
    }

    #[test]
    fn accented_capital_ends_the_list() {
        let m = extract("Budget : 300 € - Catégories : Mobile, iOS Étude de faisabilité");
        assert_eq!(m.categories, vec!["Mobile", "iOS"]);
    }

    #[test]
    fn trailing_comma_does_not_produce_empty_category() {
        let m = extract("Budget : 50 € - Catégories : Excel,");
        assert_eq!(m.categories, vec!["Excel"]);
    }

    #[test]
    fn marker_line_alone_is_stripped() {
        assert_eq!(
            strip_metadata("Texte utile\nVoir ce projet sur Codeur.com"),
            "Texte utile"
        );
    }
}
