//! Splitting a single pre-formatted document into categorized files
//!
//! The source is cut at lines equal to a section marker. Sections are grouped
//! by a category derived from their title; small categories are merged into
//! one file.

use crate::types::DocumentRecord;
use std::collections::{BTreeMap, HashSet};

/// Lines after a marker searched for a section title
const TITLE_SEARCH_LINES: usize = 10;

pub const DEFAULT_CATEGORY: &str = "general";

/// One section of the source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub content: String,
    pub category: String,
    pub tokens: usize,
}

/// Rough token estimate: one token per four characters
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Split `text` at lines equal to `marker` (after trimming).
///
/// A section's title is the first non-empty line among the next ten lines,
/// without leading `#`. Sections with no title are skipped, as is anything
/// before the first marker.
pub fn split_sections(text: &str, marker: &str) -> Vec<Section> {
    let marker = marker.trim();
    let lines: Vec<&str> = text.lines().collect();
    let starts: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim() == marker)
        .map(|(i, _)| i)
        .collect();

    let mut sections = Vec::new();
    for (n, &start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(lines.len());
        let body = &lines[start + 1..end];

        let Some((title_at, title)) = body
            .iter()
            .take(TITLE_SEARCH_LINES)
            .enumerate()
            .map(|(i, line)| (i, line.trim().trim_start_matches('#').trim()))
            .find(|(_, line)| !line.is_empty())
        else {
            continue;
        };

        let content = body[title_at + 1..].join("\n").trim().to_string();
        sections.push(Section {
            title: title.to_string(),
            tokens: estimate_tokens(&content),
            category: categorize(title),
            content,
        });
    }
    sections
}

/// Leading identifier of a title: `auth.signIn()` -> `auth`
pub fn categorize(title: &str) -> String {
    let lead = title
        .trim()
        .split(|c: char| c == '.' || c == '(' || c == ':' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    let category: String = lead
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect::<String>()
        .to_lowercase();
    let category = category.trim_matches(|c| c == '_' || c == '-');
    if category.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        category.to_string()
    }
}

/// File name for a section title
pub fn section_file_stem(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace() || matches!(c, '.' | '(' | ')'))
        .collect();
    let mut stem = String::with_capacity(kept.len());
    let mut pending_sep = false;
    for c in kept.chars() {
        if c.is_whitespace() || matches!(c, '.' | '_' | '(' | ')') {
            pending_sep = true;
        } else {
            if pending_sep && !stem.is_empty() {
                stem.push('_');
            }
            pending_sep = false;
            stem.push(c);
        }
    }
    stem.trim_matches(|c| c == '_' || c == '-').to_string()
}

/// Group sections into documents.
///
/// A category whose total token estimate lies in `(0, merge_threshold]`
/// becomes `category/_merged_{category}.md`; every other category keeps one
/// `category/{title}.md` per section.
pub fn consolidate(sections: &[Section], merge_threshold: usize, source: &str) -> Vec<DocumentRecord> {
    let mut by_category: BTreeMap<&str, Vec<&Section>> = BTreeMap::new();
    for section in sections {
        by_category.entry(&section.category).or_default().push(section);
    }

    let mut records = Vec::new();
    for (category, items) in by_category {
        let total: usize = items.iter().map(|s| s.tokens).sum();
        if total > 0 && total <= merge_threshold {
            records.push(merge_category(category, &items, source));
            continue;
        }

        let mut used = HashSet::new();
        for (i, section) in items.iter().enumerate() {
            let mut stem = section_file_stem(&section.title);
            if stem.is_empty() {
                stem = format!("section_{}", i + 1);
            }
            let mut name = stem.clone();
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{}_{}", stem, n);
                n += 1;
            }
            records.push(
                DocumentRecord::new(
                    format!("{}/{}.md", category, name),
                    source,
                    format!("# {}\n\n{}", section.title, section.content),
                )
                .with_title(&section.title),
            );
        }
    }
    records
}

fn merge_category(category: &str, items: &[&Section], source: &str) -> DocumentRecord {
    let heading = format!("Consolidated Documentation: {}", category.replace('_', " "));
    let mut content = format!("# {}\n\nThis file merges {} sections.\n", heading, items.len());
    for section in items {
        content.push_str(&format!(
            "\n---\n\n## --- {} ---\n\n{}",
            section.title, section.content
        ));
    }
    DocumentRecord::new(format!("{}/_merged_{}.md", category, category), source, content)
        .with_title(heading)
        .with_sections(items.iter().map(|s| s.title.clone()).collect())
}
