//! Markdown corpus parser.
//!
//! Walks the knowledge directory (`resonance/`, `learnings/`,
//! `retrospectives/`) and splits each file into granular, addressable chunks.
//! Chunk ids are derived from file stem + section index and are stable across
//! re-indexing as long as section boundaries do not move.

use anyhow::{Context, Result};
use std::path::Path;
use walkdir::WalkDir;

use crate::corpus::concepts;
use crate::knowledge::types::DocType;

/// One chunk emitted by the parser. `content` feeds the FTS row and the
/// vector embedding; the metadata row is derived from the rest.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub id: String,
    pub doc_type: DocType,
    pub title: String,
    pub content: String,
    pub source_file: String,
    pub concepts: Vec<String>,
}

/// Minimum body length for a retrospective section to be indexed.
const RETRO_MIN_BODY_CHARS: usize = 50;

/// Parse the full corpus under `memory_dir` (`<repo>/ψ/memory`).
///
/// Subtrees are parsed in a fixed order so chunk ids and insert order are
/// reproducible: resonance, then learnings, then retrospectives. Missing
/// subtrees are skipped silently — an empty corpus is valid.
pub fn parse_corpus(memory_dir: &Path) -> Result<Vec<ParsedDocument>> {
    let mut documents = Vec::new();
    parse_resonance_dir(&memory_dir.join("resonance"), &mut documents)?;
    parse_learnings_dir(&memory_dir.join("learnings"), &mut documents)?;
    parse_retros_dir(&memory_dir.join("retrospectives"), &mut documents)?;
    Ok(documents)
}

// ── Resonance (principles) ───────────────────────────────────────────────────

fn parse_resonance_dir(dir: &Path, out: &mut Vec<ParsedDocument>) -> Result<()> {
    for path in markdown_files(dir)? {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let stem = file_stem(&path);
        let source_file = format!("ψ/memory/resonance/{}", file_name(&path));
        parse_resonance_text(&text, &stem, &source_file, out);
    }
    Ok(())
}

/// Split a resonance file on `### ` headings. Each section with a non-empty
/// body becomes one principle document, plus one sub-document per top-level
/// bullet line so retrieval can return a specific bullet.
pub fn parse_resonance_text(
    text: &str,
    stem: &str,
    source_file: &str,
    out: &mut Vec<ParsedDocument>,
) {
    for (index, section) in split_sections(text, "### ").into_iter().enumerate() {
        if section.body.trim().is_empty() {
            continue;
        }
        let id = format!("resonance_{stem}_{index}");
        let content = format!("{}: {}", section.heading, section.body.trim());
        let concepts = concepts::extract(&section.heading, &section.body);

        out.push(ParsedDocument {
            id: id.clone(),
            doc_type: DocType::Principle,
            title: section.heading.clone(),
            content,
            source_file: source_file.to_string(),
            concepts,
        });

        // Granular split: one sub-document per top-level bullet.
        let mut bullet_index = 0;
        for line in section.body.lines() {
            if let Some(bullet) = bullet_text(line) {
                out.push(ParsedDocument {
                    id: format!("{id}_sub_{bullet_index}"),
                    doc_type: DocType::Principle,
                    title: section.heading.clone(),
                    content: bullet.to_string(),
                    source_file: source_file.to_string(),
                    concepts: concepts::extract(&section.heading, bullet),
                });
                bullet_index += 1;
            }
        }
    }
}

// ── Learnings ────────────────────────────────────────────────────────────────

fn parse_learnings_dir(dir: &Path, out: &mut Vec<ParsedDocument>) -> Result<()> {
    for path in markdown_files(dir)? {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let stem = file_stem(&path);
        let source_file = format!("ψ/memory/learnings/{}", file_name(&path));
        parse_learning_text(&text, &stem, &source_file, out);
    }
    Ok(())
}

/// Split a learning file on `## ` headings, prefixed with the front-matter
/// title (or filename stem). A file without `##` sections becomes a single
/// document covering the whole file.
pub fn parse_learning_text(
    text: &str,
    stem: &str,
    source_file: &str,
    out: &mut Vec<ParsedDocument>,
) {
    let prefix = front_matter_title(text).unwrap_or_else(|| stem.to_string());
    let body = strip_front_matter(text);

    let sections = split_sections(body, "## ");
    if sections.is_empty() {
        if body.trim().is_empty() {
            return;
        }
        out.push(ParsedDocument {
            id: format!("learning_{stem}"),
            doc_type: DocType::Learning,
            title: prefix.clone(),
            content: body.trim().to_string(),
            source_file: source_file.to_string(),
            concepts: concepts::extract(&prefix, body),
        });
        return;
    }

    for (index, section) in sections.into_iter().enumerate() {
        if section.body.trim().is_empty() {
            continue;
        }
        out.push(ParsedDocument {
            id: format!("learning_{stem}_{index}"),
            doc_type: DocType::Learning,
            title: section.heading.clone(),
            content: format!("{prefix}: {}\n{}", section.heading, section.body.trim()),
            source_file: source_file.to_string(),
            concepts: concepts::extract(&section.heading, &section.body),
        });
    }
}

// ── Retrospectives ───────────────────────────────────────────────────────────

fn parse_retros_dir(dir: &Path, out: &mut Vec<ParsedDocument>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    // Retrospectives nest by year/month — walk the whole subtree.
    let mut paths: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();

    for path in paths {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let stem = file_stem(&path);
        let relative = path
            .strip_prefix(dir.parent().unwrap_or(dir))
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        let source_file = format!("ψ/memory/{relative}");
        parse_retro_text(&text, &stem, &source_file, out);
    }
    Ok(())
}

/// Split a retrospective on `## ` headings; sections with fewer than
/// [`RETRO_MIN_BODY_CHARS`] characters of body are skipped.
pub fn parse_retro_text(text: &str, stem: &str, source_file: &str, out: &mut Vec<ParsedDocument>) {
    for (index, section) in split_sections(text, "## ").into_iter().enumerate() {
        let body = section.body.trim();
        if body.len() < RETRO_MIN_BODY_CHARS {
            continue;
        }
        out.push(ParsedDocument {
            id: format!("retro_{stem}_{index}"),
            doc_type: DocType::Retro,
            title: section.heading.clone(),
            content: format!("{}: {}", section.heading, body),
            source_file: source_file.to_string(),
            concepts: concepts::extract(&section.heading, body),
        });
    }
}

// ── Shared helpers ───────────────────────────────────────────────────────────

struct Section {
    heading: String,
    body: String,
}

/// Split text on lines starting with `prefix`. Text before the first heading
/// is dropped. Section index is the caller's enumeration order.
fn split_sections(text: &str, prefix: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some(heading) = line.strip_prefix(prefix) {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(Section {
                heading: heading.trim().to_string(),
                body: String::new(),
            });
        } else if let Some(section) = current.as_mut() {
            section.body.push_str(line);
            section.body.push('\n');
        }
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }
    sections
}

/// A top-level bullet line (`- ` or `* `) yields its text, else None.
fn bullet_text(line: &str) -> Option<&str> {
    let rest = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))?;
    let trimmed = rest.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Extract `title:` from a leading YAML front-matter block.
fn front_matter_title(text: &str) -> Option<String> {
    let rest = text.strip_prefix("---")?;
    let end = rest.find("\n---")?;
    for line in rest[..end].lines() {
        if let Some(value) = line.strip_prefix("title:") {
            let title = value.trim().trim_matches('"').trim_matches('\'');
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}

/// Return the text after a leading front-matter block, or the whole text.
fn strip_front_matter(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("---") else {
        return text;
    };
    match rest.find("\n---") {
        Some(end) => {
            let after = &rest[end + 4..];
            after.strip_prefix('\n').unwrap_or(after)
        }
        None => text,
    }
}

fn markdown_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
        .collect();
    paths.sort();
    Ok(paths)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
