//! Handler for `[tag]` block files with scoped `key = value` entries

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::lines::{self, LineEdits};
use crate::diff::Diff;
use crate::document::{Entry, Line, LineKind, LiveDocument, content_of, split_lines};
use crate::error::{Error, Result};
use crate::grammar::{GrammarAdapter, GrammarKind, Rendered};
use crate::spec::{DesiredStateSpec, Intent};

/// Block header, optionally followed by a comment
pub static HEADER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[([^\[\]]+)\]\s*(?:[#;].*)?$").unwrap());

const DEFAULT_SEPARATOR: &str = " = ";

/// Handler for INI-style tagged-block files
#[derive(Debug, Default, Clone, Copy)]
pub struct TaggedBlockHandler;

impl TaggedBlockHandler {
    pub fn new() -> Self {
        Self
    }

    /// Separator for inserted entries: the document's own style, or ` = `.
    /// Entries with an empty value lose trailing whitespace, so they don't
    /// count.
    fn separator_for(doc: &LiveDocument) -> String {
        doc.entries()
            .find(|(_, entry)| entry.value.as_str().is_some_and(|v| !v.is_empty()))
            .map(|(_, entry)| entry.separator.clone())
            .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string())
    }

    /// Line before which new entries of the block `start..end` go: after its
    /// last entry, else after its header, else (preamble) before the first
    /// header.
    fn insertion_point(doc: &LiveDocument, start: usize, end: usize) -> usize {
        (start..end)
            .rev()
            .find(|&i| doc.entry_at(i).is_some())
            .map(|i| i + 1)
            .unwrap_or_else(|| match doc.lines().get(start).map(|l| &l.kind) {
                Some(LineKind::Header { .. }) => start + 1,
                _ => end,
            })
    }

    fn block_of(doc: &LiveDocument, line: usize) -> Option<usize> {
        doc.blocks()
            .iter()
            .position(|b| b.start <= line && line < b.end)
    }
}

impl GrammarAdapter for TaggedBlockHandler {
    fn kind(&self) -> GrammarKind {
        GrammarKind::TaggedBlock
    }

    fn parse(&self, raw: &[u8]) -> Result<LiveDocument> {
        let text = lines::decode(GrammarKind::TaggedBlock, raw)?;
        let mut parsed = Vec::new();
        let mut scope: Option<String> = None;

        for (number, raw_line) in split_lines(text).enumerate() {
            let (indent, body) = lines::split_indent(content_of(raw_line));
            let kind = if body.is_empty() {
                LineKind::Blank
            } else if body.starts_with(['#', ';']) {
                LineKind::Comment
            } else if body.starts_with('[') {
                let caps = HEADER_PATTERN.captures(body).ok_or_else(|| {
                    Error::malformed(
                        GrammarKind::TaggedBlock.name(),
                        number + 1,
                        format!("unterminated block header {body:?}"),
                    )
                })?;
                let tag = caps[1].trim().to_string();
                scope = Some(tag.clone());
                LineKind::Header { tag }
            } else {
                match lines::split_equals(body) {
                    Some(parts) => LineKind::Entry(Entry {
                        key: parts.key.to_string(),
                        value: Value::String(parts.value.to_string()),
                        indent: indent.to_string(),
                        separator: parts.separator.to_string(),
                    }),
                    None => LineKind::Opaque,
                }
            };

            parsed.push(Line {
                raw: raw_line.to_string(),
                kind,
                tag: scope.clone(),
            });
        }

        let doc = LiveDocument::from_lines(GrammarKind::TaggedBlock, text.to_string(), parsed);
        tracing::debug!(blocks = doc.blocks().len(), "Parsed tagged-block document");
        Ok(doc)
    }

    fn matches(&self, doc: &LiveDocument, spec: &DesiredStateSpec, intent: Intent) -> Diff {
        let mut diff = Diff::compute(doc, spec, intent);

        for entry in spec.entries() {
            if intent == Intent::Present
                && let Some(reason) = lines::unrepresentable(entry, &['='])
            {
                diff.conflict(reason);
                continue;
            }

            let key = entry.entry_key();
            let occurrences = doc.occurrences(&key);
            let Some(&first) = occurrences.first() else {
                continue;
            };
            let first_block = Self::block_of(doc, first);
            let first_value = doc.entry_at(first).map(|e| e.value.clone());

            let split = occurrences.iter().skip(1).any(|&line| {
                Self::block_of(doc, line) != first_block
                    && doc.entry_at(line).map(|e| e.value.clone()) != first_value
            });
            if split && intent == Intent::Present {
                diff.conflict(format!(
                    "{key} has different values in repeated [{}] blocks",
                    entry.tag.as_deref().unwrap_or_default()
                ));
            }
        }
        diff
    }

    fn render(&self, doc: &LiveDocument, diff: &Diff) -> Result<Rendered> {
        diff.ensure_derived_from(doc)?;
        diff.ensure_fixable()?;

        let separator = Self::separator_for(doc);
        let end = doc.lines().len();
        let first_header = doc
            .lines()
            .iter()
            .position(|l| matches!(l.kind, LineKind::Header { .. }));

        let mut edits = LineEdits::default();
        let mut appended: Vec<String> = Vec::new();
        let mut new_blocks: Vec<(String, Vec<String>)> = Vec::new();

        for addition in &diff.to_add {
            let entry = &addition.entry;
            let value = entry.rendered_value();

            if let Some(line) = addition.replaces
                && let Some(existing) = doc.entry_at(line)
            {
                edits.replace(
                    line,
                    lines::format_entry(&existing.indent, &existing.key, &existing.separator, &value),
                );
                continue;
            }

            let text = lines::format_entry("", &entry.key, &separator, &value);
            let block = doc.blocks().iter().find(|b| b.tag == entry.tag);
            match (&entry.tag, block) {
                (_, Some(block)) => {
                    edits.insert_before(Self::insertion_point(doc, block.start, block.end), text)
                }
                (None, None) => match first_header {
                    Some(header) => edits.insert_before(header, text),
                    None => appended.push(text),
                },
                (Some(tag), None) => match new_blocks.iter_mut().find(|(t, _)| t == tag) {
                    Some((_, entries)) => entries.push(text),
                    None => new_blocks.push((tag.clone(), vec![text])),
                },
            }
        }

        for removal in &diff.to_remove {
            edits.remove(removal.line);
        }

        let mut last_blank = doc
            .lines()
            .last()
            .is_none_or(|l| l.kind == LineKind::Blank);
        for text in appended {
            edits.insert_before(end, text);
            last_blank = false;
        }
        for (tag, entries) in new_blocks {
            if !last_blank {
                edits.insert_before(end, String::new());
            }
            edits.insert_before(end, format!("[{tag}]"));
            for text in entries {
                edits.insert_before(end, text);
            }
            last_blank = false;
        }

        Ok(Rendered::Text(edits.apply(doc)))
    }
}
