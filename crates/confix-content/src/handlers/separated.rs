//! Handler for `key<sep>value` grammars: open-eq, closed-eq and space

use super::lines::{self, LineEdits};
use crate::diff::Diff;
use crate::document::{Entry, Line, LineKind, LiveDocument, content_of, split_lines};
use crate::error::{Error, Result};
use crate::grammar::{GrammarAdapter, GrammarKind, Rendered};
use crate::spec::{DesiredStateSpec, Intent};
use serde_json::Value;

/// Handler for line-oriented key/value files split on a single separator
#[derive(Debug, Clone, Copy)]
pub struct SeparatedHandler {
    kind: GrammarKind,
}

impl SeparatedHandler {
    /// Fails for grammars that are not separator-based.
    pub fn new(kind: GrammarKind) -> Result<Self> {
        match kind {
            GrammarKind::OpenEq | GrammarKind::ClosedEq | GrammarKind::Space => Ok(Self { kind }),
            other => Err(Error::InvalidSpec {
                message: format!("{other} is not a separated grammar"),
            }),
        }
    }

    /// Separator written for appended lines.
    pub fn canonical_separator(&self) -> &'static str {
        match self.kind {
            GrammarKind::OpenEq => " = ",
            GrammarKind::ClosedEq => "=",
            _ => " ",
        }
    }

    fn classify(&self, content: &str) -> LineKind {
        let (indent, body) = lines::split_indent(content);
        if body.is_empty() {
            return LineKind::Blank;
        }
        if body.starts_with('#') {
            return LineKind::Comment;
        }

        let parts = match self.kind {
            GrammarKind::Space => Some(split_space(body)),
            _ => lines::split_equals(body),
        };
        match parts {
            Some(parts) => LineKind::Entry(Entry {
                key: parts.key.to_string(),
                value: Value::String(parts.value.to_string()),
                indent: indent.to_string(),
                separator: parts.separator.to_string(),
            }),
            None => LineKind::Opaque,
        }
    }

    fn forbidden_in_key(&self) -> &'static [char] {
        match self.kind {
            GrammarKind::Space => &[' ', '\t'],
            _ => &['='],
        }
    }
}

fn split_space(body: &str) -> lines::Parts<'_> {
    match body.find(char::is_whitespace) {
        Some(pos) => {
            let rest = &body[pos..];
            let value = rest.trim();
            lines::Parts {
                key: &body[..pos],
                separator: &rest[..rest.len() - rest.trim_start().len()],
                value,
            }
        }
        None => lines::Parts {
            key: body,
            separator: "",
            value: "",
        },
    }
}

impl GrammarAdapter for SeparatedHandler {
    fn kind(&self) -> GrammarKind {
        self.kind
    }

    fn parse(&self, raw: &[u8]) -> Result<LiveDocument> {
        let text = lines::decode(self.kind, raw)?;
        let parsed = split_lines(text)
            .map(|raw_line| Line {
                raw: raw_line.to_string(),
                kind: self.classify(content_of(raw_line)),
                tag: None,
            })
            .collect();

        Ok(LiveDocument::from_lines(self.kind, text.to_string(), parsed))
    }

    fn matches(&self, doc: &LiveDocument, spec: &DesiredStateSpec, intent: Intent) -> Diff {
        let mut diff = Diff::compute(doc, spec, intent);
        for entry in spec.entries() {
            if entry.tag.is_some() {
                diff.conflict(format!("{} is scoped but {} has no blocks", entry.entry_key(), self.kind));
            } else if intent == Intent::Present
                && let Some(reason) = lines::unrepresentable(entry, self.forbidden_in_key())
            {
                diff.conflict(reason);
            }
        }
        diff
    }

    fn render(&self, doc: &LiveDocument, diff: &Diff) -> Result<Rendered> {
        diff.ensure_derived_from(doc)?;
        diff.ensure_fixable()?;

        let mut edits = LineEdits::default();
        for addition in &diff.to_add {
            let entry = &addition.entry;
            let value = entry.rendered_value();
            match addition.replaces.and_then(|line| doc.entry_at(line).map(|e| (line, e))) {
                Some((line, existing)) => {
                    let separator = if existing.separator.is_empty() {
                        self.canonical_separator()
                    } else {
                        existing.separator.as_str()
                    };
                    edits.replace(
                        line,
                        lines::format_entry(&existing.indent, &existing.key, separator, &value),
                    );
                }
                None => edits.insert_before(
                    doc.lines().len(),
                    lines::format_entry("", &entry.key, self.canonical_separator(), &value),
                ),
            }
        }
        for removal in &diff.to_remove {
            edits.remove(removal.line);
        }

        Ok(Rendered::Text(edits.apply(doc)))
    }
}
