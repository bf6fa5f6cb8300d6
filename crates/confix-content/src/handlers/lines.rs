//! Line-level helpers shared by the text grammars

use std::collections::{BTreeMap, BTreeSet};

use crate::document::LiveDocument;
use crate::error::{Error, Result};
use crate::grammar::GrammarKind;
use crate::spec::DesiredEntry;

/// Decode raw target bytes, rejecting content no text grammar can hold.
pub(crate) fn decode(grammar: GrammarKind, raw: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(raw).map_err(|e| {
        let line = line_of(&raw[..e.valid_up_to()]);
        Error::malformed(grammar.name(), line, "invalid UTF-8")
    })?;

    if let Some(pos) = text.find('\0') {
        return Err(Error::malformed(
            grammar.name(),
            line_of(&raw[..pos]),
            "NUL byte in text target",
        ));
    }
    Ok(text)
}

fn line_of(prefix: &[u8]) -> usize {
    prefix.iter().filter(|&&b| b == b'\n').count() + 1
}

/// Split leading whitespace from the rest of a line.
pub(crate) fn split_indent(content: &str) -> (&str, &str) {
    let body = content.trim_start();
    (&content[..content.len() - body.len()], body)
}

/// Parsed `key<sep>value` parts of a line body.
pub(crate) struct Parts<'a> {
    pub key: &'a str,
    pub separator: &'a str,
    pub value: &'a str,
}

/// Split a body on the first `=`, keeping the surrounding whitespace as the
/// separator.
pub(crate) fn split_equals(body: &str) -> Option<Parts<'_>> {
    let pos = body.find('=')?;
    let key = body[..pos].trim_end();
    if key.is_empty() {
        return None;
    }
    let rest = &body[pos + 1..];
    let value = rest.trim();
    let separator_end = pos + 1 + (rest.len() - rest.trim_start().len());
    Some(Parts {
        key,
        separator: &body[key.len()..separator_end],
        value,
    })
}

/// Format an entry line without terminator.
pub(crate) fn format_entry(indent: &str, key: &str, separator: &str, value: &str) -> String {
    format!("{indent}{key}{separator}{value}")
        .trim_end()
        .to_string()
}

/// Reasons an entry cannot be written as a single line.
pub(crate) fn unrepresentable(entry: &DesiredEntry, forbidden_in_key: &[char]) -> Option<String> {
    let value = entry.rendered_value();
    if entry.key.contains(['\n', '\r']) || value.contains(['\n', '\r']) {
        return Some(format!("{} spans multiple lines", entry.entry_key()));
    }
    if entry.key.trim() != entry.key || entry.key.is_empty() {
        return Some(format!("key {:?} has surrounding whitespace", entry.key));
    }
    if entry.key.contains(forbidden_in_key) {
        return Some(format!("key {:?} contains a separator", entry.key));
    }
    if entry.key.starts_with(['#', ';', '[']) {
        return Some(format!("key {:?} would read as a comment or header", entry.key));
    }
    if let Some(tag) = &entry.tag
        && (tag.is_empty() || tag.contains([']', '[', '\n', '\r']))
    {
        return Some(format!("tag {tag:?} cannot be written as a block header"));
    }
    None
}

/// Line edits collected while rendering, applied in one pass.
#[derive(Debug, Default)]
pub(crate) struct LineEdits {
    replace: BTreeMap<usize, String>,
    remove: BTreeSet<usize>,
    insert: BTreeMap<usize, Vec<String>>,
}

impl LineEdits {
    pub fn replace(&mut self, line: usize, content: String) {
        self.replace.insert(line, content);
    }

    pub fn remove(&mut self, line: usize) {
        self.remove.insert(line);
    }

    /// Insert before `line`; `line == doc.lines().len()` appends.
    pub fn insert_before(&mut self, line: usize, content: String) {
        self.insert.entry(line).or_default().push(content);
    }

    /// Produce the new content. Untouched lines are copied byte-exact.
    pub fn apply(&self, doc: &LiveDocument) -> String {
        let ending = doc.line_ending();
        let mut out = String::with_capacity(doc.raw().len() + 64);

        let push_inserted = |out: &mut String, line: usize| {
            for content in self.insert.get(&line).into_iter().flatten() {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push_str(ending);
                }
                out.push_str(content);
                out.push_str(ending);
            }
        };

        for (i, line) in doc.lines().iter().enumerate() {
            push_inserted(&mut out, i);
            if self.remove.contains(&i) {
                continue;
            }
            match self.replace.get(&i) {
                Some(content) => {
                    out.push_str(content);
                    out.push_str(line.terminator());
                }
                None => out.push_str(&line.raw),
            }
        }
        push_inserted(&mut out, doc.lines().len());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reports_line_of_nul_byte() {
        let err = decode(GrammarKind::Space, b"a 1\nb\0 2\n").unwrap_err();
        assert!(matches!(err, Error::Malformed { line: 2, .. }));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let err = decode(GrammarKind::OpenEq, b"a = 1\n\xff\n").unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn split_equals_keeps_observed_separator() {
        let parts = split_equals("key  =\tvalue with  spaces ").unwrap();
        assert_eq!(parts.key, "key");
        assert_eq!(parts.separator, "  =\t");
        assert_eq!(parts.value, "value with  spaces");
    }

    #[test]
    fn split_equals_rejects_empty_key() {
        assert!(split_equals("= value").is_none());
        assert!(split_equals("no separator").is_none());
    }

    #[test]
    fn format_entry_trims_empty_values() {
        assert_eq!(format_entry("", "compress", " = ", ""), "compress =");
        assert_eq!(format_entry("  ", "rotate", " ", "4"), "  rotate 4");
    }
}
