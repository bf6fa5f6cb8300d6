//! Parsed view of a configuration target

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::grammar::GrammarKind;

/// Compute the `sha256:<hex>` fingerprint of document content.
pub fn fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("sha256:{:x}", hasher.finalize())
}

/// Lookup key for an entry: the block tag (if any) plus the key itself
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub tag: Option<String>,
    pub key: String,
}

impl EntryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            tag: None,
            key: key.into(),
        }
    }

    pub fn tagged(tag: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            key: key.into(),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "[{tag}] {}", self.key),
            None => f.write_str(&self.key),
        }
    }
}

/// A key/value pair found on one line (or one store record)
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    /// Observed value. Text grammars always yield `Value::String`.
    pub value: Value,
    /// Leading whitespace of the line
    pub indent: String,
    /// Separator text exactly as written between key and value
    pub separator: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Blank,
    Comment,
    Header { tag: String },
    Entry(Entry),
    /// Content the grammar cannot read as an entry; kept, never matched
    Opaque,
}

/// One physical line, kept byte-exact including its terminator
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub raw: String,
    pub kind: LineKind,
    /// Block scope the line belongs to
    pub tag: Option<String>,
}

impl Line {
    pub fn entry(&self) -> Option<&Entry> {
        match &self.kind {
            LineKind::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    /// The line terminator (`"\n"`, `"\r\n"` or empty on the last line).
    pub fn terminator(&self) -> &str {
        if self.raw.ends_with("\r\n") {
            "\r\n"
        } else if self.raw.ends_with('\n') {
            "\n"
        } else {
            ""
        }
    }
}

/// A tagged block: header line plus the lines up to the next header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// `None` for the preamble before the first header
    pub tag: Option<String>,
    pub start: usize,
    /// Exclusive end line
    pub end: usize,
}

/// In-memory parse of a target
#[derive(Debug, Clone)]
pub struct LiveDocument {
    grammar: GrammarKind,
    raw: String,
    lines: Vec<Line>,
    blocks: Vec<Block>,
    index: BTreeMap<EntryKey, Vec<usize>>,
    fingerprint: String,
}

impl LiveDocument {
    /// Build from parsed lines of a text grammar.
    pub fn from_lines(grammar: GrammarKind, raw: String, lines: Vec<Line>) -> Self {
        let blocks = collect_blocks(&lines);
        let index = build_index(&lines);
        let fingerprint = fingerprint(raw.as_bytes());
        Self {
            grammar,
            raw,
            lines,
            blocks,
            index,
            fingerprint,
        }
    }

    /// Build from store records. Lines carry no bytes; the fingerprint covers
    /// the records themselves.
    pub fn from_entries(grammar: GrammarKind, entries: Vec<(EntryKey, Value)>) -> Self {
        let snapshot = serde_json::to_string(
            &entries
                .iter()
                .map(|(k, v)| (k.tag.as_deref(), k.key.as_str(), v))
                .collect::<Vec<_>>(),
        )
        .unwrap_or_default();

        let lines: Vec<Line> = entries
            .into_iter()
            .map(|(key, value)| Line {
                raw: String::new(),
                tag: key.tag,
                kind: LineKind::Entry(Entry {
                    key: key.key,
                    value,
                    indent: String::new(),
                    separator: String::new(),
                }),
            })
            .collect();

        let index = build_index(&lines);
        Self {
            grammar,
            fingerprint: fingerprint(snapshot.as_bytes()),
            raw: String::new(),
            lines,
            blocks: Vec::new(),
            index,
        }
    }

    pub fn grammar(&self) -> GrammarKind {
        self.grammar
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line indexes of every occurrence of `key`, in document order.
    pub fn occurrences(&self, key: &EntryKey) -> &[usize] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entry_at(&self, line: usize) -> Option<&Entry> {
        self.lines.get(line).and_then(Line::entry)
    }

    /// First occurrence of `key`.
    pub fn first(&self, key: &EntryKey) -> Option<&Entry> {
        self.occurrences(key)
            .first()
            .and_then(|&line| self.entry_at(line))
    }

    /// Every (key, value) in document order.
    pub fn entries(&self) -> impl Iterator<Item = (EntryKey, &Entry)> {
        self.lines.iter().filter_map(|line| {
            line.entry().map(|entry| {
                (
                    EntryKey {
                        tag: line.tag.clone(),
                        key: entry.key.clone(),
                    },
                    entry,
                )
            })
        })
    }

    /// Line ending used for inserted lines.
    pub fn line_ending(&self) -> &'static str {
        if self.raw.contains("\r\n") { "\r\n" } else { "\n" }
    }

    pub fn ends_with_newline(&self) -> bool {
        self.raw.is_empty() || self.raw.ends_with('\n')
    }
}

fn build_index(lines: &[Line]) -> BTreeMap<EntryKey, Vec<usize>> {
    let mut index: BTreeMap<EntryKey, Vec<usize>> = BTreeMap::new();
    for (i, line) in lines.iter().enumerate() {
        if let Some(entry) = line.entry() {
            index
                .entry(EntryKey {
                    tag: line.tag.clone(),
                    key: entry.key.clone(),
                })
                .or_default()
                .push(i);
        }
    }
    index
}

fn collect_blocks(lines: &[Line]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current = Block {
        tag: None,
        start: 0,
        end: 0,
    };
    let mut saw_header = false;

    for (i, line) in lines.iter().enumerate() {
        if let LineKind::Header { tag } = &line.kind {
            current.end = i;
            if current.tag.is_some() || current.end > current.start {
                blocks.push(current);
            }
            current = Block {
                tag: Some(tag.clone()),
                start: i,
                end: i,
            };
            saw_header = true;
        }
    }

    if saw_header || !lines.is_empty() {
        current.end = lines.len();
        blocks.push(current);
    }
    blocks
}

/// Split content into lines that keep their terminators.
pub(crate) fn split_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.split_inclusive('\n')
}

/// Strip the terminator from a raw line.
pub(crate) fn content_of(raw: &str) -> &str {
    raw.strip_suffix('\n')
        .map(|s| s.strip_suffix('\r').unwrap_or(s))
        .unwrap_or(raw)
}
