//! Differences between a live document and desired state

use similar::TextDiff;

use crate::compare::normalize_whitespace;
use crate::document::{EntryKey, LiveDocument};
use crate::error::{Error, Result};
use crate::grammar::GrammarKind;
use crate::spec::{DesiredEntry, DesiredStateSpec, Intent};

/// A desired entry that is missing or holds the wrong value
#[derive(Debug, Clone, PartialEq)]
pub struct Addition {
    pub entry: DesiredEntry,
    /// Line to replace in place, or `None` to insert
    pub replaces: Option<usize>,
}

/// An entry that must go under [`Intent::Absent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub key: EntryKey,
    pub line: usize,
}

/// Minimal changes that reconcile a document with desired state
#[derive(Debug, Clone, PartialEq)]
pub struct Diff {
    pub grammar: GrammarKind,
    pub intent: Intent,
    pub to_add: Vec<Addition>,
    pub to_remove: Vec<Removal>,
    /// False when the changes cannot be expressed safely
    pub fixable: bool,
    /// Why the diff is not fixable
    pub conflicts: Vec<String>,
    /// Fingerprint of the document this diff was derived from
    pub fingerprint: String,
}

impl Diff {
    /// An empty, fixable diff bound to `doc`.
    pub fn empty(doc: &LiveDocument, intent: Intent) -> Self {
        Self {
            grammar: doc.grammar(),
            intent,
            to_add: Vec::new(),
            to_remove: Vec::new(),
            fixable: true,
            conflicts: Vec::new(),
            fingerprint: doc.fingerprint().to_string(),
        }
    }

    /// Compare `doc` with `spec` entry by entry.
    ///
    /// Only the first occurrence of a repeated key is evaluated under
    /// [`Intent::Present`]; later occurrences are left as they are. Under
    /// [`Intent::Absent`] every matching occurrence is removed.
    pub fn compute(doc: &LiveDocument, spec: &DesiredStateSpec, intent: Intent) -> Self {
        let mut diff = Self::empty(doc, intent);

        for (position, entry) in spec.entries().iter().enumerate() {
            let key = entry.entry_key();

            let earlier = spec.entries()[..position]
                .iter()
                .find(|e| e.tag == entry.tag && e.key == entry.key);
            if let Some(earlier) = earlier {
                if earlier.value != entry.value || earlier.comparison != entry.comparison {
                    diff.conflict(format!("{key} is desired twice with different values"));
                }
                continue;
            }

            let occurrences = doc.occurrences(&key);
            match intent {
                Intent::Present => {
                    let Some(&first) = occurrences.first() else {
                        diff.to_add.push(Addition {
                            entry: entry.clone(),
                            replaces: None,
                        });
                        continue;
                    };
                    let Some(observed) = doc.entry_at(first) else {
                        continue;
                    };

                    if has_conflicting_duplicates(doc, occurrences) {
                        tracing::warn!(
                            key = %key,
                            count = occurrences.len(),
                            "Key repeated with conflicting values; only the first occurrence is evaluated"
                        );
                    }

                    if !entry.comparison.satisfies(&observed.value, &entry.value) {
                        diff.to_add.push(Addition {
                            entry: entry.clone(),
                            replaces: Some(first),
                        });
                    }
                }
                Intent::Absent => {
                    for &line in occurrences {
                        let Some(observed) = doc.entry_at(line) else {
                            continue;
                        };
                        if entry.value.is_null()
                            || entry.comparison.satisfies(&observed.value, &entry.value)
                        {
                            diff.to_remove.push(Removal {
                                key: key.clone(),
                                line,
                            });
                        }
                    }
                }
            }
        }

        tracing::debug!(
            grammar = %diff.grammar,
            additions = diff.to_add.len(),
            removals = diff.to_remove.len(),
            fixable = diff.fixable,
            "Computed diff"
        );
        diff
    }

    /// Mark the diff as not safely expressible.
    pub fn conflict(&mut self, reason: impl Into<String>) {
        self.fixable = false;
        self.conflicts.push(reason.into());
    }

    /// No changes are needed.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// The document already satisfies the desired state.
    pub fn is_compliant(&self) -> bool {
        self.is_empty() && self.fixable
    }

    /// Refuse to apply this diff to a document it was not derived from.
    pub fn ensure_derived_from(&self, doc: &LiveDocument) -> Result<()> {
        if self.fingerprint != doc.fingerprint() {
            return Err(Error::StaleDiff {
                expected: self.fingerprint.clone(),
                actual: doc.fingerprint().to_string(),
            });
        }
        Ok(())
    }

    /// Refuse to render a diff that is not fixable.
    pub fn ensure_fixable(&self) -> Result<()> {
        if self.fixable {
            Ok(())
        } else {
            Err(Error::conflict(self.grammar.name(), self.conflicts.join("; ")))
        }
    }

    /// Unified text diff between original and rendered content, for audit
    /// output.
    pub fn preview(original: &str, rendered: &str, target: &str) -> String {
        TextDiff::from_lines(original, rendered)
            .unified_diff()
            .context_radius(2)
            .header(target, target)
            .to_string()
    }
}

fn has_conflicting_duplicates(doc: &LiveDocument, occurrences: &[usize]) -> bool {
    let mut values = occurrences
        .iter()
        .filter_map(|&line| doc.entry_at(line))
        .map(|entry| normalize_whitespace(&crate::compare::render_value(&entry.value)));
    match values.next() {
        Some(first) => values.any(|v| v != first),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::Comparison;
    use crate::grammar::GrammarAdapter;
    use crate::handlers::SeparatedHandler;
    use serde_json::json;

    fn parse(raw: &str) -> LiveDocument {
        SeparatedHandler::new(GrammarKind::OpenEq)
            .unwrap()
            .parse(raw.as_bytes())
            .unwrap()
    }

    #[test]
    fn missing_key_is_an_insertion() {
        let doc = parse("a = 1\n");
        let spec = DesiredStateSpec::new().with("b", 2);
        let diff = Diff::compute(&doc, &spec, Intent::Present);

        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_add[0].replaces, None);
        assert!(!diff.is_compliant());
    }

    #[test]
    fn wrong_value_replaces_first_occurrence() {
        let doc = parse("a = 1\na = 5\n");
        let spec = DesiredStateSpec::new().with("a", 5);
        let diff = Diff::compute(&doc, &spec, Intent::Present);

        assert_eq!(diff.to_add[0].replaces, Some(0));
    }

    #[test]
    fn tolerance_satisfied_is_compliant() {
        let doc = parse("minlen = 15\n");
        let spec = DesiredStateSpec::new()
            .with_entry(DesiredEntry::new("minlen", 14).with_comparison(Comparison::AtLeast));
        assert!(Diff::compute(&doc, &spec, Intent::Present).is_compliant());
    }

    #[test]
    fn absent_removes_every_matching_occurrence() {
        let doc = parse("a = 1\nb = 2\na = 1\na = 3\n");
        let spec = DesiredStateSpec::new().with("a", 1);
        let diff = Diff::compute(&doc, &spec, Intent::Absent);

        let lines: Vec<_> = diff.to_remove.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![0, 2]);
    }

    #[test]
    fn absent_with_null_removes_any_value() {
        let doc = parse("a = 1\na = 3\n");
        let spec = DesiredStateSpec::new().with("a", json!(null));
        let diff = Diff::compute(&doc, &spec, Intent::Absent);
        assert_eq!(diff.to_remove.len(), 2);
    }

    #[test]
    fn contradictory_spec_is_not_fixable() {
        let doc = parse("");
        let spec = DesiredStateSpec::new().with("a", 1).with("a", 2);
        let diff = Diff::compute(&doc, &spec, Intent::Present);

        assert!(!diff.fixable);
        assert!(diff.ensure_fixable().unwrap_err().is_render_conflict());
    }

    #[test]
    fn stale_diff_is_rejected() {
        let doc = parse("a = 1\n");
        let other = parse("a = 2\n");
        let diff = Diff::compute(&doc, &DesiredStateSpec::new().with("a", 3), Intent::Present);

        assert!(diff.ensure_derived_from(&doc).is_ok());
        assert!(matches!(
            diff.ensure_derived_from(&other),
            Err(Error::StaleDiff { .. })
        ));
    }

    #[test]
    fn preview_shows_changed_lines() {
        let preview = Diff::preview("a = 1\n", "a = 2\n", "app.conf");
        assert!(preview.contains("-a = 1"));
        assert!(preview.contains("+a = 2"));
    }
}
