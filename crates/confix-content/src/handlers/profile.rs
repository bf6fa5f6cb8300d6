//! Handler for the host profile list

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::diff::Diff;
use crate::document::{EntryKey, LiveDocument};
use crate::error::{Error, Result};
use crate::grammar::{GrammarAdapter, GrammarKind, PlannedCommand, Rendered};
use crate::spec::{DesiredStateSpec, Intent};
use crate::store::{CommandInvoker, ProfileStore, StoreCommand};

/// Reconciles installed profiles and their option trees.
///
/// Each desired entry is a profile identifier whose value is the option
/// tree it must carry. An installed profile matches when every desired
/// option is present and satisfies the entry's comparison.
#[derive(Clone)]
pub struct ProfileHandler {
    store: Arc<dyn ProfileStore>,
}

impl ProfileHandler {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for ProfileHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileHandler").finish_non_exhaustive()
    }
}

/// Overlay `desired` onto `prior`, recursing into objects.
fn merge_options(prior: &Value, desired: &Value) -> Value {
    match (prior, desired) {
        (Value::Object(prior), Value::Object(desired)) => {
            let mut merged: Map<String, Value> = prior.clone();
            for (key, value) in desired {
                let next = match merged.get(key) {
                    Some(existing) => merge_options(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, desired) => desired.clone(),
    }
}

impl GrammarAdapter for ProfileHandler {
    fn kind(&self) -> GrammarKind {
        GrammarKind::HostProfileList
    }

    fn parse(&self, _raw: &[u8]) -> Result<LiveDocument> {
        let entries = self
            .store
            .installed()?
            .into_iter()
            .map(|p| (EntryKey::new(p.identifier), p.options))
            .collect();
        Ok(LiveDocument::from_entries(GrammarKind::HostProfileList, entries))
    }

    fn matches(&self, doc: &LiveDocument, spec: &DesiredStateSpec, intent: Intent) -> Diff {
        // A bare identifier only asks for the profile to be installed
        let mut normalized = DesiredStateSpec::new();
        for entry in spec.entries() {
            let mut entry = entry.clone();
            if entry.value.is_null() && intent == Intent::Present {
                entry.value = Value::Object(Map::new());
            }
            normalized.push(entry);
        }

        let mut diff = Diff::compute(doc, &normalized, intent);
        for entry in normalized.entries() {
            if entry.tag.is_some() {
                diff.conflict(format!("profile {} cannot be scoped", entry.key));
            } else if !entry.value.is_object() && !entry.value.is_null() {
                diff.conflict(format!("profile {} options must be a mapping", entry.key));
            }
        }
        diff
    }

    fn render(&self, doc: &LiveDocument, diff: &Diff) -> Result<Rendered> {
        diff.ensure_derived_from(doc)?;
        diff.ensure_fixable()?;

        let mut planned = Vec::new();
        for addition in &diff.to_add {
            let identifier = addition.entry.key.clone();
            let prior = doc
                .first(&addition.entry.entry_key())
                .map(|e| e.value.clone());

            let options = match &prior {
                Some(prior) => merge_options(prior, &addition.entry.value),
                None => addition.entry.value.clone(),
            };
            planned.push(PlannedCommand {
                command: StoreCommand::InstallProfile {
                    identifier: identifier.clone(),
                    options,
                },
                undo: match prior {
                    Some(options) => StoreCommand::InstallProfile {
                        identifier,
                        options,
                    },
                    None => StoreCommand::RemoveProfile { identifier },
                },
            });
        }

        for removal in &diff.to_remove {
            let Some(prior) = doc.entry_at(removal.line) else {
                continue;
            };
            planned.push(PlannedCommand {
                command: StoreCommand::RemoveProfile {
                    identifier: removal.key.key.clone(),
                },
                undo: StoreCommand::InstallProfile {
                    identifier: removal.key.key.clone(),
                    options: prior.value.clone(),
                },
            });
        }

        Ok(Rendered::Commands(planned))
    }

    fn execute(&self, command: &StoreCommand) -> Result<()> {
        tracing::debug!(command = %command.describe(), "Executing profile command");
        match command {
            StoreCommand::InstallProfile {
                identifier,
                options,
            } => self.store.install(identifier, options),
            StoreCommand::RemoveProfile { identifier } => self.store.remove(identifier),
            _ => Err(Error::CommandsUnsupported {
                grammar: format!("{} ({})", self.kind(), command.describe()),
            }),
        }
    }
}

impl CommandInvoker for ProfileHandler {
    fn invoke(&self, command: &StoreCommand) -> Result<()> {
        self.execute(command)
    }
}
