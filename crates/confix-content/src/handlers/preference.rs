//! Handler for the host preference store

use std::sync::Arc;

use crate::diff::Diff;
use crate::document::{EntryKey, LiveDocument};
use crate::error::{Error, Result};
use crate::grammar::{GrammarAdapter, GrammarKind, PlannedCommand, Rendered};
use crate::spec::{DesiredStateSpec, Intent};
use crate::store::{CommandInvoker, PreferenceStore, StoreCommand};

/// Reconciles `domain → key → value` preferences through an injected store.
///
/// Desired entries use the tag as the preference domain.
#[derive(Clone)]
pub struct PreferenceHandler {
    store: Arc<dyn PreferenceStore>,
}

impl PreferenceHandler {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for PreferenceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceHandler").finish_non_exhaustive()
    }
}

impl GrammarAdapter for PreferenceHandler {
    fn kind(&self) -> GrammarKind {
        GrammarKind::HostPrefStore
    }

    fn parse(&self, _raw: &[u8]) -> Result<LiveDocument> {
        let mut entries = Vec::new();
        for domain in self.store.domains()? {
            for (key, value) in self.store.read(&domain)? {
                entries.push((EntryKey::tagged(domain.clone(), key), value));
            }
        }
        Ok(LiveDocument::from_entries(GrammarKind::HostPrefStore, entries))
    }

    fn matches(&self, doc: &LiveDocument, spec: &DesiredStateSpec, intent: Intent) -> Diff {
        let mut diff = Diff::compute(doc, spec, intent);
        for entry in spec.entries() {
            if entry.tag.is_none() {
                diff.conflict(format!("preference {} has no domain", entry.key));
            } else if intent == Intent::Present && entry.value.is_null() {
                diff.conflict(format!("preference {} has no value to write", entry.entry_key()));
            }
        }
        diff
    }

    fn render(&self, doc: &LiveDocument, diff: &Diff) -> Result<Rendered> {
        diff.ensure_derived_from(doc)?;
        diff.ensure_fixable()?;

        let mut planned = Vec::new();
        for addition in &diff.to_add {
            let entry = &addition.entry;
            let domain = entry.tag.clone().unwrap_or_default();
            let prior = doc.first(&entry.entry_key()).map(|e| e.value.clone());

            planned.push(PlannedCommand {
                command: StoreCommand::SetPreference {
                    domain: domain.clone(),
                    key: entry.key.clone(),
                    value: entry.value.clone(),
                },
                undo: match prior {
                    Some(value) => StoreCommand::SetPreference {
                        domain,
                        key: entry.key.clone(),
                        value,
                    },
                    None => StoreCommand::DeletePreference {
                        domain,
                        key: entry.key.clone(),
                    },
                },
            });
        }

        for removal in &diff.to_remove {
            let Some(prior) = doc.entry_at(removal.line) else {
                continue;
            };
            let domain = removal.key.tag.clone().unwrap_or_default();
            planned.push(PlannedCommand {
                command: StoreCommand::DeletePreference {
                    domain: domain.clone(),
                    key: removal.key.key.clone(),
                },
                undo: StoreCommand::SetPreference {
                    domain,
                    key: removal.key.key.clone(),
                    value: prior.value.clone(),
                },
            });
        }

        Ok(Rendered::Commands(planned))
    }

    fn execute(&self, command: &StoreCommand) -> Result<()> {
        tracing::debug!(command = %command.describe(), "Executing preference command");
        match command {
            StoreCommand::SetPreference { domain, key, value } => {
                self.store.write(domain, key, value)
            }
            StoreCommand::DeletePreference { domain, key } => self.store.delete(domain, key),
            _ => Err(Error::CommandsUnsupported {
                grammar: format!("{} ({})", self.kind(), command.describe()),
            }),
        }
    }
}

impl CommandInvoker for PreferenceHandler {
    fn invoke(&self, command: &StoreCommand) -> Result<()> {
        self.execute(command)
    }
}
