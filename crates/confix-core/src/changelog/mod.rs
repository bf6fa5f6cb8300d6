//! Change-event log
//!
//! Every committed mutation that was assigned an [`EventId`] is recorded
//! here so it can be audited and reversed. The log lives in a directory:
//!
//! ```text
//! <log_dir>/
//!   events.toml        # all events plus the current run id of each rule
//!   snapshots/
//!     0057001.snap     # byte-exact prior content of a rewritten file
//! ```
//!
//! Saving takes an exclusive lock and writes through a temp file and rename;
//! loading takes a shared lock.

mod event;
mod permission;
mod run;

pub use event::{ChangeEvent, ChangeKind, EventId, MAX_SEQUENCE, SnapshotRef};
pub use run::RuleRun;

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Read;

use confix_content::CommandInvoker;
use confix_fs::{NormalizedPath, ReplaceOutcome, checksum, io};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logging::LogContext;
use crate::{Error, Result};

pub const EVENTS_FILE: &str = "events.toml";
pub const SNAPSHOT_DIR: &str = "snapshots";
/// Snapshots hold prior bytes of possibly secret files
const SNAPSHOT_MODE: u32 = 0o600;

/// On-disk layout of `events.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventFile {
    /// Format version for forward compatibility
    version: String,
    /// Current run id per rule number
    #[serde(default)]
    runs: BTreeMap<String, Uuid>,
    #[serde(default)]
    events: Vec<ChangeEvent>,
}

impl Default for EventFile {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            runs: BTreeMap::new(),
            events: Vec::new(),
        }
    }
}

/// Persistent store of change events
#[derive(Debug)]
pub struct ChangeLog {
    dir: NormalizedPath,
    file: EventFile,
    ctx: LogContext,
}

impl ChangeLog {
    /// Open (or create) the log in `dir`.
    pub fn open(dir: impl Into<NormalizedPath>, ctx: LogContext) -> Result<Self> {
        let dir = dir.into();
        let snapshots = dir.join(SNAPSHOT_DIR).to_native();
        fs::create_dir_all(&snapshots).map_err(|e| confix_fs::Error::io(&snapshots, e))?;

        let events_path = dir.join(EVENTS_FILE);
        let file = if events_path.exists() {
            Self::load(&events_path)?
        } else {
            EventFile::default()
        };

        {
            let _guard = ctx.enter();
            tracing::debug!(dir = %dir, events = file.events.len(), "Opened change log");
        }
        Ok(Self { dir, file, ctx })
    }

    fn load(path: &NormalizedPath) -> Result<EventFile> {
        let file = File::open(path.to_native())?;
        file.lock_shared()?;

        // Read through the locked handle
        let mut content = String::new();
        (&file).read_to_string(&mut content)?;
        Ok(toml::from_str(&content)?)
    }

    fn save(&self) -> Result<()> {
        let path = self.dir.join(EVENTS_FILE).to_native();
        let content = toml::to_string_pretty(&self.file)?;

        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        lock_file.lock_exclusive()?;

        let temp_path = path.with_extension("toml.tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    pub fn dir(&self) -> &NormalizedPath {
        &self.dir
    }

    pub fn events(&self) -> &[ChangeEvent] {
        &self.file.events
    }

    pub fn get(&self, id: EventId) -> Option<&ChangeEvent> {
        self.file.events.iter().find(|e| e.id == id)
    }

    /// Run id of the latest run of `rule`.
    pub fn run_id(&self, rule: u32) -> Option<Uuid> {
        self.file.runs.get(&rule.to_string()).copied()
    }

    pub(crate) fn set_run(&mut self, rule: u32, run_id: Uuid) -> Result<()> {
        self.file.runs.insert(rule.to_string(), run_id);
        self.save()
    }

    /// Append `event` under `id`. Ids are issued once; a second record with
    /// the same id is rejected.
    pub fn record_change_event(&mut self, id: EventId, mut event: ChangeEvent) -> Result<()> {
        let _guard = self.ctx.enter();
        if self.get(id).is_some() {
            return Err(Error::DuplicateEvent { id });
        }

        event.id = id;
        if event.run_id.is_none() {
            event.run_id = self.run_id(id.rule);
        }
        tracing::info!(id = %id, kind = event.kind.name(), target = %event.target, "Recorded change event");
        self.file.events.push(event);
        self.save()
    }

    /// Store a byte-exact snapshot of `prior` and attach it to the
    /// file-rewritten event `id`.
    pub fn record_file_change(
        &mut self,
        target: &NormalizedPath,
        prior: &[u8],
        id: EventId,
    ) -> Result<SnapshotRef> {
        let _guard = self.ctx.enter();
        let snapshot_path = self.snapshot_path(id);
        let snapshot = SnapshotRef {
            file: format!("{id}.snap"),
            checksum: checksum::compute_checksum(prior),
            size: prior.len() as u64,
        };

        let event = self
            .file
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(Error::EventNotFound { id })?;
        if &event.target != target {
            return Err(Error::change_log(format!(
                "event {id} belongs to {}, not {target}",
                event.target
            )));
        }
        let kind = event.kind.name();
        let ChangeKind::FileRewritten { snapshot: slot, .. } = &mut event.kind else {
            return Err(Error::change_log(format!(
                "event {id} is {kind}, snapshots attach to file-rewritten events"
            )));
        };

        io::write_atomic_with_mode(&snapshot_path, prior, SNAPSHOT_MODE)?;
        *slot = Some(snapshot.clone());
        tracing::debug!(id = %id, size = snapshot.size, "Stored prior-content snapshot");
        self.save()?;
        Ok(snapshot)
    }

    /// Ids of every event recorded by `rule`, in sequence order.
    pub fn find_rule_changes(&self, rule: u32) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self
            .file
            .events
            .iter()
            .filter(|e| e.id.rule == rule)
            .map(|e| e.id)
            .collect();
        ids.sort();
        ids
    }

    /// Remove an event and its snapshot.
    pub fn delete_entry(&mut self, id: EventId) -> Result<Option<ChangeEvent>> {
        let Some(pos) = self.file.events.iter().position(|e| e.id == id) else {
            return Ok(None);
        };
        let event = self.file.events.remove(pos);
        if let ChangeKind::FileRewritten {
            snapshot: Some(_), ..
        } = &event.kind
        {
            io::remove_if_exists(&self.snapshot_path(id))?;
        }
        self.save()?;
        Ok(Some(event))
    }

    /// Reverse one recorded change, then delete its entry.
    ///
    /// Store commands need an `invoker`; file changes do not.
    pub fn undo(&mut self, id: EventId, invoker: Option<&dyn CommandInvoker>) -> Result<()> {
        let ctx = self.ctx.clone();
        let _guard = ctx.enter();
        let event = self.get(id).cloned().ok_or_else(|| Error::UndoUnavailable {
            id,
            reason: "no change event was recorded".into(),
        })?;

        match &event.kind {
            ChangeKind::FileRewritten {
                snapshot,
                attributes,
            } => {
                let snapshot = snapshot.as_ref().ok_or_else(|| Error::UndoUnavailable {
                    id,
                    reason: "no prior-content snapshot".into(),
                })?;
                let prior = self.read_snapshot(id, snapshot)?;
                let outcome = io::replace_file(&event.target, &prior, attributes.as_ref())?;
                if let ReplaceOutcome::AttributesNotRestored { reason } = outcome {
                    tracing::warn!(id = %id, reason = %reason, "Content restored but attributes were not");
                }
            }
            ChangeKind::FileCreated => {
                io::remove_if_exists(&event.target)?;
            }
            ChangeKind::PermissionChange { prior, .. } => {
                prior.apply(&event.target)?;
            }
            ChangeKind::ReversibleCommand { undo, .. } => {
                let invoker = invoker.ok_or_else(|| Error::UndoUnavailable {
                    id,
                    reason: "store commands need a command invoker".into(),
                })?;
                for command in undo {
                    invoker.invoke(command)?;
                }
            }
        }

        tracing::info!(id = %id, kind = event.kind.name(), target = %event.target, "Undid change");
        self.delete_entry(id)?;
        Ok(())
    }

    /// Undo every change of `rule`, newest first. Returns how many were
    /// undone.
    pub fn undo_rule(&mut self, rule: u32, invoker: Option<&dyn CommandInvoker>) -> Result<usize> {
        let ids = self.find_rule_changes(rule);
        for id in ids.iter().rev() {
            self.undo(*id, invoker)?;
        }
        Ok(ids.len())
    }

    fn snapshot_path(&self, id: EventId) -> NormalizedPath {
        self.dir.join(SNAPSHOT_DIR).join(&format!("{id}.snap"))
    }

    fn read_snapshot(&self, id: EventId, snapshot: &SnapshotRef) -> Result<Vec<u8>> {
        let path = self.dir.join(SNAPSHOT_DIR).join(&snapshot.file);
        let bytes = io::read_bytes(&path)?.ok_or_else(|| Error::UndoUnavailable {
            id,
            reason: format!("snapshot {} is missing", snapshot.file),
        })?;
        if !checksum::verify(&bytes, &snapshot.checksum) {
            return Err(Error::UndoUnavailable {
                id,
                reason: format!("snapshot {} does not match its checksum", snapshot.file),
            });
        }
        Ok(bytes)
    }
}
