//! Reconciliation session: report → fix → commit for one target
//!
//! ```text
//! Initialized ──report──▶ Reported ──fix──▶ Fixed ──commit──▶ Committed
//!      ▲                     ▲  ▲             │
//!      └──── reset ──────────┘  └── report ───┘        (any) ──error──▶ Failed
//! ```

use std::fmt;

use confix_content::{DesiredStateSpec, PlannedCommand};
use confix_fs::{FileAttributes, NormalizedPath, ReplaceOutcome, io};

use crate::changelog::{ChangeEvent, ChangeKind, ChangeLog, EventId};
use crate::editor::{Compliance, KvEditor, Staged};
use crate::logging::LogContext;
use crate::settings::EngineSettings;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initialized,
    Reported,
    Fixed,
    Committed,
    /// Needs [`Session::reset`] before further use
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Reported => "reported",
            Self::Fixed => "fixed",
            Self::Committed => "committed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// Content replaced but ownership/permissions could not be restored
    AppliedPartially { reason: String },
    /// Nothing to apply
    NoChange,
}

/// Binds one [`KvEditor`] to its target, staging file and the change log
pub struct Session<'a> {
    editor: KvEditor,
    log: &'a mut ChangeLog,
    settings: EngineSettings,
    ctx: LogContext,
    state: SessionState,
    event_id: Option<EventId>,
    attributes: Option<FileAttributes>,
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("editor", &self.editor)
            .field("state", &self.state)
            .field("event_id", &self.event_id)
            .finish_non_exhaustive()
    }
}

impl<'a> Session<'a> {
    pub fn new(
        mut editor: KvEditor,
        log: &'a mut ChangeLog,
        settings: &EngineSettings,
        ctx: LogContext,
    ) -> Self {
        let staging = settings.staging_path(editor.target());
        editor.set_staging(staging);
        Self {
            editor,
            log,
            settings: settings.clone(),
            ctx,
            state: SessionState::Initialized,
            event_id: None,
            attributes: None,
        }
    }

    /// Give the target these ownership and permission bits on commit
    /// instead of the ones it had before.
    pub fn with_attributes(mut self, attributes: FileAttributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn editor(&self) -> &KvEditor {
        &self.editor
    }

    pub fn target(&self) -> &NormalizedPath {
        self.editor.target()
    }

    pub fn staging(&self) -> &NormalizedPath {
        self.editor.staging()
    }

    pub fn event_id(&self) -> Option<EventId> {
        self.event_id
    }

    pub fn log(&self) -> &ChangeLog {
        self.log
    }

    /// Make the next commit undoable under `id`.
    pub fn set_event_id(&mut self, id: EventId) {
        self.event_id = Some(id);
    }

    fn fail(&mut self, error: Error) -> Error {
        tracing::warn!(target = %self.editor.target(), code = ?error.code(), error = %error, "Session failed");
        self.state = SessionState::Failed;
        error
    }

    fn require_not_failed(&self, operation: &'static str) -> Result<()> {
        if self.state == SessionState::Failed {
            return Err(Error::InvalidTransition {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Check the target against desired state. Leaves target and staging
    /// file alone; an uncommitted fix has to be redone afterwards.
    pub fn report(&mut self) -> Result<Compliance> {
        let ctx = self.ctx.clone();
        let _guard = ctx.enter();
        self.require_not_failed("report")?;

        match self.editor.report() {
            Ok(compliance) => {
                self.state = SessionState::Reported;
                Ok(compliance)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Stage corrected output. Returns `false` when the grammar cannot
    /// express the change; the session stays reported in that case.
    pub fn fix(&mut self) -> Result<bool> {
        let ctx = self.ctx.clone();
        let _guard = ctx.enter();
        self.require_not_failed("fix")?;

        match self.editor.fix() {
            Ok(true) => {
                self.state = SessionState::Fixed;
                Ok(true)
            }
            Ok(false) => {
                self.state = SessionState::Reported;
                Ok(false)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Apply staged output. Returns `true` for every success, including a
    /// repeated commit and a commit with nothing to change.
    pub fn commit(&mut self) -> bool {
        match self.commit_detailed() {
            Ok(CommitOutcome::Applied | CommitOutcome::NoChange) => true,
            Ok(CommitOutcome::AppliedPartially { reason }) => {
                tracing::warn!(target = %self.editor.target(), reason = %reason, "Committed with stale attributes");
                true
            }
            Err(e) => {
                tracing::warn!(target = %self.editor.target(), code = ?e.code(), error = %e, "Commit failed");
                false
            }
        }
    }

    /// Apply staged output and record it in the change log when an event id
    /// is assigned.
    pub fn commit_detailed(&mut self) -> Result<CommitOutcome> {
        let ctx = self.ctx.clone();
        let _guard = ctx.enter();

        match self.state {
            SessionState::Committed => return Ok(CommitOutcome::NoChange),
            SessionState::Fixed => {}
            state => {
                return Err(Error::InvalidTransition {
                    operation: "commit",
                    state,
                });
            }
        }

        let Some(staged) = self.editor.take_staged() else {
            return Err(Error::InvalidTransition {
                operation: "commit",
                state: self.state,
            });
        };

        if self.settings.revalidate_before_commit
            && let Err(e) = self.revalidate(&staged)
        {
            if let Staged::Text { staging, .. } = &staged {
                remove_staging(staging);
            }
            return Err(self.fail(e));
        }

        let result = match staged {
            Staged::Nothing { .. } => Ok(CommitOutcome::NoChange),
            Staged::Text {
                content,
                staging,
                prior,
                ..
            } => self.commit_text(&content, &staging, prior),
            Staged::Commands { commands, .. } => self.commit_commands(commands),
        };

        match result {
            Ok(outcome) => {
                self.state = SessionState::Committed;
                tracing::info!(target = %self.editor.target(), ?outcome, event = ?self.event_id.map(|id| id.to_string()), "Committed");
                Ok(outcome)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Refuse to commit if the target moved on since fix.
    fn revalidate(&self, staged: &Staged) -> Result<()> {
        let changed = match staged {
            Staged::Text { prior, .. } => self.editor.read_target()? != *prior,
            Staged::Nothing { fingerprint } | Staged::Commands { fingerprint, .. } => {
                let (doc, _) = self.editor.parse_current()?;
                doc.fingerprint() != fingerprint
            }
        };
        if changed {
            return Err(Error::TargetChanged {
                target: self.editor.target().to_string(),
            });
        }
        Ok(())
    }

    /// Record the event and snapshot, then rename into place. A failed
    /// rename drops the entry again so the log never describes a rewrite
    /// that did not happen.
    fn commit_text(
        &mut self,
        content: &str,
        staging: &NormalizedPath,
        prior: Option<Vec<u8>>,
    ) -> Result<CommitOutcome> {
        let target = self.editor.target().clone();
        let captured = if self.settings.preserve_permissions {
            match FileAttributes::capture(&target) {
                Ok(captured) => captured,
                Err(e) => {
                    remove_staging(staging);
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        if let Some(id) = self.event_id
            && let Err(e) = self.record_text_change(id, &target, prior.as_deref(), captured)
        {
            remove_staging(staging);
            return Err(e);
        }

        let applied = self.attributes.or(captured);
        let replaced = io::replace_file(&target, content.as_bytes(), applied.as_ref());
        remove_staging(staging);

        match replaced {
            Ok(ReplaceOutcome::Replaced) => Ok(CommitOutcome::Applied),
            Ok(ReplaceOutcome::AttributesNotRestored { reason }) => {
                Ok(CommitOutcome::AppliedPartially { reason })
            }
            Err(e) => {
                if let Some(id) = self.event_id
                    && let Err(cleanup) = self.log.delete_entry(id)
                {
                    tracing::warn!(id = %id, error = %cleanup, "Could not drop event for failed rewrite");
                }
                Err(e.into())
            }
        }
    }

    fn record_text_change(
        &mut self,
        id: EventId,
        target: &NormalizedPath,
        prior: Option<&[u8]>,
        attributes: Option<FileAttributes>,
    ) -> Result<()> {
        match prior {
            Some(prior) => {
                let kind = ChangeKind::FileRewritten {
                    snapshot: None,
                    attributes,
                };
                self.log
                    .record_change_event(id, ChangeEvent::new(id, target.clone(), kind))?;
                if let Err(e) = self.log.record_file_change(target, prior, id) {
                    if let Err(cleanup) = self.log.delete_entry(id) {
                        tracing::warn!(id = %id, error = %cleanup, "Could not drop event without snapshot");
                    }
                    return Err(e);
                }
                Ok(())
            }
            None => self.log.record_change_event(
                id,
                ChangeEvent::new(id, target.clone(), ChangeKind::FileCreated),
            ),
        }
    }

    fn commit_commands(&mut self, commands: Vec<PlannedCommand>) -> Result<CommitOutcome> {
        if commands.is_empty() {
            return Ok(CommitOutcome::NoChange);
        }
        if let Some(id) = self.event_id
            && self.log.get(id).is_some()
        {
            return Err(Error::DuplicateEvent { id });
        }

        let mut executed: Vec<&PlannedCommand> = Vec::new();
        let mut failure = None;
        for planned in &commands {
            match self.editor.adapter().execute(&planned.command) {
                Ok(()) => executed.push(planned),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        // Whatever ran must stay undoable, even after a failure
        if let Some(id) = self.event_id
            && !executed.is_empty()
        {
            let kind = ChangeKind::ReversibleCommand {
                commands: executed.iter().map(|p| p.command.clone()).collect(),
                undo: executed.iter().rev().map(|p| p.undo.clone()).collect(),
            };
            self.log.record_change_event(
                id,
                ChangeEvent::new(id, self.editor.target().clone(), kind),
            )?;
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(CommitOutcome::Applied),
        }
    }

    /// Drop diff, staged output and event id.
    pub fn reset(&mut self) {
        self.editor.discard_staged();
        self.event_id = None;
        self.state = SessionState::Initialized;
    }

    /// Replace the desired state. Staged output is dropped; the event id is
    /// kept so one final commit can follow several passes.
    pub fn update_data(&mut self, spec: DesiredStateSpec) {
        self.editor.update_data(spec);
        if self.state != SessionState::Failed {
            self.state = SessionState::Initialized;
        }
    }

    /// Unified diff of staged text, when there is one.
    pub fn preview(&self) -> Option<String> {
        self.editor.preview()
    }
}

fn remove_staging(staging: &NormalizedPath) {
    if let Err(e) = io::remove_if_exists(staging) {
        tracing::warn!(staging = %staging, error = %e, "Could not remove staging file");
    }
}
