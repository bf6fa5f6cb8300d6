//! Reconciliation layer for confix
//!
//! Drives grammar adapters from `confix-content` against real targets:
//!
//! - **Editor**: report and fix one target against a desired state
//! - **Session**: the report → fix → commit state machine with atomic commits
//! - **Change log**: persisted, undoable record of every committed change
//!
//! # Architecture
//!
//! ```text
//!                  rule / caller
//!                        |
//!                   confix-core
//!                  /            \
//!       confix-content        confix-fs
//! ```
//!
//! # Example
//!
//! ```ignore
//! use confix_content::{DesiredStateSpec, GrammarKind, Intent};
//! use confix_core::{ChangeLog, EngineSettings, KvEditor, LogContext, RuleRun, Session};
//!
//! let settings = EngineSettings::default();
//! let mut log = ChangeLog::open(settings.log_dir.clone(), LogContext::disabled())?;
//! let mut run = RuleRun::begin(&mut log, 57)?;
//!
//! let ctx = LogContext::for_rule(57, "/etc/ssh/sshd_config");
//! let spec = DesiredStateSpec::new().with("ClientAliveInterval", 900);
//! let editor = KvEditor::for_file(GrammarKind::Space, "/etc/ssh/sshd_config", spec, Intent::Present, ctx.clone())?;
//!
//! let mut session = Session::new(editor, &mut log, &settings, ctx);
//! session.set_event_id(run.next_id()?);
//! if !session.report()?.is_compliant() && session.fix()? {
//!     session.commit();
//! }
//! ```

pub mod changelog;
pub mod editor;
pub mod error;
pub mod logging;
pub mod session;
pub mod settings;

pub use changelog::{ChangeEvent, ChangeKind, ChangeLog, EventId, RuleRun, SnapshotRef};
pub use editor::{Compliance, KvEditor, Staged};
pub use error::{Error, ErrorCode, Result};
pub use logging::LogContext;
pub use session::{CommitOutcome, Session, SessionState};
pub use settings::EngineSettings;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_error_names_state() {
        let error = Error::InvalidTransition {
            operation: "commit",
            state: SessionState::Reported,
        };

        let display = error.to_string();
        assert!(
            display.contains("commit") && display.contains("reported"),
            "Error display should name operation and state, got: {}",
            display
        );
        assert_eq!(error.code(), ErrorCode::InvalidTransition);
    }
}
