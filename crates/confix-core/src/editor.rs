//! Key/value editor: loads a target through its grammar, diffs it against
//! desired state and stages corrected output.

use confix_content::{
    Diff, DesiredStateSpec, GrammarAdapter, GrammarKind, Intent, LiveDocument, PlannedCommand,
    Rendered, text_adapter,
};
use confix_fs::{FileAttributes, NormalizedPath, io};

use crate::Result;
use crate::logging::LogContext;
use crate::settings::DEFAULT_STAGING_SUFFIX;

/// Outcome of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compliance {
    Compliant,
    NonCompliant,
    /// The target cannot be parsed; never coerced into a fix decision
    Malformed,
}

impl Compliance {
    pub fn is_compliant(&self) -> bool {
        matches!(self, Self::Compliant)
    }
}

/// Output prepared by [`KvEditor::fix`], not yet applied
#[derive(Debug, Clone, PartialEq)]
pub enum Staged {
    /// Already compliant
    Nothing { fingerprint: String },
    Text {
        content: String,
        staging: NormalizedPath,
        /// Target bytes the content was derived from; `None` if the target
        /// did not exist
        prior: Option<Vec<u8>>,
        fingerprint: String,
    },
    Commands {
        commands: Vec<PlannedCommand>,
        fingerprint: String,
    },
}

impl Staged {
    /// Fingerprint of the document the staged output was derived from.
    pub fn fingerprint(&self) -> &str {
        match self {
            Self::Nothing { fingerprint }
            | Self::Text { fingerprint, .. }
            | Self::Commands { fingerprint, .. } => fingerprint,
        }
    }
}

/// What the editor saw on its last read
#[derive(Debug, Clone)]
struct Observation {
    doc: LiveDocument,
    diff: Diff,
    prior: Option<Vec<u8>>,
}

/// Reconciles one target against a [`DesiredStateSpec`]
pub struct KvEditor {
    adapter: Box<dyn GrammarAdapter>,
    target: NormalizedPath,
    staging: NormalizedPath,
    spec: DesiredStateSpec,
    intent: Intent,
    ctx: LogContext,
    observed: Option<Observation>,
    staged: Option<Staged>,
}

impl std::fmt::Debug for KvEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvEditor")
            .field("grammar", &self.adapter.kind())
            .field("target", &self.target)
            .field("staging", &self.staging)
            .field("intent", &self.intent)
            .field("entries", &self.spec.len())
            .finish_non_exhaustive()
    }
}

impl KvEditor {
    pub fn new(
        adapter: Box<dyn GrammarAdapter>,
        target: impl Into<NormalizedPath>,
        spec: DesiredStateSpec,
        intent: Intent,
        ctx: LogContext,
    ) -> Self {
        let target = target.into();
        Self {
            adapter,
            staging: target.with_suffix(DEFAULT_STAGING_SUFFIX),
            target,
            spec,
            intent,
            ctx,
            observed: None,
            staged: None,
        }
    }

    /// Editor for a file-backed grammar.
    pub fn for_file(
        kind: GrammarKind,
        target: impl Into<NormalizedPath>,
        spec: DesiredStateSpec,
        intent: Intent,
        ctx: LogContext,
    ) -> Result<Self> {
        Ok(Self::new(text_adapter(kind)?, target, spec, intent, ctx))
    }

    /// Builder: use a specific staging path.
    pub fn with_staging(mut self, staging: impl Into<NormalizedPath>) -> Self {
        self.staging = staging.into();
        self
    }

    pub fn grammar(&self) -> GrammarKind {
        self.adapter.kind()
    }

    pub fn adapter(&self) -> &dyn GrammarAdapter {
        self.adapter.as_ref()
    }

    pub fn target(&self) -> &NormalizedPath {
        &self.target
    }

    pub fn staging(&self) -> &NormalizedPath {
        &self.staging
    }

    pub fn spec(&self) -> &DesiredStateSpec {
        &self.spec
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn ctx(&self) -> &LogContext {
        &self.ctx
    }

    /// Diff from the last report or fix.
    pub fn diff(&self) -> Option<&Diff> {
        self.observed.as_ref().map(|o| &o.diff)
    }

    /// Document from the last report or fix.
    pub fn document(&self) -> Option<&LiveDocument> {
        self.observed.as_ref().map(|o| &o.doc)
    }

    pub fn staged(&self) -> Option<&Staged> {
        self.staged.as_ref()
    }

    pub(crate) fn take_staged(&mut self) -> Option<Staged> {
        self.staged.take()
    }

    /// Read the current target content. Missing files read as `None`.
    pub(crate) fn read_target(&self) -> Result<Option<Vec<u8>>> {
        if !self.grammar().is_file_backed() {
            return Ok(None);
        }
        Ok(io::read_bytes(&self.target)?)
    }

    /// Parse the target as it is right now.
    pub(crate) fn parse_current(&self) -> Result<(LiveDocument, Option<Vec<u8>>)> {
        let prior = self.read_target()?;
        let doc = self.adapter.parse(prior.as_deref().unwrap_or_default())?;
        Ok((doc, prior))
    }

    fn observe(&mut self) -> Result<&Observation> {
        let (doc, prior) = self.parse_current()?;
        let diff = self.adapter.matches(&doc, &self.spec, self.intent);
        Ok(self.observed.insert(Observation { doc, diff, prior }))
    }

    /// Compare the target with desired state. Touches neither the target
    /// nor the staging file.
    pub fn report(&mut self) -> Result<Compliance> {
        let ctx = self.ctx.clone();
        let _guard = ctx.enter();

        let compliance = match self.observe().map(|o| o.diff.is_compliant()) {
            Ok(true) => Compliance::Compliant,
            Ok(false) => Compliance::NonCompliant,
            Err(crate::Error::Content(e)) if e.is_malformed() => {
                tracing::warn!(target = %self.target, error = %e, "Target is malformed");
                self.observed = None;
                Compliance::Malformed
            }
            Err(e) => return Err(e),
        };
        tracing::debug!(target = %self.target, ?compliance, "Reported");
        Ok(compliance)
    }

    /// Stage corrected output without touching the target.
    ///
    /// Returns `Ok(false)` when the grammar cannot express the changes
    /// safely; no staging file is left behind in that case. Returns
    /// `Ok(true)` with [`Staged::Nothing`] when already compliant. A
    /// malformed target is an error, never guessed at.
    pub fn fix(&mut self) -> Result<bool> {
        let ctx = self.ctx.clone();
        let _guard = ctx.enter();

        self.discard_staged();
        let observation = self.observe()?.clone();
        let fingerprint = observation.doc.fingerprint().to_string();

        if observation.diff.is_compliant() {
            self.staged = Some(Staged::Nothing { fingerprint });
            return Ok(true);
        }
        if !observation.diff.fixable {
            tracing::warn!(
                target = %self.target,
                conflicts = ?observation.diff.conflicts,
                "Cannot express changes safely"
            );
            return Ok(false);
        }

        let rendered = match self.adapter.render(&observation.doc, &observation.diff) {
            Ok(rendered) => rendered,
            Err(e) if e.is_render_conflict() => {
                tracing::warn!(target = %self.target, error = %e, "Render conflict");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let staged = match rendered {
            Rendered::Text(content) => {
                // Staged bytes are as sensitive as the target they replace
                match FileAttributes::capture(&self.target)? {
                    Some(attributes) => {
                        io::write_atomic_with_mode(&self.staging, content.as_bytes(), attributes.mode)?
                    }
                    None => io::write_atomic(&self.staging, content.as_bytes())?,
                }
                tracing::debug!(
                    staging = %self.staging,
                    additions = observation.diff.to_add.len(),
                    removals = observation.diff.to_remove.len(),
                    "Staged corrected content"
                );
                Staged::Text {
                    content,
                    staging: self.staging.clone(),
                    prior: observation.prior,
                    fingerprint,
                }
            }
            Rendered::Commands(commands) => {
                tracing::debug!(commands = commands.len(), "Staged store commands");
                Staged::Commands {
                    commands,
                    fingerprint,
                }
            }
        };
        self.staged = Some(staged);
        Ok(true)
    }

    /// Unified diff of the staged text against the target, for audit output.
    pub fn preview(&self) -> Option<String> {
        match &self.staged {
            Some(Staged::Text { content, prior, .. }) => {
                let original = String::from_utf8_lossy(prior.as_deref().unwrap_or_default());
                Some(Diff::preview(&original, content, self.target.as_str()))
            }
            _ => None,
        }
    }

    /// Replace the desired state; staged output from the old state is
    /// dropped.
    pub fn update_data(&mut self, spec: DesiredStateSpec) {
        self.spec = spec;
        self.observed = None;
        self.discard_staged();
    }

    /// Replace the intent; staged output is dropped.
    pub fn set_intent(&mut self, intent: Intent) {
        self.intent = intent;
        self.observed = None;
        self.discard_staged();
    }

    /// Drop staged output and remove the staging file.
    pub fn discard_staged(&mut self) {
        if let Some(Staged::Text { staging, .. }) = self.staged.take()
            && let Err(e) = io::remove_if_exists(&staging)
        {
            tracing::warn!(staging = %staging, error = %e, "Could not remove staging file");
        }
    }

    pub(crate) fn set_staging(&mut self, staging: NormalizedPath) {
        self.staging = staging;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn editor(temp: &TempDir, content: Option<&str>, spec: DesiredStateSpec) -> KvEditor {
        let target = temp.path().join("sshd_config");
        if let Some(content) = content {
            std::fs::write(&target, content).unwrap();
        }
        KvEditor::for_file(
            GrammarKind::Space,
            target,
            spec,
            Intent::Present,
            LogContext::disabled(),
        )
        .unwrap()
    }

    #[test]
    fn report_has_no_side_effects() {
        let temp = TempDir::new().unwrap();
        let mut editor = editor(&temp, Some("Port 22\n"), DesiredStateSpec::new().with("Port", 2222));

        assert_eq!(editor.report().unwrap(), Compliance::NonCompliant);
        assert!(!editor.staging().exists());
        assert_eq!(
            std::fs::read_to_string(temp.path().join("sshd_config")).unwrap(),
            "Port 22\n"
        );
    }

    #[test]
    fn fix_writes_staging_not_target() {
        let temp = TempDir::new().unwrap();
        let mut editor = editor(&temp, Some("Port 22\n"), DesiredStateSpec::new().with("Port", 2222));

        assert!(editor.fix().unwrap());
        assert_eq!(
            std::fs::read_to_string(editor.staging().to_native()).unwrap(),
            "Port 2222\n"
        );
        assert_eq!(
            std::fs::read_to_string(temp.path().join("sshd_config")).unwrap(),
            "Port 22\n"
        );
        assert!(editor.preview().unwrap().contains("+Port 2222"));
    }

    #[test]
    fn fix_when_compliant_stages_nothing() {
        let temp = TempDir::new().unwrap();
        let mut editor = editor(&temp, Some("Port 22\n"), DesiredStateSpec::new().with("Port", 22));

        assert!(editor.fix().unwrap());
        assert!(matches!(editor.staged(), Some(Staged::Nothing { .. })));
        assert!(!editor.staging().exists());
    }

    #[test]
    fn missing_target_reads_as_empty() {
        let temp = TempDir::new().unwrap();
        let mut editor = editor(&temp, None, DesiredStateSpec::new().with("Port", 22));
        assert_eq!(editor.report().unwrap(), Compliance::NonCompliant);
    }

    #[test]
    fn malformed_target_is_reported_not_fixed() {
        let temp = TempDir::new().unwrap();
        let mut editor = editor(&temp, Some("Port\0 22\n"), DesiredStateSpec::new().with("Port", 22));

        assert_eq!(editor.report().unwrap(), Compliance::Malformed);
        let err = editor.fix().unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::MalformedDocument);
        assert!(!editor.staging().exists());
    }

    #[test]
    fn update_data_drops_staged_output() {
        let temp = TempDir::new().unwrap();
        let mut editor = editor(&temp, Some("Port 22\n"), DesiredStateSpec::new().with("Port", 2222));
        editor.fix().unwrap();
        assert!(editor.staging().exists());

        editor.update_data(DesiredStateSpec::new().with("Port", 22));
        assert!(editor.staged().is_none());
        assert!(!editor.staging().exists());
        assert_eq!(editor.report().unwrap(), Compliance::Compliant);
    }

    #[test]
    fn unfixable_diff_leaves_no_staging_file() {
        let temp = TempDir::new().unwrap();
        let mut editor = editor(
            &temp,
            Some("Port 22\n"),
            DesiredStateSpec::new().with("Port", 2222).with("Port", 2223),
        );

        assert!(!editor.fix().unwrap());
        assert!(editor.staged().is_none());
        assert!(!editor.staging().exists());
    }
}
