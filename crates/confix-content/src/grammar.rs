//! Grammar kinds and the adapter trait

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diff::Diff;
use crate::document::LiveDocument;
use crate::error::{Error, Result};
use crate::handlers::{SeparatedHandler, TaggedBlockHandler};
use crate::spec::{DesiredStateSpec, Intent};
use crate::store::StoreCommand;

/// Supported configuration dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrammarKind {
    /// `key = value`
    OpenEq,
    /// `key=value`
    ClosedEq,
    /// `key value`
    Space,
    /// `[tag]` blocks with scoped `key = value` entries
    TaggedBlock,
    /// Host preference key/value store
    HostPrefStore,
    /// Installed host profiles with nested option trees
    HostProfileList,
}

impl GrammarKind {
    pub const ALL: [GrammarKind; 6] = [
        Self::OpenEq,
        Self::ClosedEq,
        Self::Space,
        Self::TaggedBlock,
        Self::HostPrefStore,
        Self::HostProfileList,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenEq => "open-eq",
            Self::ClosedEq => "closed-eq",
            Self::Space => "space",
            Self::TaggedBlock => "tagged-block",
            Self::HostPrefStore => "host-pref-store",
            Self::HostProfileList => "host-profile-list",
        }
    }

    /// Whether the target is a file on disk (as opposed to a host store).
    pub fn is_file_backed(&self) -> bool {
        !matches!(self, Self::HostPrefStore | Self::HostProfileList)
    }
}

impl fmt::Display for GrammarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A store command paired with the command that reverses it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedCommand {
    pub command: StoreCommand,
    pub undo: StoreCommand,
}

/// Output of rendering a diff
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// Full replacement content for a file-backed target
    Text(String),
    /// Commands to run against a host store, in order
    Commands(Vec<PlannedCommand>),
}

impl Rendered {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Commands(_) => None,
        }
    }

    pub fn commands(&self) -> &[PlannedCommand] {
        match self {
            Self::Commands(commands) => commands,
            Self::Text(_) => &[],
        }
    }
}

/// Parse, compare and render one grammar.
///
/// Implementations must keep every line they do not correct byte-exact, and
/// must refuse to render a [`Diff`] that was not derived from the document
/// passed in.
pub trait GrammarAdapter {
    fn kind(&self) -> GrammarKind;

    /// Parse raw target content. Store grammars ignore `raw` and query
    /// their store instead.
    fn parse(&self, raw: &[u8]) -> Result<LiveDocument>;

    /// Compare a document with desired state.
    fn matches(&self, doc: &LiveDocument, spec: &DesiredStateSpec, intent: Intent) -> Diff;

    /// Produce corrected output for a diff derived from `doc`.
    fn render(&self, doc: &LiveDocument, diff: &Diff) -> Result<Rendered>;

    /// Run one store command. File grammars have nothing to execute.
    fn execute(&self, command: &StoreCommand) -> Result<()> {
        let _ = command;
        Err(Error::CommandsUnsupported {
            grammar: self.kind().name().to_string(),
        })
    }
}

/// Construct the adapter for a file-backed grammar.
///
/// Store grammars need an injected store; build [`crate::PreferenceHandler`]
/// or [`crate::ProfileHandler`] directly.
pub fn text_adapter(kind: GrammarKind) -> Result<Box<dyn GrammarAdapter>> {
    match kind {
        GrammarKind::OpenEq | GrammarKind::ClosedEq | GrammarKind::Space => {
            Ok(Box::new(SeparatedHandler::new(kind)?))
        }
        GrammarKind::TaggedBlock => Ok(Box::new(TaggedBlockHandler::new())),
        GrammarKind::HostPrefStore | GrammarKind::HostProfileList => Err(Error::StoreRequired {
            grammar: kind.name().to_string(),
        }),
    }
}
