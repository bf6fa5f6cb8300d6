//! Grammar adapters for the confix reconciliation engine
//!
//! Parses configuration targets into a [`LiveDocument`], compares them with a
//! [`DesiredStateSpec`] to produce a [`Diff`], and renders corrected content
//! (or store commands) from that diff. Untouched lines survive byte-exact.
//!
//! Each [`GrammarKind`] has one [`GrammarAdapter`] implementation:
//!
//! | Kind | Handler |
//! |------|---------|
//! | `OpenEq`, `ClosedEq`, `Space` | [`SeparatedHandler`] |
//! | `TaggedBlock` | [`TaggedBlockHandler`] |
//! | `HostPrefStore` | [`PreferenceHandler`] |
//! | `HostProfileList` | [`ProfileHandler`] |

pub mod compare;
pub mod diff;
pub mod document;
pub mod error;
pub mod grammar;
pub mod handlers;
pub mod spec;
pub mod store;

pub use compare::Comparison;
pub use diff::{Addition, Diff, Removal};
pub use document::{Entry, EntryKey, Line, LineKind, LiveDocument, fingerprint};
pub use error::{Error, Result};
pub use grammar::{GrammarAdapter, GrammarKind, PlannedCommand, Rendered, text_adapter};
pub use handlers::{PreferenceHandler, ProfileHandler, SeparatedHandler, TaggedBlockHandler};
pub use spec::{DesiredEntry, DesiredStateSpec, Intent};
pub use store::{
    CommandInvoker, InstalledProfile, MemoryPreferenceStore, MemoryProfileStore, PreferenceStore,
    ProfileStore, StoreCommand,
};
