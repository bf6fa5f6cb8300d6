//! Grammar handler implementations

mod lines;
pub mod preference;
pub mod profile;
pub mod separated;
pub mod tagged;

pub use preference::PreferenceHandler;
pub use profile::ProfileHandler;
pub use separated::SeparatedHandler;
pub use tagged::TaggedBlockHandler;
