//! Release archive retrieval and expansion.

mod extract;
mod release_source;

pub use extract::{ExtractError, expand_archive};
pub use release_source::{ReleaseSource, SourceError};
