//! Release tree comparison.
//!
//! [`TreeComparator`] walks an old and a new tree in lock-step and reports
//! changed and removed files. [`ChangeSet`] holds that result as sorted,
//! root-relative path lists ready for the output writers.

mod change_set;
mod comparator;

pub use change_set::{ChangeSet, ChangeSetError};
pub use comparator::{CompareError, TreeComparator};
