pub mod catalog;
pub mod dependencies;
pub mod directory;
pub mod errors;
pub mod ledger;
pub mod lending;
pub mod locks;

pub use dependencies::{LendingPolicy, ServiceDependencies};
pub use errors::{FieldErrors, LibraryError, Result};
pub use locks::{KeyLocks, LockKey};
