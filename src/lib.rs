// This is a metapackage for tests
// Re-export crates as modules

pub use balance_service;
pub use common;
