pub mod client;
pub mod codec;
pub mod config;
pub mod count;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod gate;
pub mod migrate;
pub mod mutator;
pub mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use dialect::Dialect;
pub use error::{ErrorKind, MigrationError, MigrationResult};
