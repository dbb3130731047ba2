//! Domain layer: models, errors and ports of the background execution core.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ContextError, DomainError, DomainResult};
