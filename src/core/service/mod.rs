//! Cross-cutting services.

mod persistence;

pub use persistence::{PersistenceConfig, PersistenceLoop};
