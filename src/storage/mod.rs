pub mod backends;
pub mod template;

pub use template::{Container, StorageBackend};
