//! Block registry and name resolution
//!
//! Fetches block metadata and the component registry from the block
//! server, and resolves global or author-scoped names to block identifiers.

pub mod block_ref;
pub mod client;
pub mod error;
pub mod manifest;
pub mod resolver;

pub use block_ref::BlockRef;
pub use client::{BlockApi, HttpBlockApi};
pub use error::RegistryError;
pub use manifest::{BlockMetadata, BuildStatus, RegistryDocument, RegistryEntry};
pub use resolver::{RegistryResolver, RegistrySnapshot, DEFAULT_REGISTRY_TTL};
