//! Key management for the authority

pub mod registry;

pub use registry::{KeyRegistry, RegistryError, ServiceKeyId};
