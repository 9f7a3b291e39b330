//! Vela Core - geometry input and configuration.
//!
//! This crate provides:
//!
//! - **Primitive store**: `Primitive`, `PrimitiveStore`, `Mesh`
//! - **Configuration**: `Settings` and the build/trace projections of it
//!
//! # Example
//!
//! ```ignore
//! use vela_core::{PrimitiveStore, Settings};
//!
//! let settings = Settings::load("vela.json")?;
//! let store = PrimitiveStore::from_meshes(&meshes);
//! println!("{} triangles, hash {:016x}", store.len(), store.content_hash());
//! ```

pub mod config;
pub mod mesh;
pub mod primitive;
pub mod store;

// Re-export commonly used types
pub use config::{
    BuildSettings, BuilderKind, ConfigError, ConfigResult, Settings, TraceSettings, WideFanout,
};
pub use mesh::Mesh;
pub use primitive::{Primitive, TriangleHit};
pub use store::PrimitiveStore;
