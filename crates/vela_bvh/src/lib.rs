//! Vela BVH - acceleration structure construction.
//!
//! Builds a binary BVH over a [`vela_core::PrimitiveStore`] with either the
//! binned SAH builder or its spatial-split (SBVH) extension, then collapses
//! it into a 4- or 8-wide tree for traversal.
//!
//! # Example
//!
//! ```ignore
//! use vela_bvh::{build_wide, BvhCache};
//!
//! let settings = Settings::load("vela.json")?.build();
//! let cache = BvhCache::new("cache");
//! let wide = build_wide(&store, &settings, Some(&cache));
//! let hit = wide.intersect(&ray, Interval::from_min(1e-3), store.as_slice());
//! ```

mod binning;
pub mod builder;
pub mod cache;
pub mod collapse;
pub mod node;
pub mod sah;
pub mod sbvh;
pub mod serialize;
pub mod traverse;

#[cfg(test)]
mod testing;

pub use builder::{build, build_wide};
pub use cache::{BvhCache, CacheError};
pub use collapse::{collapse, WideBvh, WideChild, WideNode, MAX_FANOUT};
pub use node::{BuildStats, Bvh2, Bvh2Node};
pub use serialize::{NodeRecord, SerializeError};
pub use traverse::Hit;
