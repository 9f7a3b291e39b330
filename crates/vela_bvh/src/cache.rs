//! On-disk cache of built BVH2 trees.
//!
//! Trees are keyed by geometry content and build settings. Any problem
//! reading an entry means a rebuild; a cached tree is only used when its
//! header key and primitive count match what the caller is about to build.

use std::fs;
use std::hash::Hasher;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fxhash::FxHasher64;
use thiserror::Error;
use vela_core::{BuildSettings, PrimitiveStore};

use crate::node::Bvh2;
use crate::serialize::{self, SerializeError, FORMAT_VERSION};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("bad cache entry: {0}")]
    Format(#[from] SerializeError),

    #[error("cache entry key {found:016x} does not match {expected:016x}")]
    KeyMismatch { expected: u64, found: u64 },

    #[error("cache entry covers {found} primitives, store has {expected}")]
    PrimitiveCountMismatch { expected: usize, found: usize },
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CacheError {
    let path = path.to_path_buf();
    move |source| CacheError::Io { path, source }
}

/// Directory of `<key>.vbvh` files.
#[derive(Debug, Clone)]
pub struct BvhCache {
    dir: PathBuf,
}

impl BvhCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache key for building `store` with `settings`.
    pub fn key(store: &PrimitiveStore, settings: &BuildSettings) -> u64 {
        let mut hasher = FxHasher64::default();
        hasher.write_u64(store.content_hash());
        hasher.write_u64(settings.fingerprint());
        hasher.write_u32(FORMAT_VERSION);
        hasher.finish()
    }

    pub fn path_for(&self, key: u64) -> PathBuf {
        self.dir.join(format!("{key:016x}.vbvh"))
    }

    fn read(&self, key: u64) -> CacheResult<Bvh2> {
        let path = self.path_for(key);
        let bytes = fs::read(&path).map_err(io_error(&path))?;
        let (found, bvh) = serialize::from_bytes(&bytes)?;

        if found != key {
            return Err(CacheError::KeyMismatch {
                expected: key,
                found,
            });
        }

        Ok(bvh)
    }

    /// Load the tree stored under `key`. Missing or unusable entries give
    /// `None`; the reason is only logged.
    pub fn load(&self, key: u64) -> Option<Bvh2> {
        match self.read(key) {
            Ok(bvh) => Some(bvh),
            Err(err) => {
                log::debug!("BVH cache miss for {key:016x}: {err}");
                None
            }
        }
    }

    /// Write `bvh` under `key`. The file appears atomically.
    pub fn store(&self, key: u64, bvh: &Bvh2) -> CacheResult<PathBuf> {
        let path = self.path_for(key);

        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let tmp = path.with_extension("vbvh.tmp");
        let mut file = fs::File::create(&tmp).map_err(io_error(&tmp))?;
        file.write_all(&serialize::to_bytes(bvh, key))
            .map_err(io_error(&tmp))?;
        file.sync_all().map_err(io_error(&tmp))?;
        drop(file);

        fs::rename(&tmp, &path).map_err(io_error(&path))?;
        Ok(path)
    }

    /// Load a cached tree for `store`, or build one with `build` and cache it.
    ///
    /// Failing to write the cache is logged and otherwise ignored.
    pub fn get_or_build(
        &self,
        store: &PrimitiveStore,
        settings: &BuildSettings,
        build: impl FnOnce() -> Bvh2,
    ) -> Bvh2 {
        let key = Self::key(store, settings);

        if let Some(bvh) = self.load(key) {
            if bvh.primitive_count() == store.len() {
                log::debug!("BVH cache hit for {key:016x}");
                return bvh;
            }
            log::debug!(
                "BVH cache entry {key:016x}: {}",
                CacheError::PrimitiveCountMismatch {
                    expected: store.len(),
                    found: bvh.primitive_count(),
                }
            );
        }

        let bvh = build();
        if let Err(err) = self.store(key, &bvh) {
            log::warn!("Could not write BVH cache: {err}");
        }
        bvh
    }
}
