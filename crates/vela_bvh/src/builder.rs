//! Entry points that pick a builder from settings and log what was built.

use std::time::Instant;

use vela_core::{BuildSettings, BuilderKind, PrimitiveStore};

use crate::cache::BvhCache;
use crate::collapse::{collapse, WideBvh};
use crate::node::Bvh2;
use crate::{sah, sbvh};

/// Build a BVH2 with the builder `settings.builder` names.
pub fn build(store: &PrimitiveStore, settings: &BuildSettings) -> Bvh2 {
    let bvh = match settings.builder {
        BuilderKind::Sah => sah::build(store, settings),
        BuilderKind::Sbvh => sbvh::build(store, settings),
    };

    let stats = bvh.stats();
    log::info!(
        "Built {:?} BVH: {} primitives, {} nodes, {} leaves, depth {}, {} references, SAH cost {:.2} in {:.2?}",
        bvh.builder(),
        store.len(),
        bvh.nodes().len(),
        stats.leaves,
        stats.max_depth,
        bvh.indices().len(),
        bvh.sah_cost(settings),
        stats.build_time
    );

    if stats.forced_leaves > 0 {
        log::warn!(
            "{} leaves were forced by the depth limit of {}",
            stats.forced_leaves,
            settings.max_depth
        );
    }

    bvh
}

/// Build (or load from `cache`) a BVH2 and collapse it to `settings.fanout`.
pub fn build_wide(
    store: &PrimitiveStore,
    settings: &BuildSettings,
    cache: Option<&BvhCache>,
) -> WideBvh {
    let bvh = match cache {
        Some(cache) => cache.get_or_build(store, settings, || build(store, settings)),
        None => build(store, settings),
    };

    let start = Instant::now();
    let wide = collapse(&bvh, settings.fanout);
    log::info!(
        "Collapsed to {}-wide BVH: {} nodes in {:.2?}",
        settings.fanout.slots(),
        wide.nodes().len(),
        start.elapsed()
    );

    wide
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::random_store;
    use vela_core::WideFanout;

    #[test]
    fn test_dispatch() {
        let store = random_store(1, 100);

        for builder in [BuilderKind::Sah, BuilderKind::Sbvh] {
            let settings = BuildSettings {
                builder,
                ..Default::default()
            };
            assert_eq!(build(&store, &settings).builder(), builder);
        }
    }

    #[test]
    fn test_build_wide_with_cache() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let cache = BvhCache::new(dir.path());
        let store = random_store(2, 300);
        let settings = BuildSettings {
            fanout: WideFanout::Four,
            ..Default::default()
        };

        let first = build_wide(&store, &settings, Some(&cache));
        let second = build_wide(&store, &settings, Some(&cache));
        let uncached = build_wide(&store, &settings, None);

        assert_eq!(first, second);
        assert_eq!(first, uncached);
        assert_eq!(first.fanout(), WideFanout::Four);
        assert_eq!(first.primitive_count(), store.len());
    }

    #[test]
    fn test_empty_store() {
        let wide = build_wide(&PrimitiveStore::empty(), &BuildSettings::default(), None);
        assert_eq!(wide.nodes().len(), 1);
        assert!(wide.bounds().is_empty());
    }
}
