//! Render and build configuration.
//!
//! Settings are read from a flat JSON object. Every key is optional and
//! falls back to the defaults below; unknown keys are rejected so typos do
//! not silently keep a default.
//!
//! ```json
//! {
//!     "builder": "SBVH",
//!     "wide_fanout": 4,
//!     "spatial_split_overlap_threshold": 1e-5,
//!     "max_bounce_depth": 6
//! }
//! ```

use std::hash::Hasher;
use std::path::{Path, PathBuf};

use fxhash::FxHasher64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fewest bins per axis a binned split search can use.
pub const MIN_BINS: usize = 2;

/// Errors that can occur while loading settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which tree construction algorithm to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BuilderKind {
    /// Binned surface area heuristic, object splits only.
    #[default]
    #[serde(rename = "SAH")]
    Sah,
    /// SAH plus spatial splits with reference duplication.
    #[serde(rename = "SBVH")]
    Sbvh,
}

impl BuilderKind {
    pub fn as_u32(self) -> u32 {
        match self {
            BuilderKind::Sah => 0,
            BuilderKind::Sbvh => 1,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(BuilderKind::Sah),
            1 => Some(BuilderKind::Sbvh),
            _ => None,
        }
    }
}

/// Child slots per wide node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum WideFanout {
    Four,
    #[default]
    Eight,
}

impl WideFanout {
    pub fn slots(self) -> usize {
        match self {
            WideFanout::Four => 4,
            WideFanout::Eight => 8,
        }
    }
}

impl TryFrom<u32> for WideFanout {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(WideFanout::Four),
            8 => Ok(WideFanout::Eight),
            other => Err(format!("wide_fanout must be 4 or 8, got {other}")),
        }
    }
}

impl From<WideFanout> for u32 {
    fn from(value: WideFanout) -> Self {
        value.slots() as u32
    }
}

/// Every recognized option, as it appears in the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub builder: BuilderKind,
    pub wide_fanout: WideFanout,
    /// Cost of intersecting one primitive (SAH `C_isect`)
    pub leaf_cost_constant: f32,
    /// Cost of visiting one node (SAH `C_trav`)
    pub traversal_cost_constant: f32,
    /// Relative overlap (intersection area / root area) above which SBVH
    /// tries spatial splits. `None` tries them at every node.
    pub spatial_split_overlap_threshold: Option<f32>,
    /// Maximum references as a multiple of the primitive count.
    pub reference_duplication_budget: f32,
    /// Queue slots per pixel.
    pub queue_capacity_multiplier: f32,
    pub max_bounce_depth: u32,
    pub russian_roulette_start_depth: u32,
    pub sah_bins: u32,
    pub spatial_bins: u32,
    pub min_leaf_size: u32,
    /// Recursion depth after which the builder force-leafs the remainder.
    pub max_depth: u32,
    /// Ranges at least this large build their children in parallel.
    pub parallel_build_threshold: u32,
    /// Directory for the build cache; caching is off when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            builder: BuilderKind::Sah,
            wide_fanout: WideFanout::Eight,
            leaf_cost_constant: 1.0,
            traversal_cost_constant: 1.0,
            spatial_split_overlap_threshold: None,
            reference_duplication_budget: 2.0,
            queue_capacity_multiplier: 1.0,
            max_bounce_depth: 8,
            russian_roulette_start_depth: 3,
            sah_bins: 16,
            spatial_bins: 32,
            min_leaf_size: 1,
            max_depth: 64,
            parallel_build_threshold: 4096,
            cache_dir: None,
        }
    }
}

impl Settings {
    /// Read and validate settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let settings = Self::from_json_str(&text)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parse and validate settings from a JSON string.
    pub fn from_json_str(text: &str) -> ConfigResult<Self> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if !(self.leaf_cost_constant.is_finite() && self.leaf_cost_constant > 0.0) {
            return Err(invalid("leaf_cost_constant", "must be a positive number"));
        }
        if !(self.traversal_cost_constant.is_finite() && self.traversal_cost_constant >= 0.0) {
            return Err(invalid("traversal_cost_constant", "must be zero or positive"));
        }
        if let Some(threshold) = self.spatial_split_overlap_threshold {
            if !(threshold.is_finite() && threshold >= 0.0) {
                return Err(invalid("spatial_split_overlap_threshold", "must be zero or positive"));
            }
        }
        if !(self.reference_duplication_budget.is_finite() && self.reference_duplication_budget >= 1.0)
        {
            return Err(invalid("reference_duplication_budget", "must be at least 1.0"));
        }
        if !(self.queue_capacity_multiplier.is_finite() && self.queue_capacity_multiplier > 0.0) {
            return Err(invalid("queue_capacity_multiplier", "must be a positive number"));
        }
        if self.max_bounce_depth == 0 {
            return Err(invalid("max_bounce_depth", "must be at least 1"));
        }
        if (self.sah_bins as usize) < MIN_BINS {
            return Err(invalid("sah_bins", format!("must be at least {MIN_BINS}")));
        }
        if (self.spatial_bins as usize) < MIN_BINS {
            return Err(invalid("spatial_bins", format!("must be at least {MIN_BINS}")));
        }
        if self.min_leaf_size == 0 {
            return Err(invalid("min_leaf_size", "must be at least 1"));
        }
        if self.max_depth == 0 {
            return Err(invalid("max_depth", "must be at least 1"));
        }

        if !self.trace().russian_roulette_reachable() {
            log::warn!(
                "russian_roulette_start_depth {} is not below max_bounce_depth {}; \
                 paths will never be terminated by russian roulette",
                self.russian_roulette_start_depth,
                self.max_bounce_depth
            );
        }

        Ok(())
    }

    pub fn build(&self) -> BuildSettings {
        BuildSettings {
            builder: self.builder,
            fanout: self.wide_fanout,
            leaf_cost: self.leaf_cost_constant,
            traversal_cost: self.traversal_cost_constant,
            overlap_threshold: self.spatial_split_overlap_threshold,
            duplication_budget: self.reference_duplication_budget,
            sah_bins: self.sah_bins as usize,
            spatial_bins: self.spatial_bins as usize,
            min_leaf_size: self.min_leaf_size as usize,
            max_depth: self.max_depth as usize,
            parallel_threshold: self.parallel_build_threshold as usize,
        }
    }

    pub fn trace(&self) -> TraceSettings {
        TraceSettings {
            max_bounce_depth: self.max_bounce_depth,
            russian_roulette_start_depth: self.russian_roulette_start_depth,
            queue_capacity_multiplier: self.queue_capacity_multiplier,
        }
    }
}

/// The subset of settings the tree builders and the collapser read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildSettings {
    pub builder: BuilderKind,
    pub fanout: WideFanout,
    pub leaf_cost: f32,
    pub traversal_cost: f32,
    pub overlap_threshold: Option<f32>,
    pub duplication_budget: f32,
    pub sah_bins: usize,
    pub spatial_bins: usize,
    pub min_leaf_size: usize,
    pub max_depth: usize,
    pub parallel_threshold: usize,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Settings::default().build()
    }
}

impl BuildSettings {
    /// Copy with the bin counts, leaf size and depth limit raised to the
    /// smallest values the builders can work with. These fields are public,
    /// so settings that never went through [`Settings::validate`] reach the
    /// builders too.
    pub fn clamped(&self) -> BuildSettings {
        let clamped = BuildSettings {
            sah_bins: self.sah_bins.max(MIN_BINS),
            spatial_bins: self.spatial_bins.max(MIN_BINS),
            min_leaf_size: self.min_leaf_size.max(1),
            max_depth: self.max_depth.max(1),
            ..*self
        };

        let limits = |s: &BuildSettings| (s.sah_bins, s.spatial_bins, s.min_leaf_size, s.max_depth);
        if limits(&clamped) != limits(self) {
            log::warn!(
                "Raised build limits: sah_bins {}, spatial_bins {}, min_leaf_size {}, max_depth {}",
                clamped.sah_bins,
                clamped.spatial_bins,
                clamped.min_leaf_size,
                clamped.max_depth
            );
        }

        clamped
    }

    /// Hash of every field that changes the BVH2 a build produces.
    ///
    /// `fanout` and `parallel_threshold` are left out: the first only affects
    /// the collapse that runs after loading, the second never changes output.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher64::default();
        hasher.write_u32(self.builder.as_u32());
        hasher.write_u32(self.leaf_cost.to_bits());
        hasher.write_u32(self.traversal_cost.to_bits());
        match self.overlap_threshold {
            Some(threshold) => {
                hasher.write_u8(1);
                hasher.write_u32(threshold.to_bits());
            }
            None => hasher.write_u8(0),
        }
        hasher.write_u32(self.duplication_budget.to_bits());
        hasher.write_u64(self.sah_bins as u64);
        hasher.write_u64(self.spatial_bins as u64);
        hasher.write_u64(self.min_leaf_size as u64);
        hasher.write_u64(self.max_depth as u64);
        hasher.finish()
    }
}

/// The subset of settings the wavefront scheduler reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceSettings {
    pub max_bounce_depth: u32,
    pub russian_roulette_start_depth: u32,
    pub queue_capacity_multiplier: f32,
}

impl TraceSettings {
    /// A continuation ray at depth `d` is only made while `d < max_bounce_depth`,
    /// and roulette only runs from `russian_roulette_start_depth` on.
    pub fn russian_roulette_reachable(&self) -> bool {
        self.russian_roulette_start_depth < self.max_bounce_depth
    }
}

impl Default for TraceSettings {
    fn default() -> Self {
        Settings::default().trace()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let settings = Settings::from_json_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_recognized_options() {
        let settings = Settings::from_json_str(
            r#"{
                "builder": "SBVH",
                "wide_fanout": 4,
                "leaf_cost_constant": 2.0,
                "traversal_cost_constant": 0.5,
                "spatial_split_overlap_threshold": 0.001,
                "reference_duplication_budget": 1.5,
                "queue_capacity_multiplier": 2.0,
                "max_bounce_depth": 4,
                "russian_roulette_start_depth": 1
            }"#,
        )
        .unwrap();

        assert_eq!(settings.builder, BuilderKind::Sbvh);
        assert_eq!(settings.wide_fanout, WideFanout::Four);

        let build = settings.build();
        assert_eq!(build.fanout.slots(), 4);
        assert_eq!(build.leaf_cost, 2.0);
        assert_eq!(build.traversal_cost, 0.5);
        assert_eq!(build.overlap_threshold, Some(0.001));
        assert_eq!(build.duplication_budget, 1.5);

        let trace = settings.trace();
        assert_eq!(trace.queue_capacity_multiplier, 2.0);
        assert_eq!(trace.max_bounce_depth, 4);
        assert_eq!(trace.russian_roulette_start_depth, 1);
    }

    #[test]
    fn test_invalid_fanout_is_rejected() {
        let err = Settings::from_json_str(r#"{ "wide_fanout": 6 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        assert!(Settings::from_json_str(r#"{ "max_bounces": 3 }"#).is_err());
    }

    #[test]
    fn test_out_of_range_values() {
        let err = Settings::from_json_str(r#"{ "reference_duplication_budget": 0.5 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "reference_duplication_budget",
                ..
            }
        ));

        assert!(Settings::from_json_str(r#"{ "max_bounce_depth": 0 }"#).is_err());
        assert!(Settings::from_json_str(r#"{ "queue_capacity_multiplier": -1.0 }"#).is_err());
    }

    #[test]
    fn test_unreachable_roulette_is_allowed() {
        assert!(TraceSettings::default().russian_roulette_reachable());

        let settings =
            Settings::from_json_str(r#"{ "max_bounce_depth": 3, "russian_roulette_start_depth": 3 }"#)
                .unwrap();
        assert!(!settings.trace().russian_roulette_reachable());

        let settings =
            Settings::from_json_str(r#"{ "max_bounce_depth": 4, "russian_roulette_start_depth": 3 }"#)
                .unwrap();
        assert!(settings.trace().russian_roulette_reachable());
    }

    #[test]
    fn test_clamped_raises_unusable_limits() {
        let defaults = BuildSettings::default();
        assert_eq!(defaults.clamped(), defaults);

        let zeroed = BuildSettings {
            sah_bins: 0,
            spatial_bins: 1,
            min_leaf_size: 0,
            max_depth: 0,
            ..defaults
        };
        let clamped = zeroed.clamped();
        assert_eq!(clamped.sah_bins, MIN_BINS);
        assert_eq!(clamped.spatial_bins, MIN_BINS);
        assert_eq!(clamped.min_leaf_size, 1);
        assert_eq!(clamped.max_depth, 1);
        assert_eq!(clamped.builder, zeroed.builder);
    }

    #[test]
    fn test_fingerprint_tracks_output_affecting_fields() {
        let base = BuildSettings::default();

        let mut other_fanout = base;
        other_fanout.fanout = WideFanout::Four;
        assert_eq!(base.fingerprint(), other_fanout.fingerprint());

        let mut other_builder = base;
        other_builder.builder = BuilderKind::Sbvh;
        assert_ne!(base.fingerprint(), other_builder.fingerprint());

        let mut other_cost = base;
        other_cost.traversal_cost = 2.0;
        assert_ne!(base.fingerprint(), other_cost.fingerprint());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "builder": "SAH", "sah_bins": 8 }"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.sah_bins, 8);

        let missing = Settings::load(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
