use octastore_common::{ConsistencyLevel, SpatialBounds};
use octastore_morton::MAX_LEVEL;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::StorageError;

const DEFAULT_MAX_CACHE_SIZE: usize = 10_000;
const DEFAULT_REPLICATION_FACTOR: u32 = 3;
const DEFAULT_HOMOGENEITY_THRESHOLD: f64 = 0.9;
const DEFAULT_MAX_LEVEL: u32 = 20;

/// Storage engine configuration.
///
/// `world_bounds` is required when deserializing; every other field falls
/// back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub world_bounds: SpatialBounds,
    /// Maximum accelerator entries. 0 disables the accelerator.
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,
    #[serde(default)]
    pub default_consistency: ConsistencyLevel,
    #[serde(default = "default_homogeneity_threshold")]
    pub homogeneity_threshold: f64,
    /// Deepest octree level the engine will query or store.
    #[serde(default = "default_max_level")]
    pub max_level: u32,
    #[serde(default = "default_enable_caching")]
    pub enable_caching: bool,
}

fn default_max_cache_size() -> usize {
    DEFAULT_MAX_CACHE_SIZE
}

fn default_replication_factor() -> u32 {
    DEFAULT_REPLICATION_FACTOR
}

fn default_homogeneity_threshold() -> f64 {
    DEFAULT_HOMOGENEITY_THRESHOLD
}

fn default_max_level() -> u32 {
    DEFAULT_MAX_LEVEL
}

fn default_enable_caching() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::earth()
    }
}

impl StorageConfig {
    /// Configuration with the given world bounds and default options.
    pub fn with_world_bounds(world_bounds: SpatialBounds) -> Self {
        Self {
            world_bounds,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            default_consistency: ConsistencyLevel::default(),
            homogeneity_threshold: DEFAULT_HOMOGENEITY_THRESHOLD,
            max_level: DEFAULT_MAX_LEVEL,
            enable_caching: true,
        }
    }

    /// Planet-scale world: longitude [-180, 180], latitude [-90, 90],
    /// elevation [-11000 m, 9000 m].
    pub fn earth() -> Self {
        Self::with_world_bounds(SpatialBounds {
            min: glam::DVec3::new(-180.0, -90.0, -11_000.0),
            max: glam::DVec3::new(180.0, 90.0, 9_000.0),
        })
    }

    /// Small cube world with a small accelerator, for tests and demos.
    pub fn for_testing() -> Self {
        Self {
            max_cache_size: 100,
            replication_factor: 2,
            default_consistency: ConsistencyLevel::One,
            max_level: 10,
            ..Self::with_world_bounds(SpatialBounds {
                min: glam::DVec3::ZERO,
                max: glam::DVec3::splat(1000.0),
            })
        }
    }

    /// Whether reads go through the accelerator at all.
    pub fn caching_active(&self) -> bool {
        self.enable_caching && self.max_cache_size > 0
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        self.world_bounds.validate_volume()?;
        if self.replication_factor == 0 {
            return Err(StorageError::InvalidArgument(
                "replication_factor must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.homogeneity_threshold) {
            return Err(StorageError::InvalidArgument(format!(
                "homogeneity_threshold {} outside [0, 1]",
                self.homogeneity_threshold
            )));
        }
        if self.max_level > MAX_LEVEL {
            return Err(StorageError::InvalidArgument(format!(
                "max_level {} exceeds the Morton precision cap of {MAX_LEVEL}",
                self.max_level
            )));
        }
        Ok(())
    }

    pub fn from_json_str(data: &str) -> Result<Self, StorageError> {
        let config: Self = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(data: &str) -> Result<Self, StorageError> {
        let config: Self = serde_yaml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&data),
            Some("yaml" | "yml") => Self::from_yaml_str(&data),
            other => Err(StorageError::Config(format!(
                "unsupported config extension: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}
