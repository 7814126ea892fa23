use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        };
        f.write_str(name)
    }
}

/// Errors from constructing or validating a bounding box.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoundsError {
    #[error("bounds must be finite")]
    NonFinite,
    #[error("inverted bounds on {axis} axis: min {min} > max {max}")]
    Inverted { axis: Axis, min: f64, max: f64 },
    #[error("bounds have zero extent on {axis} axis")]
    Degenerate { axis: Axis },
}

/// Axis-aligned box in world coordinates. Containment and intersection are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialBounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl SpatialBounds {
    pub fn new(min: DVec3, max: DVec3) -> Result<Self, BoundsError> {
        let bounds = Self { min, max };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Build from six scalars in `min_x, min_y, min_z, max_x, max_y, max_z` order.
    pub fn from_extents(
        min_x: f64,
        min_y: f64,
        min_z: f64,
        max_x: f64,
        max_y: f64,
        max_z: f64,
    ) -> Result<Self, BoundsError> {
        Self::new(
            DVec3::new(min_x, min_y, min_z),
            DVec3::new(max_x, max_y, max_z),
        )
    }

    /// Check `min <= max` per axis and that every component is finite.
    pub fn validate(&self) -> Result<(), BoundsError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(BoundsError::NonFinite);
        }
        for (axis, min, max) in self.axes() {
            if min > max {
                return Err(BoundsError::Inverted { axis, min, max });
            }
        }
        Ok(())
    }

    /// Like [`validate`](Self::validate), and additionally require a positive
    /// extent on every axis. World bounds must pass this.
    pub fn validate_volume(&self) -> Result<(), BoundsError> {
        self.validate()?;
        for (axis, min, max) in self.axes() {
            if min == max {
                return Err(BoundsError::Degenerate { axis });
            }
        }
        Ok(())
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn contains(&self, point: DVec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Touching boxes intersect.
    pub fn intersects(&self, other: &SpatialBounds) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    fn axes(&self) -> [(Axis, f64, f64); 3] {
        [
            (Axis::X, self.min.x, self.max.x),
            (Axis::Y, self.min.y, self.max.y),
            (Axis::Z, self.min.z, self.max.z),
        ]
    }
}
