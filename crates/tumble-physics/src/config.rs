//! World configuration, loadable from TOML.

use serde::{Deserialize, Serialize};
use tumble_math::Vec3;

use crate::broadphase::BroadPhaseKind;
use crate::error::{PhysicsError, Result};
use crate::solver::SolverConfig;

/// Simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Gravity acceleration, Y up.
    pub gravity: [f64; 3],
    /// Fixed step used by [`World::advance`](crate::World::advance).
    pub timestep: f64,
    /// Upper bound on fixed steps per `advance` call.
    pub max_substeps: u32,
    /// Linear velocity damping per second.
    pub linear_damping: f64,
    /// Angular velocity damping per second.
    pub angular_damping: f64,
    /// Broadphase implementation.
    pub broadphase: BroadPhaseKind,
    /// Contact solver tuning.
    pub solver: SolverConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: [0.0, -10.0, 0.0],
            timestep: 1.0 / 60.0,
            max_substeps: 10,
            linear_damping: 0.0,
            angular_damping: 0.0,
            broadphase: BroadPhaseKind::Bvh,
            solver: SolverConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| PhysicsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PhysicsError::Config(e.to_string()))
    }

    /// Gravity as a vector.
    pub fn gravity_vector(&self) -> Vec3 {
        Vec3::from(self.gravity)
    }

    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(PhysicsError::Config("gravity must be finite".into()));
        }
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(PhysicsError::Config("timestep must be > 0".into()));
        }
        if self.max_substeps == 0 {
            return Err(PhysicsError::Config("max_substeps must be > 0".into()));
        }
        if self.linear_damping < 0.0 || self.angular_damping < 0.0 {
            return Err(PhysicsError::Config("damping must be >= 0".into()));
        }
        self.solver.validate()
    }
}
