//! Simulation settings
//!
//! All tunable scalar constants of the engine in one place. A copy of the
//! settings travels to every island worker at spawn time.

use crate::error::PhysicsError;
use crate::math::Scalar;

/// Tunable constants of the simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationSettings {
    /// Fixed timestep of every island.
    pub fixed_dt: Scalar,
    /// Solver passes per step.
    pub solver_iterations: u32,
    /// Inset applied to dynamic AABBs when searching for new pairs; negative
    /// values inflate the box.
    pub aabb_offset: Scalar,
    /// Manifolds survive until the pair AABBs separate by more than this.
    pub separation_threshold: Scalar,
    /// Contact points break when their normal separation exceeds this.
    pub contact_breaking_threshold: Scalar,
    /// New collision points merge into an existing one within this distance.
    pub contact_caching_threshold: Scalar,
    /// Simulation time below the sleep thresholds before an island sleeps.
    pub island_time_to_sleep: Scalar,
    pub island_linear_sleep_threshold: Scalar,
    pub island_angular_sleep_threshold: Scalar,
    /// How many steps an island may lag behind wall time before it skips.
    pub max_lagging_steps: u32,
    /// Seconds a worker waits after a topology change before checking
    /// whether its island can split.
    pub calculate_split_delay: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            solver_iterations: 10,
            aabb_offset: -0.2,
            separation_threshold: 0.1,
            contact_breaking_threshold: 0.02,
            contact_caching_threshold: 0.04,
            island_time_to_sleep: 2.0,
            island_linear_sleep_threshold: 0.005,
            island_angular_sleep_threshold: core::f32::consts::PI / 48.0,
            max_lagging_steps: 10,
            calculate_split_delay: 1.1,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if !(self.fixed_dt > 0.0) {
            return Err(PhysicsError::InvalidConfig {
                reason: "fixed_dt must be positive",
            });
        }
        if self.solver_iterations == 0 {
            return Err(PhysicsError::InvalidConfig {
                reason: "solver_iterations must be at least 1",
            });
        }
        if self.separation_threshold < 0.0 {
            return Err(PhysicsError::InvalidConfig {
                reason: "separation_threshold must not be negative",
            });
        }
        if self.contact_breaking_threshold < 0.0 {
            return Err(PhysicsError::InvalidConfig {
                reason: "contact_breaking_threshold must not be negative",
            });
        }
        if !(self.island_time_to_sleep >= 0.0) {
            return Err(PhysicsError::InvalidConfig {
                reason: "island_time_to_sleep must not be negative",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(SimulationSettings::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_dt() {
        let settings = SimulationSettings {
            fixed_dt: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let settings = SimulationSettings {
            solver_iterations: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_nan_dt() {
        let settings = SimulationSettings {
            fixed_dt: Scalar::NAN,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
