//! Error types
//!
//! The simulation core treats malformed state as a programmer error and
//! asserts; `PhysicsError` covers the genuinely fallible surface: snapshot
//! import and configuration validation.

use thiserror::Error;

use crate::registry::Entity;

/// Errors reported by the fallible public surface.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum PhysicsError {
    /// A rigid body definition violates a precondition.
    #[error("invalid rigid body definition: {reason}")]
    InvalidRigidBody { reason: &'static str },

    /// A settings value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },

    /// A snapshot referenced an entity with no local mapping.
    #[error("snapshot references unknown entity {0:?}")]
    UnknownEntity(Entity),

    /// A snapshot's structure is internally inconsistent.
    #[error("malformed snapshot: {reason}")]
    MalformedSnapshot { reason: &'static str },
}
