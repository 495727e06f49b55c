#![warn(missing_docs)]

//! Minimal rigid-body dynamics core.
//!
//! Advances a set of bodies under gravity and contact constraints with a
//! fixed pipeline per step: gravity, broadphase, narrowphase, sequential
//! impulse solve, integration.
//!
//! # Features
//!
//! - Plane, sphere and cuboid shapes shared through `Arc`
//! - SAH bounding-volume hierarchy or brute-force broadphase
//! - Open narrowphase dispatch table keyed by shape kind
//! - Sequential impulses with friction, restitution and split-impulse
//!   position correction
//! - Fixed-step accumulator with a substep cap
//! - TOML configuration
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tumble_math::{Pose, Vec3};
//! use tumble_physics::{Shape, World};
//!
//! fn main() -> tumble_physics::Result<()> {
//!     let mut world = World::with_gravity(Vec3::new(0.0, -10.0, 0.0))?;
//!     world.add(Arc::new(Shape::plane(Vec3::y(), 1.0)), 0.0, Pose::identity())?;
//!     let ball = world.add(Arc::new(Shape::sphere(1.0)), 1.0, Pose::from_position(0.0, 50.0, 0.0))?;
//!
//!     for _ in 0..300 {
//!         world.step(1.0 / 60.0, 10)?;
//!     }
//!     let height = world.pose(ball)?.position.y;
//!     assert!((height - 2.0).abs() < 5e-3);
//!     Ok(())
//! }
//! ```

mod body;
mod bounds;
pub mod broadphase;
mod config;
mod contact;
mod error;
mod integrator;
pub mod narrowphase;
mod shape;
mod solver;
mod world;

pub use body::{Body, BodyDesc, BodyId, CollisionFilter, Material};
pub use bounds::Aabb;
pub use broadphase::{BodyPair, BroadPhase, BroadPhaseKind, Proxy};
pub use config::WorldConfig;
pub use contact::{ContactManifold, ContactPoint};
pub use error::{PhysicsError, Result};
pub use integrator::Integrator;
pub use narrowphase::{CollisionFn, Dispatcher};
pub use shape::{Shape, ShapeKind};
pub use solver::{PushVelocity, SequentialImpulseSolver, SolveOutput, SolveReport, SolverConfig};
pub use world::{Diagnostics, StepReport, World, WorldPhase};
