//! Narrowphase: exact contact generation through an open dispatch table.
//!
//! Algorithms are plain functions keyed by the ordered pair of shape kinds
//! they expect. A lookup for the reversed pair reuses the same function with
//! swapped inputs and flipped normals, so each combination is registered
//! once. Supporting a new shape means registering its pairings here; the
//! existing algorithm functions stay untouched.

mod plane;
mod sphere;

pub use plane::{plane_cuboid, plane_sphere};
pub use sphere::{sphere_cuboid, sphere_sphere};

use std::collections::BTreeMap;

use tumble_math::Pose;

use crate::body::Body;
use crate::contact::ContactPoint;
use crate::error::{PhysicsError, Result};
use crate::shape::{Shape, ShapeKind};

/// A pure collision test. Normals point from the first shape to the second.
pub type CollisionFn = fn(&Shape, &Pose, &Shape, &Pose) -> Vec<ContactPoint>;

/// A resolved algorithm, remembering whether inputs must be swapped.
#[derive(Clone, Copy)]
pub struct Algorithm {
    func: CollisionFn,
    swapped: bool,
}

impl Algorithm {
    /// Run the test for `(a, b)`; normals point from `a` to `b`.
    pub fn run(&self, a: &Shape, pose_a: &Pose, b: &Shape, pose_b: &Pose) -> Vec<ContactPoint> {
        if self.swapped {
            (self.func)(b, pose_b, a, pose_a)
                .iter()
                .map(ContactPoint::flipped)
                .collect()
        } else {
            (self.func)(a, pose_a, b, pose_b)
        }
    }

    /// True when the registered entry is for the reversed pair.
    pub fn is_swapped(&self) -> bool {
        self.swapped
    }
}

impl std::fmt::Debug for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Algorithm")
            .field("swapped", &self.swapped)
            .finish_non_exhaustive()
    }
}

/// Shape-pair to algorithm registry.
#[derive(Clone, Default)]
pub struct Dispatcher {
    table: BTreeMap<(ShapeKind, ShapeKind), CollisionFn>,
}

impl Dispatcher {
    /// A dispatcher with nothing registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A dispatcher with the built-in algorithms.
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register(ShapeKind::Plane, ShapeKind::Sphere, plane_sphere);
        dispatcher.register(ShapeKind::Plane, ShapeKind::Cuboid, plane_cuboid);
        dispatcher.register(ShapeKind::Sphere, ShapeKind::Sphere, sphere_sphere);
        dispatcher.register(ShapeKind::Sphere, ShapeKind::Cuboid, sphere_cuboid);
        dispatcher
    }

    /// Register (or replace) the algorithm for shapes `a` then `b`.
    pub fn register(&mut self, a: ShapeKind, b: ShapeKind, func: CollisionFn) {
        self.table.insert((a, b), func);
    }

    /// Find the algorithm for the pair, trying the reversed order second.
    pub fn resolve(&self, a: ShapeKind, b: ShapeKind) -> Option<Algorithm> {
        if let Some(&func) = self.table.get(&(a, b)) {
            return Some(Algorithm {
                func,
                swapped: false,
            });
        }
        self.table.get(&(b, a)).map(|&func| Algorithm {
            func,
            swapped: true,
        })
    }

    /// Contacts between two bodies; empty when they do not touch.
    ///
    /// The only error is `UnregisteredShapePair`.
    pub fn collide(&self, a: &Body, b: &Body) -> Result<Vec<ContactPoint>> {
        let (kind_a, kind_b) = (a.shape().kind(), b.shape().kind());
        let algorithm = self
            .resolve(kind_a, kind_b)
            .ok_or(PhysicsError::UnregisteredShapePair {
                a: kind_a,
                b: kind_b,
            })?;
        Ok(algorithm.run(a.shape(), &a.pose, b.shape(), &b.pose))
    }

    /// Registered `(a, b)` combinations.
    pub fn registered(&self) -> impl Iterator<Item = (ShapeKind, ShapeKind)> + '_ {
        self.table.keys().copied()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.table.keys()).finish()
    }
}
