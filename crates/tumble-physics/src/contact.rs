//! Contact points and manifolds produced by the narrowphase.

use tumble_math::Vec3;

use crate::body::BodyId;

/// A single point of contact between two bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// World-space contact location.
    pub position: Vec3,
    /// Unit normal pointing from body A towards body B.
    pub normal: Vec3,
    /// Overlap along the normal, always `>= 0`.
    pub penetration: f64,
}

impl ContactPoint {
    /// Create a contact point; negative depths are clamped to zero.
    pub fn new(position: Vec3, normal: Vec3, penetration: f64) -> Self {
        Self {
            position,
            normal,
            penetration: penetration.max(0.0),
        }
    }

    /// The same contact seen from the other body.
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            ..*self
        }
    }
}

/// All contacts between one pair of bodies for the current step.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactManifold {
    /// First body; normals point away from it.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Contact points, never empty for a stored manifold.
    pub points: Vec<ContactPoint>,
}

impl ContactManifold {
    /// Whether this manifold references `id`.
    pub fn involves(&self, id: BodyId) -> bool {
        self.body_a == id || self.body_b == id
    }

    /// Deepest penetration among the points.
    pub fn max_penetration(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.penetration)
            .fold(0.0, f64::max)
    }
}
