//! Collision shapes.
//!
//! Shapes are immutable and are shared between bodies through `Arc<Shape>`.

use std::fmt;

use tumble_math::{Pose, Tolerance, Vec3};

use crate::bounds::Aabb;
use crate::error::{PhysicsError, Result};

/// Discriminant of a [`Shape`], used as the narrowphase dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShapeKind {
    /// Infinite plane.
    Plane,
    /// Sphere centered on the body origin.
    Sphere,
    /// Box centered on the body origin.
    Cuboid,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::Plane => "plane",
            ShapeKind::Sphere => "sphere",
            ShapeKind::Cuboid => "cuboid",
        };
        f.write_str(name)
    }
}

/// Collision volume of a body, in body-local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Points `x` with `normal · x = offset`. The solid side is opposite the normal.
    Plane {
        /// Outward normal (normalized on construction).
        normal: Vec3,
        /// Distance of the plane from the body origin along `normal`.
        offset: f64,
    },
    /// Sphere of the given radius.
    Sphere {
        /// Sphere radius.
        radius: f64,
    },
    /// Axis-aligned (in body space) box.
    Cuboid {
        /// Half the box size along each local axis.
        half_extents: Vec3,
    },
}

impl Shape {
    /// Plane with the given normal and offset. The normal is normalized.
    pub fn plane(normal: Vec3, offset: f64) -> Self {
        let len = normal.norm();
        let normal = if len > 0.0 { normal / len } else { normal };
        Shape::Plane { normal, offset }
    }

    /// Sphere of radius `radius`.
    pub fn sphere(radius: f64) -> Self {
        Shape::Sphere { radius }
    }

    /// Box with half extents `(hx, hy, hz)`.
    pub fn cuboid(hx: f64, hy: f64, hz: f64) -> Self {
        Shape::Cuboid {
            half_extents: Vec3::new(hx, hy, hz),
        }
    }

    /// The dispatch tag of this shape.
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Plane { .. } => ShapeKind::Plane,
            Shape::Sphere { .. } => ShapeKind::Sphere,
            Shape::Cuboid { .. } => ShapeKind::Cuboid,
        }
    }

    /// True for shapes with finite volume.
    pub fn is_bounded(&self) -> bool {
        !matches!(self, Shape::Plane { .. })
    }

    /// Check that the geometry is usable.
    pub fn validate(&self) -> Result<()> {
        match self {
            Shape::Plane { normal, offset } => {
                if !offset.is_finite() || normal.iter().any(|c| !c.is_finite()) {
                    return Err(invalid("plane has non-finite components"));
                }
                if Tolerance::DEFAULT.is_degenerate(normal) {
                    return Err(invalid("plane normal is zero"));
                }
            }
            Shape::Sphere { radius } => {
                if !radius.is_finite() || *radius <= 0.0 {
                    return Err(invalid(format!("sphere radius {radius} must be > 0")));
                }
            }
            Shape::Cuboid { half_extents } => {
                if half_extents.iter().any(|h| !h.is_finite() || *h <= 0.0) {
                    return Err(invalid(format!(
                        "cuboid half extents {:?} must be > 0",
                        half_extents.as_slice()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Principal moments of inertia for a body of this shape and `mass`.
    ///
    /// Returns `None` for shapes that cannot move (planes).
    pub fn local_inertia(&self, mass: f64) -> Option<Vec3> {
        match self {
            Shape::Plane { .. } => None,
            Shape::Sphere { radius } => {
                let i = 0.4 * mass * radius * radius;
                Some(Vec3::new(i, i, i))
            }
            Shape::Cuboid { half_extents } => {
                let (x, y, z) = (
                    2.0 * half_extents.x,
                    2.0 * half_extents.y,
                    2.0 * half_extents.z,
                );
                let k = mass / 12.0;
                Some(Vec3::new(
                    k * (y * y + z * z),
                    k * (x * x + z * z),
                    k * (x * x + y * y),
                ))
            }
        }
    }

    /// World-space bounds of this shape at `pose`.
    pub fn aabb(&self, pose: &Pose) -> Aabb {
        match self {
            Shape::Plane { normal, offset } => {
                let n = pose.rotate_vector(normal);
                let surface = pose.transform_point(&(normal * *offset));
                Aabb::half_space(&n, n.dot(&surface))
            }
            Shape::Sphere { radius } => Aabb::from_center(pose.position, Vec3::repeat(*radius)),
            Shape::Cuboid { half_extents } => {
                // Extent of a rotated box: |R| * h.
                let r = pose.rotation_matrix().abs();
                Aabb::from_center(pose.position, r * half_extents)
            }
        }
    }
}

fn invalid(reason: impl Into<String>) -> PhysicsError {
    PhysicsError::InvalidShape {
        reason: reason.into(),
    }
}
