#![warn(missing_docs)]

//! Math types for the tumble rigid-body core.
//!
//! Thin wrappers around nalgebra providing the handful of types the
//! simulation pipeline passes around: vectors, rotations, rigid poses and
//! the degenerate-length tolerance.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit quaternion describing an orientation.
pub type Quat = UnitQuaternion<f64>;

/// A 3x3 matrix, used for inertia tensors and rotation matrices.
pub type Mat3 = Matrix3<f64>;

/// Rigid transform of a body: where it is and how it is rotated.
///
/// `Pose` is a plain value. Copies do not track the body they came from,
/// so re-query the world after every step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// World-space position of the body origin.
    pub position: Vec3,
    /// World-space orientation of the body.
    pub orientation: Quat,
}

impl Pose {
    /// Identity pose at the origin.
    pub fn identity() -> Self {
        Self {
            position: Vec3::zeros(),
            orientation: Quat::identity(),
        }
    }

    /// Pose at `(x, y, z)` with identity orientation.
    pub fn from_position(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vec3::new(x, y, z),
            orientation: Quat::identity(),
        }
    }

    /// Pose from a position and orientation.
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Map a body-local point into world space.
    pub fn transform_point(&self, p: &Vec3) -> Vec3 {
        self.orientation * p + self.position
    }

    /// Rotate a body-local direction into world space.
    pub fn rotate_vector(&self, v: &Vec3) -> Vec3 {
        self.orientation * v
    }

    /// Map a world-space point into the body-local frame.
    pub fn inverse_transform_point(&self, p: &Vec3) -> Vec3 {
        self.orientation.inverse_transform_vector(&(p - self.position))
    }

    /// Rotation matrix of the orientation.
    pub fn rotation_matrix(&self) -> Mat3 {
        self.orientation.to_rotation_matrix().into_inner()
    }

    /// True when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|c| c.is_finite())
            && self.orientation.coords.iter().all(|c| c.is_finite())
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Tolerance for geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Linear distance tolerance in world units.
    pub linear: f64,
}

impl Tolerance {
    /// Default simulation tolerance, 1e-9 world units.
    pub const DEFAULT: Self = Self { linear: 1e-9 };

    /// Check if a vector is too short to normalize.
    pub fn is_degenerate(&self, v: &Vec3) -> bool {
        v.norm_squared() < self.linear * self.linear
    }
}

/// Two unit vectors orthogonal to `n` and to each other.
///
/// Used to build friction tangents. `n` is assumed normalized.
pub fn orthonormal_basis(n: &Vec3) -> (Vec3, Vec3) {
    // Pick the axis least aligned with n to avoid a degenerate cross product.
    let helper = if n.x.abs() < 0.57735 {
        Vec3::x()
    } else if n.y.abs() < 0.57735 {
        Vec3::y()
    } else {
        Vec3::z()
    };
    let t1 = n.cross(&helper).normalize();
    let t2 = n.cross(&t1);
    (t1, t2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_identity_pose() {
        let pose = Pose::identity();
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert!((pose.transform_point(&p) - p).norm() < 1e-12);
    }

    #[test]
    fn test_translation() {
        let pose = Pose::from_position(10.0, 20.0, 30.0);
        let result = pose.transform_point(&Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(result.x, 11.0);
        assert_relative_eq!(result.y, 22.0);
        assert_relative_eq!(result.z, 33.0);
    }

    #[test]
    fn test_rotation_z_90() {
        let pose = Pose::new(
            Vec3::zeros(),
            Quat::from_axis_angle(&Vec3::z_axis(), PI / 2.0),
        );
        let result = pose.rotate_vector(&Vec3::x());
        assert!(result.x.abs() < 1e-12);
        assert!((result.y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_transform_round_trip() {
        let pose = Pose::new(
            Vec3::new(1.0, -2.0, 0.5),
            Quat::from_scaled_axis(Vec3::new(1.0, 1.0, 0.0).normalize() * 0.7),
        );
        let p = Vec3::new(5.0, 6.0, 7.0);
        let local = pose.inverse_transform_point(&p);
        assert!((pose.transform_point(&local) - p).norm() < 1e-12);
    }

    #[test]
    fn test_orthonormal_basis() {
        for n in [Vec3::x(), Vec3::y(), Vec3::z(), Vec3::new(1.0, 2.0, -3.0).normalize()] {
            let (t1, t2) = orthonormal_basis(&n);
            assert!(t1.dot(&n).abs() < 1e-12);
            assert!(t2.dot(&n).abs() < 1e-12);
            assert!(t1.dot(&t2).abs() < 1e-12);
            assert_relative_eq!(t1.norm(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(t2.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_tolerance() {
        let tol = Tolerance::DEFAULT;
        assert!(tol.is_degenerate(&Vec3::new(1e-12, 0.0, 0.0)));
        assert!(!tol.is_degenerate(&Vec3::new(1e-3, 0.0, 0.0)));
    }
}
