//! Sphere contact generation.

use tumble_math::{Pose, Vec3};

use crate::contact::ContactPoint;
use crate::shape::Shape;

/// Sphere against sphere.
pub fn sphere_sphere(a: &Shape, pose_a: &Pose, b: &Shape, pose_b: &Pose) -> Vec<ContactPoint> {
    let (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) = (a, b) else {
        return Vec::new();
    };
    let delta = pose_b.position - pose_a.position;
    let distance = delta.norm();
    let reach = ra + rb;

    if distance >= reach {
        return Vec::new();
    }

    // Coincident centers: any direction works, pick up.
    let n = if distance > 1e-12 {
        delta / distance
    } else {
        Vec3::y()
    };
    let penetration = reach - distance;
    let point = pose_a.position + n * (ra - 0.5 * penetration);
    vec![ContactPoint::new(point, n, penetration)]
}

/// Sphere against cuboid.
pub fn sphere_cuboid(a: &Shape, pose_a: &Pose, b: &Shape, pose_b: &Pose) -> Vec<ContactPoint> {
    let (Shape::Sphere { radius }, Shape::Cuboid { half_extents }) = (a, b) else {
        return Vec::new();
    };
    let center = pose_b.inverse_transform_point(&pose_a.position);
    let closest = center.zip_map(half_extents, |c, h| c.clamp(-h, h));
    let diff = center - closest;
    let distance = diff.norm();

    let (surface, outward, penetration) = if distance > 1e-12 {
        if distance >= *radius {
            return Vec::new();
        }
        (closest, diff / distance, radius - distance)
    } else {
        // Center inside the box: push out through the nearest face.
        let mut axis = 0;
        let mut depth = f64::INFINITY;
        for i in 0..3 {
            let d = half_extents[i] - center[i].abs();
            if d < depth {
                depth = d;
                axis = i;
            }
        }
        let sign = if center[axis] >= 0.0 { 1.0 } else { -1.0 };
        let mut outward = Vec3::zeros();
        outward[axis] = sign;
        let mut surface = center;
        surface[axis] = sign * half_extents[axis];
        (surface, outward, radius + depth)
    };

    // Outward points from the box to the sphere; the manifold wants A -> B.
    let normal = -pose_b.rotate_vector(&outward);
    vec![ContactPoint::new(
        pose_b.transform_point(&surface),
        normal,
        penetration,
    )]
}
