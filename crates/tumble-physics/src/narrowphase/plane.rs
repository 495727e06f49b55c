//! Plane contact generation.

use tumble_math::{Pose, Vec3};

use crate::contact::ContactPoint;
use crate::shape::Shape;

/// World-space plane `n · x = d` of a plane shape at `pose`.
fn world_plane(normal: &Vec3, offset: f64, pose: &Pose) -> (Vec3, f64) {
    let n = pose.rotate_vector(normal);
    let on_plane = pose.transform_point(&(normal * offset));
    (n, n.dot(&on_plane))
}

/// Plane against sphere.
///
/// The single contact point is the sphere center projected onto the plane
/// along the plane normal. The sphere touches when its center is closer to
/// the plane than its radius; it may also sit entirely inside the solid
/// half-space.
pub fn plane_sphere(a: &Shape, pose_a: &Pose, b: &Shape, pose_b: &Pose) -> Vec<ContactPoint> {
    let (Shape::Plane { normal, offset }, Shape::Sphere { radius }) = (a, b) else {
        return Vec::new();
    };
    let (n, d) = world_plane(normal, *offset, pose_a);
    let center = pose_b.position;
    let distance = n.dot(&center) - d;

    if distance >= *radius {
        return Vec::new();
    }

    vec![ContactPoint::new(center - n * distance, n, radius - distance)]
}

/// Plane against cuboid: one contact per corner inside the half-space.
pub fn plane_cuboid(a: &Shape, pose_a: &Pose, b: &Shape, pose_b: &Pose) -> Vec<ContactPoint> {
    let (Shape::Plane { normal, offset }, Shape::Cuboid { half_extents }) = (a, b) else {
        return Vec::new();
    };
    let (n, d) = world_plane(normal, *offset, pose_a);

    let mut contacts = Vec::new();
    for i in 0..8 {
        let sign = |bit: usize| if i & bit == 0 { -1.0 } else { 1.0 };
        let local = Vec3::new(
            sign(1) * half_extents.x,
            sign(2) * half_extents.y,
            sign(4) * half_extents.z,
        );
        let corner = pose_b.transform_point(&local);
        let distance = n.dot(&corner) - d;
        if distance < 0.0 {
            contacts.push(ContactPoint::new(corner - n * distance, n, -distance));
        }
    }
    contacts
}
