//! Rigid bodies and the description used to create them.

use std::sync::Arc;

use slotmap::new_key_type;
use tumble_math::{Mat3, Pose, Vec3};

use crate::error::{PhysicsError, Result};
use crate::shape::Shape;

new_key_type! {
    /// Generational handle of a body inside a [`World`](crate::World).
    ///
    /// A removed id never resolves again, even after its slot is reused.
    pub struct BodyId;
}

/// Surface response coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Bounciness in `[0, 1]`. Combined per contact as a product.
    pub restitution: f64,
    /// Coulomb friction coefficient. Combined per contact as a geometric mean.
    pub friction: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            restitution: 0.0,
            friction: 0.5,
        }
    }
}

/// Broadphase filter: two bodies collide when each one's group is in the
/// other's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionFilter {
    /// Bits this body belongs to.
    pub group: u32,
    /// Bits this body collides with.
    pub mask: u32,
}

impl CollisionFilter {
    /// Whether bodies with these filters may collide.
    pub fn allows(&self, other: &CollisionFilter) -> bool {
        (self.group & other.mask) != 0 && (other.group & self.mask) != 0
    }
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            group: 1,
            mask: u32::MAX,
        }
    }
}

/// Everything needed to create a body.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    /// Collision shape, possibly shared with other bodies.
    pub shape: Arc<Shape>,
    /// Mass; `0` makes the body static.
    pub mass: f64,
    /// Initial pose.
    pub pose: Pose,
    /// Initial linear velocity.
    pub linear_velocity: Vec3,
    /// Initial angular velocity (radians per second, world space).
    pub angular_velocity: Vec3,
    /// Surface material.
    pub material: Material,
    /// Collision filter.
    pub filter: CollisionFilter,
}

impl BodyDesc {
    /// Describe a body at rest.
    pub fn new(shape: Arc<Shape>, mass: f64, pose: Pose) -> Self {
        Self {
            shape,
            mass,
            pose,
            linear_velocity: Vec3::zeros(),
            angular_velocity: Vec3::zeros(),
            material: Material::default(),
            filter: CollisionFilter::default(),
        }
    }

    /// Set the initial linear velocity.
    pub fn with_linear_velocity(mut self, v: Vec3) -> Self {
        self.linear_velocity = v;
        self
    }

    /// Set the initial angular velocity.
    pub fn with_angular_velocity(mut self, w: Vec3) -> Self {
        self.angular_velocity = w;
        self
    }

    /// Set restitution and friction.
    pub fn with_material(mut self, restitution: f64, friction: f64) -> Self {
        self.material = Material {
            restitution,
            friction,
        };
        self
    }

    /// Set the collision group and mask.
    pub fn with_collision_filter(mut self, group: u32, mask: u32) -> Self {
        self.filter = CollisionFilter { group, mask };
        self
    }
}

/// A simulated rigid body.
#[derive(Debug, Clone)]
pub struct Body {
    shape: Arc<Shape>,
    mass: f64,
    inv_mass: f64,
    inv_inertia_local: Vec3,
    /// Current pose, written once per step by the integrator.
    pub(crate) pose: Pose,
    pub(crate) linear_velocity: Vec3,
    pub(crate) angular_velocity: Vec3,
    material: Material,
    filter: CollisionFilter,
}

impl Body {
    /// Validate a description and derive mass properties.
    pub(crate) fn from_desc(desc: BodyDesc) -> Result<Self> {
        desc.shape.validate()?;
        if !desc.mass.is_finite() || desc.mass < 0.0 {
            return Err(PhysicsError::InvalidMass(desc.mass));
        }
        if !desc.pose.is_finite() {
            return Err(PhysicsError::InvalidShape {
                reason: "initial pose is not finite".to_string(),
            });
        }
        let material = desc.material;
        if !(0.0..=1.0).contains(&material.restitution) || material.friction < 0.0 {
            return Err(PhysicsError::InvalidShape {
                reason: format!("material {material:?} out of range"),
            });
        }

        let is_static = desc.mass == 0.0;
        let (inv_mass, inv_inertia_local) = if is_static {
            (0.0, Vec3::zeros())
        } else {
            let inertia = desc.shape.local_inertia(desc.mass).ok_or_else(|| {
                PhysicsError::InvalidShape {
                    reason: format!("{} shape can only be used on static bodies", desc.shape.kind()),
                }
            })?;
            (1.0 / desc.mass, inertia.map(|i| if i > 0.0 { 1.0 / i } else { 0.0 }))
        };

        // Static bodies never carry velocity.
        let (linear_velocity, angular_velocity) = if is_static {
            (Vec3::zeros(), Vec3::zeros())
        } else {
            (desc.linear_velocity, desc.angular_velocity)
        };

        Ok(Self {
            shape: desc.shape,
            mass: desc.mass,
            inv_mass,
            inv_inertia_local,
            pose: desc.pose,
            linear_velocity,
            angular_velocity,
            material,
            filter: desc.filter,
        })
    }

    /// The collision shape.
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// Mass (0 for static bodies).
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Inverse mass (0 for static bodies).
    pub fn inv_mass(&self) -> f64 {
        self.inv_mass
    }

    /// True for infinite-mass bodies.
    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0
    }

    /// True for bodies that move.
    pub fn is_dynamic(&self) -> bool {
        !self.is_static()
    }

    /// Current pose.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Current linear velocity.
    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    /// Current angular velocity.
    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    /// Surface material.
    pub fn material(&self) -> Material {
        self.material
    }

    /// Collision filter.
    pub fn filter(&self) -> CollisionFilter {
        self.filter
    }

    /// Inverse inertia tensor in world space: `R · I⁻¹ · Rᵀ`.
    pub fn inv_inertia_world(&self) -> Mat3 {
        if self.is_static() {
            return Mat3::zeros();
        }
        let r = self.pose.rotation_matrix();
        r * Mat3::from_diagonal(&self.inv_inertia_local) * r.transpose()
    }

    /// Velocity of the material point at offset `r` from the body origin.
    pub fn velocity_at(&self, r: &Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// Apply an impulse at offset `r` from the body origin. No-op when static.
    pub(crate) fn apply_impulse(&mut self, impulse: &Vec3, r: &Vec3) {
        if self.is_static() {
            return;
        }
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia_world() * r.cross(impulse);
    }
}
