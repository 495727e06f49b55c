//! Time integration of dynamic bodies.
//!
//! Semi-implicit Euler: velocities are updated first, then positions use the
//! new velocities. Static bodies are skipped everywhere.

use tumble_math::{Quat, Vec3};

use crate::body::Body;
use crate::solver::PushVelocity;

/// Advances velocities and poses.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Integrator {
    /// Linear velocity damping per second.
    pub linear_damping: f64,
    /// Angular velocity damping per second.
    pub angular_damping: f64,
}

impl Integrator {
    /// Create an integrator with the given damping.
    pub fn new(linear_damping: f64, angular_damping: f64) -> Self {
        Self {
            linear_damping,
            angular_damping,
        }
    }

    /// `v += g·dt`, then damping.
    pub fn apply_gravity(&self, body: &mut Body, gravity: &Vec3, dt: f64) {
        if body.is_static() {
            return;
        }
        body.linear_velocity += gravity * dt;
        if self.linear_damping > 0.0 {
            body.linear_velocity /= 1.0 + dt * self.linear_damping;
        }
        if self.angular_damping > 0.0 {
            body.angular_velocity /= 1.0 + dt * self.angular_damping;
        }
    }

    /// Move the body along its velocity plus any positional push.
    pub fn integrate(&self, body: &mut Body, push: Option<&PushVelocity>, dt: f64) {
        if body.is_static() {
            return;
        }
        let push = push.copied().unwrap_or_default();

        body.pose.position += (body.linear_velocity + push.linear) * dt;

        let omega = body.angular_velocity + push.angular;
        if omega.norm_squared() > 0.0 {
            let delta = Quat::from_scaled_axis(omega * dt);
            body.pose.orientation = Quat::new_normalize((delta * body.pose.orientation).into_inner());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use tumble_math::Pose;

    use crate::body::BodyDesc;
    use crate::shape::Shape;

    fn ball(mass: f64) -> Body {
        Body::from_desc(BodyDesc::new(
            Arc::new(Shape::sphere(1.0)),
            mass,
            Pose::from_position(0.0, 50.0, 0.0),
        ))
        .unwrap()
    }

    #[test]
    fn test_semi_implicit_euler() {
        let mut body = ball(1.0);
        let integrator = Integrator::default();
        let g = Vec3::new(0.0, -10.0, 0.0);
        let dt = 0.1;
        integrator.apply_gravity(&mut body, &g, dt);
        integrator.integrate(&mut body, None, dt);
        assert_relative_eq!(body.linear_velocity().y, -1.0, epsilon = 1e-12);
        // Position uses the already-updated velocity.
        assert_relative_eq!(body.pose().position.y, 49.9, epsilon = 1e-12);
    }

    #[test]
    fn test_static_is_noop() {
        let mut body = ball(0.0);
        let integrator = Integrator::default();
        integrator.apply_gravity(&mut body, &Vec3::new(0.0, -10.0, 0.0), 1.0);
        let push = PushVelocity {
            linear: Vec3::new(1.0, 1.0, 1.0),
            angular: Vec3::new(1.0, 0.0, 0.0),
        };
        integrator.integrate(&mut body, Some(&push), 1.0);
        assert_eq!(body.pose(), Pose::from_position(0.0, 50.0, 0.0));
        assert_eq!(body.linear_velocity(), Vec3::zeros());
    }

    #[test]
    fn test_angular_integration() {
        let mut body = Body::from_desc(
            BodyDesc::new(Arc::new(Shape::sphere(1.0)), 1.0, Pose::identity())
                .with_angular_velocity(Vec3::new(0.0, std::f64::consts::PI, 0.0)),
        )
        .unwrap();
        let integrator = Integrator::default();
        for _ in 0..60 {
            integrator.integrate(&mut body, None, 1.0 / 60.0);
        }
        // Half a turn about Y maps +X to -X.
        let x = body.pose().rotate_vector(&Vec3::x());
        assert_relative_eq!(x.x, -1.0, epsilon = 1e-9);
        assert_relative_eq!(body.pose().orientation.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_push_moves_but_does_not_persist() {
        let mut body = ball(1.0);
        let push = PushVelocity {
            linear: Vec3::new(0.0, 6.0, 0.0),
            angular: Vec3::zeros(),
        };
        Integrator::default().integrate(&mut body, Some(&push), 0.5);
        assert_relative_eq!(body.pose().position.y, 53.0);
        assert_eq!(body.linear_velocity(), Vec3::zeros());
    }

    #[test]
    fn test_damping() {
        let mut body = ball(1.0);
        let integrator = Integrator::new(1.0, 0.0);
        integrator.apply_gravity(&mut body, &Vec3::new(0.0, -10.0, 0.0), 1.0);
        assert_relative_eq!(body.linear_velocity().y, -5.0);
    }
}
