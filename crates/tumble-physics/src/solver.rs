//! Sequential impulse contact solver.
//!
//! Velocities are corrected with accumulated, clamped impulses. Penetration
//! is removed with split impulses: a second set of "push" velocities that
//! the integrator applies to positions for one step and then discards, so
//! positional correction never adds kinetic energy.

use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use tracing::debug;
use tumble_math::{orthonormal_basis, Mat3, Vec3};

use crate::body::{Body, BodyId};
use crate::contact::ContactManifold;
use crate::error::{PhysicsError, Result};

/// Solver tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Velocity and position iterations per step.
    pub iterations: u32,
    /// Fraction of the penetration removed per step.
    pub baumgarte: f64,
    /// Penetration allowed without correction.
    pub linear_slop: f64,
    /// Approach speed below which restitution is ignored.
    pub restitution_threshold: f64,
    /// Residual approach speed above which a contact counts as unconverged.
    pub convergence_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            baumgarte: 0.2,
            linear_slop: 0.001,
            restitution_threshold: 1.0,
            convergence_tolerance: 1e-3,
        }
    }
}

impl SolverConfig {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(PhysicsError::Config("solver iterations must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.baumgarte) {
            return Err(PhysicsError::Config("baumgarte must be between 0 and 1".into()));
        }
        if self.linear_slop < 0.0 || self.restitution_threshold < 0.0 {
            return Err(PhysicsError::Config(
                "linear_slop and restitution_threshold must be >= 0".into(),
            ));
        }
        if self.convergence_tolerance <= 0.0 {
            return Err(PhysicsError::Config("convergence_tolerance must be > 0".into()));
        }
        Ok(())
    }
}

/// Position-correction velocity for one body, valid for a single step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PushVelocity {
    /// Linear part.
    pub linear: Vec3,
    /// Angular part.
    pub angular: Vec3,
}

/// What the solver did during one call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveReport {
    /// Contact constraints built.
    pub constraints: usize,
    /// Iterations run.
    pub iterations: u32,
    /// Contacts still approaching faster than the tolerance afterwards.
    pub unconverged: usize,
    /// Deepest penetration seen.
    pub max_penetration: f64,
}

impl SolveReport {
    /// `NumericalDivergence` when contacts were left unconverged.
    pub fn divergence(&self) -> Option<PhysicsError> {
        (self.unconverged > 0).then_some(PhysicsError::NumericalDivergence {
            unconverged: self.unconverged,
        })
    }
}

/// Output of [`SequentialImpulseSolver::solve`].
#[derive(Debug, Clone, Default)]
pub struct SolveOutput {
    /// Statistics.
    pub report: SolveReport,
    /// Push velocities for bodies that need positional correction.
    pub push: SecondaryMap<BodyId, PushVelocity>,
}

/// Per-body scratch state, copied in before solving and written back after.
#[derive(Debug, Clone)]
struct SolverBody {
    id: BodyId,
    inv_mass: f64,
    inv_inertia: Mat3,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    push: PushVelocity,
}

impl SolverBody {
    fn apply(&mut self, impulse: &Vec3, r: &Vec3) {
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia * r.cross(impulse);
    }

    fn apply_push(&mut self, impulse: &Vec3, r: &Vec3) {
        self.push.linear += impulse * self.inv_mass;
        self.push.angular += self.inv_inertia * r.cross(impulse);
    }

    fn velocity_at(&self, r: &Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    fn push_at(&self, r: &Vec3) -> Vec3 {
        self.push.linear + self.push.angular.cross(r)
    }
}

/// One contact point turned into a normal constraint plus two friction rows.
#[derive(Debug, Clone)]
struct ContactConstraint {
    a: usize,
    b: usize,
    ra: Vec3,
    rb: Vec3,
    normal: Vec3,
    tangents: [Vec3; 2],
    normal_mass: f64,
    tangent_mass: [f64; 2],
    friction: f64,
    velocity_bias: f64,
    push_target: f64,
    normal_impulse: f64,
    tangent_impulse: [f64; 2],
    push_impulse: f64,
}

/// Sequential impulse solver.
///
/// Contacts are visited in the order the manifolds are given, so identical
/// input produces identical output.
#[derive(Debug, Clone, Default)]
pub struct SequentialImpulseSolver {
    config: SolverConfig,
    bodies: Vec<SolverBody>,
    constraints: Vec<ContactConstraint>,
}

impl SequentialImpulseSolver {
    /// Create a solver with the given tuning.
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            bodies: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Current tuning.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Replace the tuning.
    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    /// Resolve `manifolds` by changing body velocities.
    ///
    /// Runs `iterations` passes (the configured count when `None`). Static
    /// bodies take part with infinite mass and are never written to.
    pub fn solve(
        &mut self,
        manifolds: &[ContactManifold],
        bodies: &mut SlotMap<BodyId, Body>,
        dt: f64,
        iterations: Option<u32>,
    ) -> SolveOutput {
        let iterations = iterations.unwrap_or(self.config.iterations);
        let mut output = SolveOutput::default();
        if manifolds.is_empty() {
            return output;
        }

        self.prepare(manifolds, bodies, dt, &mut output.report);

        for _ in 0..iterations {
            for c in &mut self.constraints {
                solve_velocity(c, &mut self.bodies);
            }
        }
        for _ in 0..iterations {
            for c in &mut self.constraints {
                solve_push(c, &mut self.bodies);
            }
        }

        let tolerance = self.config.convergence_tolerance;
        output.report.iterations = iterations;
        output.report.unconverged = self
            .constraints
            .iter()
            .filter(|c| {
                let dv = self.bodies[c.b].velocity_at(&c.rb) - self.bodies[c.a].velocity_at(&c.ra);
                c.velocity_bias - dv.dot(&c.normal) > tolerance
            })
            .count();

        for sb in &self.bodies {
            if let Some(body) = bodies.get_mut(sb.id) {
                if body.is_dynamic() {
                    body.linear_velocity = sb.linear_velocity;
                    body.angular_velocity = sb.angular_velocity;
                    if sb.push != PushVelocity::default() {
                        output.push.insert(sb.id, sb.push);
                    }
                }
            }
        }

        debug!(
            constraints = output.report.constraints,
            unconverged = output.report.unconverged,
            max_penetration = output.report.max_penetration,
            "contacts solved"
        );

        output
    }

    /// Gather solver bodies and build one constraint per contact point.
    fn prepare(
        &mut self,
        manifolds: &[ContactManifold],
        bodies: &SlotMap<BodyId, Body>,
        dt: f64,
        report: &mut SolveReport,
    ) {
        self.bodies.clear();
        self.constraints.clear();
        let mut index: SecondaryMap<BodyId, usize> = SecondaryMap::new();

        for manifold in manifolds {
            if manifold.body_a == manifold.body_b {
                debug!(body = ?manifold.body_a, "self manifold skipped");
                continue;
            }
            let (Some(body_a), Some(body_b)) =
                (bodies.get(manifold.body_a), bodies.get(manifold.body_b))
            else {
                continue;
            };
            let a = solver_index(&mut index, &mut self.bodies, manifold.body_a, body_a);
            let b = solver_index(&mut index, &mut self.bodies, manifold.body_b, body_b);

            let (ma, mb) = (body_a.material(), body_b.material());
            let friction = (ma.friction * mb.friction).sqrt();
            let restitution = ma.restitution * mb.restitution;

            for point in &manifold.points {
                report.max_penetration = report.max_penetration.max(point.penetration);
                let ra = point.position - body_a.pose.position;
                let rb = point.position - body_b.pose.position;
                let n = point.normal;
                let (t1, t2) = orthonormal_basis(&n);

                let sa = &self.bodies[a];
                let sb = &self.bodies[b];
                let normal_mass = effective_mass(sa, sb, &ra, &rb, &n);
                let tangent_mass = [
                    effective_mass(sa, sb, &ra, &rb, &t1),
                    effective_mass(sa, sb, &ra, &rb, &t2),
                ];

                let vn = (sb.velocity_at(&rb) - sa.velocity_at(&ra)).dot(&n);
                let velocity_bias = if -vn > self.config.restitution_threshold {
                    -restitution * vn
                } else {
                    0.0
                };
                let push_target = self.config.baumgarte / dt
                    * (point.penetration - self.config.linear_slop).max(0.0);

                self.constraints.push(ContactConstraint {
                    a,
                    b,
                    ra,
                    rb,
                    normal: n,
                    tangents: [t1, t2],
                    normal_mass,
                    tangent_mass,
                    friction,
                    velocity_bias,
                    push_target,
                    normal_impulse: 0.0,
                    tangent_impulse: [0.0; 2],
                    push_impulse: 0.0,
                });
            }
        }
        report.constraints = self.constraints.len();
    }
}

fn solver_index(
    index: &mut SecondaryMap<BodyId, usize>,
    solver_bodies: &mut Vec<SolverBody>,
    id: BodyId,
    body: &Body,
) -> usize {
    if let Some(&i) = index.get(id) {
        return i;
    }
    let i = solver_bodies.len();
    solver_bodies.push(SolverBody {
        id,
        inv_mass: body.inv_mass(),
        inv_inertia: body.inv_inertia_world(),
        linear_velocity: body.linear_velocity,
        angular_velocity: body.angular_velocity,
        push: PushVelocity::default(),
    });
    index.insert(id, i);
    i
}

/// `1 / (J M⁻¹ Jᵀ)` for an impulse along `dir`; 0 when both bodies are static.
fn effective_mass(a: &SolverBody, b: &SolverBody, ra: &Vec3, rb: &Vec3, dir: &Vec3) -> f64 {
    let rna = ra.cross(dir);
    let rnb = rb.cross(dir);
    let k = a.inv_mass
        + b.inv_mass
        + rna.dot(&(a.inv_inertia * rna))
        + rnb.dot(&(b.inv_inertia * rnb));
    if k > 0.0 {
        1.0 / k
    } else {
        0.0
    }
}

/// Borrow two distinct solver bodies mutably.
fn pair_mut(bodies: &mut [SolverBody], a: usize, b: usize) -> (&mut SolverBody, &mut SolverBody) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = bodies.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = bodies.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

fn solve_velocity(c: &mut ContactConstraint, bodies: &mut [SolverBody]) {
    let (a, b) = pair_mut(bodies, c.a, c.b);

    let dv = b.velocity_at(&c.rb) - a.velocity_at(&c.ra);
    let vn = dv.dot(&c.normal);
    let lambda = c.normal_mass * (c.velocity_bias - vn);
    let accumulated = (c.normal_impulse + lambda).max(0.0);
    let lambda = accumulated - c.normal_impulse;
    c.normal_impulse = accumulated;
    let impulse = c.normal * lambda;
    a.apply(&-impulse, &c.ra);
    b.apply(&impulse, &c.rb);

    let max_friction = c.friction * c.normal_impulse;
    for k in 0..2 {
        let dv = b.velocity_at(&c.rb) - a.velocity_at(&c.ra);
        let vt = dv.dot(&c.tangents[k]);
        let lambda = -c.tangent_mass[k] * vt;
        let accumulated = (c.tangent_impulse[k] + lambda).clamp(-max_friction, max_friction);
        let lambda = accumulated - c.tangent_impulse[k];
        c.tangent_impulse[k] = accumulated;
        let impulse = c.tangents[k] * lambda;
        a.apply(&-impulse, &c.ra);
        b.apply(&impulse, &c.rb);
    }
}

fn solve_push(c: &mut ContactConstraint, bodies: &mut [SolverBody]) {
    if c.push_target <= 0.0 && c.push_impulse == 0.0 {
        return;
    }
    let (a, b) = pair_mut(bodies, c.a, c.b);
    let vn = (b.push_at(&c.rb) - a.push_at(&c.ra)).dot(&c.normal);
    let lambda = c.normal_mass * (c.push_target - vn);
    let accumulated = (c.push_impulse + lambda).max(0.0);
    let lambda = accumulated - c.push_impulse;
    c.push_impulse = accumulated;
    let impulse = c.normal * lambda;
    a.apply_push(&-impulse, &c.ra);
    b.apply_push(&impulse, &c.rb);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use tumble_math::Pose;

    use crate::body::BodyDesc;
    use crate::contact::ContactPoint;
    use crate::shape::Shape;

    fn ground_and_ball(ball_velocity: Vec3, restitution: f64) -> (SlotMap<BodyId, Body>, BodyId, BodyId) {
        let mut bodies = SlotMap::with_key();
        let ground = bodies.insert(
            Body::from_desc(
                BodyDesc::new(Arc::new(Shape::plane(Vec3::y(), 1.0)), 0.0, Pose::identity())
                    .with_material(restitution, 0.5),
            )
            .unwrap(),
        );
        let ball = bodies.insert(
            Body::from_desc(
                BodyDesc::new(Arc::new(Shape::sphere(1.0)), 1.0, Pose::from_position(0.0, 1.9, 0.0))
                    .with_linear_velocity(ball_velocity)
                    .with_material(restitution, 0.5),
            )
            .unwrap(),
        );
        (bodies, ground, ball)
    }

    fn manifold(ground: BodyId, ball: BodyId) -> ContactManifold {
        ContactManifold {
            body_a: ground,
            body_b: ball,
            points: vec![ContactPoint::new(Vec3::new(0.0, 1.0, 0.0), Vec3::y(), 0.1)],
        }
    }

    #[test]
    fn test_resting_contact_stops_fall() {
        let (mut bodies, ground, ball) = ground_and_ball(Vec3::new(0.0, -1.0 / 6.0, 0.0), 0.0);
        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        let out = solver.solve(&[manifold(ground, ball)], &mut bodies, 1.0 / 60.0, None);

        assert_relative_eq!(bodies[ball].linear_velocity().y, 0.0, epsilon = 1e-12);
        assert_eq!(out.report.unconverged, 0);
        assert!(out.report.divergence().is_none());
        // Push velocity removes 20% of (0.1 - slop) this step.
        let push = out.push[ball];
        assert_relative_eq!(push.linear.y, 0.2 * 60.0 * (0.1 - 0.001), epsilon = 1e-9);
    }

    #[test]
    fn test_static_body_untouched() {
        let (mut bodies, ground, ball) = ground_and_ball(Vec3::new(0.0, -5.0, 0.0), 0.0);
        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        let out = solver.solve(&[manifold(ground, ball)], &mut bodies, 1.0 / 60.0, None);
        assert_eq!(bodies[ground].linear_velocity(), Vec3::zeros());
        assert!(!out.push.contains_key(ground));
    }

    #[test]
    fn test_restitution_bounces() {
        let (mut bodies, ground, ball) = ground_and_ball(Vec3::new(0.0, -10.0, 0.0), 1.0);
        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        solver.solve(&[manifold(ground, ball)], &mut bodies, 1.0 / 60.0, None);
        assert_relative_eq!(bodies[ball].linear_velocity().y, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_friction_limits_sliding() {
        let (mut bodies, ground, ball) = ground_and_ball(Vec3::new(3.0, -1.0, 0.0), 0.0);
        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        solver.solve(&[manifold(ground, ball)], &mut bodies, 1.0 / 60.0, None);
        let v = bodies[ball].linear_velocity();
        assert_relative_eq!(v.y, 0.0, epsilon = 1e-9);
        // Friction slowed the slide but cannot reverse it.
        assert!(v.x < 3.0 && v.x > 0.0, "vx = {}", v.x);
        // Friction at the contact point also spins the ball.
        assert!(bodies[ball].angular_velocity().norm() > 0.0);
    }

    #[test]
    fn test_zero_iterations_reports_divergence() {
        let (mut bodies, ground, ball) = ground_and_ball(Vec3::new(0.0, -5.0, 0.0), 0.0);
        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        let out = solver.solve(&[manifold(ground, ball)], &mut bodies, 1.0 / 60.0, Some(0));
        assert_eq!(out.report.unconverged, 1);
        assert!(matches!(
            out.report.divergence(),
            Some(PhysicsError::NumericalDivergence { unconverged: 1 })
        ));
    }

    #[test]
    fn test_self_manifold_ignored() {
        let (mut bodies, ground, ball) = ground_and_ball(Vec3::new(0.0, -5.0, 0.0), 0.0);
        let mut solver = SequentialImpulseSolver::new(SolverConfig::default());
        let manifolds = [manifold(ball, ball), manifold(ground, ball)];
        let out = solver.solve(&manifolds, &mut bodies, 1.0 / 60.0, None);
        assert_eq!(out.report.constraints, 1);
        assert_relative_eq!(bodies[ball].linear_velocity().y, 0.0, epsilon = 1e-9);

        let out = solver.solve(&[manifold(ball, ball)], &mut bodies, 1.0 / 60.0, None);
        assert_eq!(out.report.constraints, 0);
    }

    #[test]
    fn test_validate() {
        assert!(SolverConfig::default().validate().is_ok());
        let bad = SolverConfig {
            iterations: 0,
            ..SolverConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
