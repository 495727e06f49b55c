//! The simulation world: owns bodies and runs the fixed step pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use slotmap::SlotMap;
use tracing::{debug, instrument, warn};
use tumble_math::{Pose, Vec3};

use crate::body::{Body, BodyDesc, BodyId};
use crate::broadphase::{BroadPhase, Proxy};
use crate::config::WorldConfig;
use crate::contact::ContactManifold;
use crate::error::{PhysicsError, Result};
use crate::integrator::Integrator;
use crate::narrowphase::{CollisionFn, Dispatcher};
use crate::shape::{Shape, ShapeKind};
use crate::solver::{SequentialImpulseSolver, SolveReport};

/// Fraction of a step treated as a whole step in [`World::advance`].
const STEP_EPSILON: f64 = 1e-9;

/// Observable lifecycle state of a [`World`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldPhase {
    /// No bodies yet.
    Configured,
    /// At least one body, idle between steps.
    Populated,
    /// Inside [`World::step`].
    Stepping,
}

/// Summary of one completed step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Zero-based index of this step.
    pub step: u64,
    /// Candidate pairs from the broadphase.
    pub pairs: usize,
    /// Pairs that produced at least one contact.
    pub manifolds: usize,
    /// Total contact points.
    pub contacts: usize,
    /// Pairs skipped because no algorithm covers their shapes.
    pub unregistered_pairs: usize,
    /// Solver statistics.
    pub solve: SolveReport,
}

impl StepReport {
    /// Contacts the solver left unconverged.
    pub fn unconverged_contacts(&self) -> usize {
        self.solve.unconverged
    }

    /// `NumericalDivergence` when the solver did not converge this step.
    pub fn divergence(&self) -> Option<PhysicsError> {
        self.solve.divergence()
    }
}

/// Counters accumulated over the world's lifetime.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    /// Steps completed.
    pub steps: u64,
    /// Pairs skipped for lack of a narrowphase algorithm.
    pub unregistered_pairs: u64,
    /// Same, broken down by shape combination.
    pub unregistered_by_kind: BTreeMap<(ShapeKind, ShapeKind), u64>,
    /// Steps where the solver reported divergence.
    pub divergent_steps: u64,
    /// Unconverged contacts summed over all steps.
    pub unconverged_contacts: u64,
}

/// Rigid body simulation world.
#[derive(Debug)]
pub struct World {
    config: WorldConfig,
    gravity: Vec3,

    // Pipeline stages
    bodies: SlotMap<BodyId, Body>,
    broadphase: Box<dyn BroadPhase>,
    dispatcher: Dispatcher,
    solver: SequentialImpulseSolver,
    integrator: Integrator,

    // Step results and bookkeeping
    manifolds: Vec<ContactManifold>,
    proxies: Vec<Proxy>,
    diagnostics: Diagnostics,
    accumulator: f64,
    phase: WorldPhase,
}

impl Default for World {
    fn default() -> Self {
        Self::build(WorldConfig::default())
    }
}

impl World {
    /// Create a world from a validated config.
    pub fn new(config: WorldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Default config with a different gravity.
    pub fn with_gravity(gravity: Vec3) -> Result<Self> {
        Self::new(WorldConfig {
            gravity: [gravity.x, gravity.y, gravity.z],
            ..WorldConfig::default()
        })
    }

    fn build(config: WorldConfig) -> Self {
        Self {
            gravity: config.gravity_vector(),
            bodies: SlotMap::with_key(),
            broadphase: config.broadphase.build(),
            dispatcher: Dispatcher::with_defaults(),
            solver: SequentialImpulseSolver::new(config.solver),
            integrator: Integrator::new(config.linear_damping, config.angular_damping),
            manifolds: Vec::new(),
            proxies: Vec::new(),
            diagnostics: Diagnostics::default(),
            accumulator: 0.0,
            phase: WorldPhase::Configured,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Current gravity.
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    /// Set gravity for subsequent steps. Non-finite vectors are rejected.
    pub fn set_gravity(&mut self, gravity: Vec3) -> Result<()> {
        if !is_finite(&gravity) {
            return Err(PhysicsError::Config(format!("gravity must be finite, got {gravity:?}")));
        }
        self.gravity = gravity;
        self.config.gravity = [gravity.x, gravity.y, gravity.z];
        Ok(())
    }

    /// Register or replace the collision algorithm for a shape combination.
    pub fn register_algorithm(&mut self, a: ShapeKind, b: ShapeKind, func: CollisionFn) {
        self.dispatcher.register(a, b, func);
    }

    /// The narrowphase dispatch table.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    // =========================================================================
    // Bodies
    // =========================================================================

    /// Add a body. Mass 0 makes it static.
    pub fn add(&mut self, shape: Arc<Shape>, mass: f64, pose: Pose) -> Result<BodyId> {
        self.add_body(BodyDesc::new(shape, mass, pose))
    }

    /// Add a body from a full description.
    pub fn add_body(&mut self, desc: BodyDesc) -> Result<BodyId> {
        let body = Body::from_desc(desc)?;
        let kind = body.shape().kind();
        let is_static = body.is_static();
        let id = self.bodies.insert(body);
        self.phase = WorldPhase::Populated;
        debug!(?id, %kind, is_static, "body added");
        Ok(id)
    }

    /// Remove a body, returning it.
    ///
    /// Cached broadphase state and stored contacts for the body are purged.
    /// A second removal of the same id fails with `UnknownBody`.
    pub fn remove_body(&mut self, id: BodyId) -> Result<Body> {
        let body = self.bodies.remove(id).ok_or(PhysicsError::UnknownBody(id))?;
        self.broadphase.remove(id);
        self.manifolds.retain(|m| !m.involves(id));
        if self.bodies.is_empty() {
            self.phase = WorldPhase::Configured;
        }
        debug!(?id, "body removed");
        Ok(body)
    }

    /// Pose of a body after the last step.
    pub fn pose(&self, id: BodyId) -> Result<Pose> {
        self.body(id).map(Body::pose)
    }

    /// Borrow a body.
    pub fn body(&self, id: BodyId) -> Result<&Body> {
        self.bodies.get(id).ok_or(PhysicsError::UnknownBody(id))
    }

    fn body_mut(&mut self, id: BodyId) -> Result<&mut Body> {
        self.bodies.get_mut(id).ok_or(PhysicsError::UnknownBody(id))
    }

    /// Set linear velocity. Ignored for static bodies.
    pub fn set_linear_velocity(&mut self, id: BodyId, velocity: Vec3) -> Result<()> {
        require_finite("linear velocity", &velocity)?;
        let body = self.body_mut(id)?;
        if body.is_dynamic() {
            body.linear_velocity = velocity;
        }
        Ok(())
    }

    /// Set angular velocity. Ignored for static bodies.
    pub fn set_angular_velocity(&mut self, id: BodyId, velocity: Vec3) -> Result<()> {
        require_finite("angular velocity", &velocity)?;
        let body = self.body_mut(id)?;
        if body.is_dynamic() {
            body.angular_velocity = velocity;
        }
        Ok(())
    }

    /// Apply an impulse at a world-space point.
    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vec3, world_point: Vec3) -> Result<()> {
        require_finite("impulse", &impulse)?;
        require_finite("impulse point", &world_point)?;
        let body = self.body_mut(id)?;
        let r = world_point - body.pose.position;
        body.apply_impulse(&impulse, &r);
        Ok(())
    }

    /// Body ids in arena order.
    pub fn body_ids(&self) -> Vec<BodyId> {
        self.bodies.keys().collect()
    }

    /// Iterate over all bodies in arena order.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.bodies.iter()
    }

    /// Number of bodies.
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether the world has no bodies.
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    // =========================================================================
    // Stepping
    // =========================================================================

    /// Advance the simulation by `dt` seconds.
    ///
    /// Arguments are checked before anything changes, so an `InvalidStep`
    /// error leaves the world as it was. Solver divergence is reported in the
    /// returned [`StepReport`], not as an error.
    #[instrument(level = "trace", skip(self), fields(step = self.diagnostics.steps))]
    pub fn step(&mut self, dt: f64, iterations: u32) -> Result<StepReport> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PhysicsError::InvalidStep(format!("dt must be finite and > 0, got {dt}")));
        }
        if iterations == 0 {
            return Err(PhysicsError::InvalidStep("solver iterations must be > 0".into()));
        }

        self.phase = WorldPhase::Stepping;
        let mut report = StepReport {
            step: self.diagnostics.steps,
            ..StepReport::default()
        };

        for body in self.bodies.values_mut() {
            self.integrator.apply_gravity(body, &self.gravity, dt);
        }

        self.proxies.clear();
        self.proxies.extend(self.bodies.iter().map(|(id, body)| Proxy {
            id,
            aabb: body.shape().aabb(&body.pose),
            is_static: body.is_static(),
            filter: body.filter(),
        }));
        self.broadphase.update(&self.proxies);
        let pairs = self.broadphase.query_pairs();
        report.pairs = pairs.len();

        let mut manifolds = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            let (Some(body_a), Some(body_b)) = (self.bodies.get(pair.a), self.bodies.get(pair.b))
            else {
                continue;
            };
            let (kind_a, kind_b) = (body_a.shape().kind(), body_b.shape().kind());
            let Some(algorithm) = self.dispatcher.resolve(kind_a, kind_b) else {
                report.unregistered_pairs += 1;
                self.note_unregistered(kind_a, kind_b);
                continue;
            };
            let points = algorithm.run(body_a.shape(), &body_a.pose, body_b.shape(), &body_b.pose);
            if !points.is_empty() {
                manifolds.push(ContactManifold {
                    body_a: pair.a,
                    body_b: pair.b,
                    points,
                });
            }
        }
        report.manifolds = manifolds.len();
        report.contacts = manifolds.iter().map(|m| m.points.len()).sum();

        let output = self.solver.solve(&manifolds, &mut self.bodies, dt, Some(iterations));

        for (id, body) in self.bodies.iter_mut() {
            self.integrator.integrate(body, output.push.get(id), dt);
        }

        report.solve = output.report;
        self.manifolds = manifolds;
        self.diagnostics.steps += 1;
        if let Some(err) = report.divergence() {
            self.diagnostics.divergent_steps += 1;
            self.diagnostics.unconverged_contacts += report.solve.unconverged as u64;
            debug!(%err, step = report.step, "solver diverged");
        }
        self.phase = if self.bodies.is_empty() {
            WorldPhase::Configured
        } else {
            WorldPhase::Populated
        };

        debug!(
            step = report.step,
            pairs = report.pairs,
            manifolds = report.manifolds,
            contacts = report.contacts,
            "step complete"
        );
        Ok(report)
    }

    /// Feed `elapsed` real seconds and run as many fixed `config.timestep`
    /// steps as fit, at most `config.max_substeps`.
    ///
    /// Leftover time below one step is carried into the next call; whole
    /// steps beyond the cap are dropped. Returns the number of steps taken.
    pub fn advance(&mut self, elapsed: f64) -> Result<u32> {
        if !elapsed.is_finite() || elapsed < 0.0 {
            return Err(PhysicsError::InvalidStep(format!(
                "elapsed time must be finite and >= 0, got {elapsed}"
            )));
        }
        let timestep = self.config.timestep;
        self.accumulator += elapsed;
        // Absorb rounding so 3 x 0.1 counts as three steps of 0.1.
        let due = (self.accumulator / timestep + STEP_EPSILON).floor();
        self.accumulator = (self.accumulator - due * timestep).max(0.0);

        let steps = if due > f64::from(self.config.max_substeps) {
            debug!(due, max = self.config.max_substeps, "dropping excess substeps");
            self.config.max_substeps
        } else {
            due as u32
        };

        let iterations = self.config.solver.iterations;
        for _ in 0..steps {
            self.step(timestep, iterations)?;
        }
        Ok(steps)
    }

    fn note_unregistered(&mut self, a: ShapeKind, b: ShapeKind) {
        self.diagnostics.unregistered_pairs += 1;
        let count = self.diagnostics.unregistered_by_kind.entry((a, b)).or_insert(0);
        *count += 1;
        if *count == 1 {
            warn!(%a, %b, "no collision algorithm registered, pair ignored");
        } else {
            debug!(%a, %b, "unregistered pair ignored");
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Contact manifolds from the last step.
    pub fn contacts(&self) -> &[ContactManifold] {
        &self.manifolds
    }

    /// Lifetime counters.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Number of completed steps.
    pub fn step_count(&self) -> u64 {
        self.diagnostics.steps
    }

    /// Current lifecycle state.
    pub fn phase(&self) -> WorldPhase {
        self.phase
    }
}

fn is_finite(v: &Vec3) -> bool {
    v.iter().all(|c| c.is_finite())
}

fn require_finite(what: &'static str, v: &Vec3) -> Result<()> {
    if is_finite(v) {
        Ok(())
    } else {
        Err(PhysicsError::NonFinite { what })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::contact::ContactPoint;

    fn ground_and_ball(world: &mut World, height: f64) -> (BodyId, BodyId) {
        let ground = world
            .add(Arc::new(Shape::plane(Vec3::y(), 1.0)), 0.0, Pose::identity())
            .unwrap();
        let ball = world
            .add(Arc::new(Shape::sphere(1.0)), 1.0, Pose::from_position(0.0, height, 0.0))
            .unwrap();
        (ground, ball)
    }

    #[test]
    fn test_phase_transitions() {
        let mut world = World::default();
        assert_eq!(world.phase(), WorldPhase::Configured);
        let (ground, ball) = ground_and_ball(&mut world, 5.0);
        assert_eq!(world.phase(), WorldPhase::Populated);
        world.step(1.0 / 60.0, 10).unwrap();
        assert_eq!(world.phase(), WorldPhase::Populated);
        world.remove_body(ball).unwrap();
        world.remove_body(ground).unwrap();
        assert_eq!(world.phase(), WorldPhase::Configured);
    }

    #[test]
    fn test_rejects_invalid_step() {
        let mut world = World::default();
        let (_, ball) = ground_and_ball(&mut world, 5.0);
        assert!(matches!(world.step(0.0, 10), Err(PhysicsError::InvalidStep(_))));
        assert!(matches!(world.step(f64::NAN, 10), Err(PhysicsError::InvalidStep(_))));
        assert!(matches!(world.step(1.0 / 60.0, 0), Err(PhysicsError::InvalidStep(_))));
        assert_eq!(world.step_count(), 0);
        assert_eq!(world.pose(ball).unwrap().position.y, 5.0);
        assert_eq!(world.body(ball).unwrap().linear_velocity(), Vec3::zeros());
    }

    #[test]
    fn test_contact_published_and_purged() {
        let mut world = World::default();
        let (ground, ball) = ground_and_ball(&mut world, 1.99);
        let report = world.step(1.0 / 60.0, 10).unwrap();
        assert_eq!(report.pairs, 1);
        assert_eq!(report.manifolds, 1);
        assert_eq!(report.contacts, 1);
        assert_eq!(world.contacts().len(), 1);
        assert_eq!(world.contacts()[0].body_a, ground.min(ball));

        world.remove_body(ball).unwrap();
        assert!(world.contacts().is_empty());
        assert!(matches!(world.pose(ball), Err(PhysicsError::UnknownBody(_))));
    }

    #[test]
    fn test_unregistered_pair_counted_once_per_step() {
        let mut world = World::with_gravity(Vec3::zeros()).unwrap();
        let shape = Arc::new(Shape::cuboid(1.0, 1.0, 1.0));
        world.add(shape.clone(), 1.0, Pose::identity()).unwrap();
        world.add(shape, 1.0, Pose::from_position(0.5, 0.0, 0.0)).unwrap();

        for _ in 0..3 {
            let report = world.step(1.0 / 60.0, 10).unwrap();
            assert_eq!(report.unregistered_pairs, 1);
            assert_eq!(report.manifolds, 0);
        }
        let diag = world.diagnostics();
        assert_eq!(diag.unregistered_pairs, 3);
        assert_eq!(diag.unregistered_by_kind[&(ShapeKind::Cuboid, ShapeKind::Cuboid)], 3);
    }

    #[test]
    fn test_registered_algorithm_is_used() {
        fn touch(_: &Shape, a: &Pose, _: &Shape, b: &Pose) -> Vec<ContactPoint> {
            let mid = (a.position + b.position) * 0.5;
            vec![ContactPoint::new(mid, Vec3::x(), 0.0)]
        }

        let mut world = World::with_gravity(Vec3::zeros()).unwrap();
        world.register_algorithm(ShapeKind::Cuboid, ShapeKind::Cuboid, touch);
        let shape = Arc::new(Shape::cuboid(1.0, 1.0, 1.0));
        world.add(shape.clone(), 1.0, Pose::identity()).unwrap();
        world.add(shape, 1.0, Pose::from_position(1.5, 0.0, 0.0)).unwrap();

        let report = world.step(1.0 / 60.0, 10).unwrap();
        assert_eq!(report.unregistered_pairs, 0);
        assert_eq!(report.manifolds, 1);
    }

    #[test]
    fn test_velocity_setters() {
        let mut world = World::with_gravity(Vec3::zeros()).unwrap();
        let (ground, ball) = ground_and_ball(&mut world, 10.0);

        world.set_linear_velocity(ball, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        world.set_linear_velocity(ground, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        world.step(0.5, 10).unwrap();

        assert_relative_eq!(world.pose(ball).unwrap().position.x, 0.5);
        assert_eq!(world.pose(ground).unwrap(), Pose::identity());

        world.set_angular_velocity(ball, Vec3::new(0.0, 2.0, 0.0)).unwrap();
        assert_eq!(world.body(ball).unwrap().angular_velocity(), Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_apply_impulse_through_center() {
        let mut world = World::with_gravity(Vec3::zeros()).unwrap();
        let (_, ball) = ground_and_ball(&mut world, 10.0);
        world
            .apply_impulse(ball, Vec3::new(0.0, 0.0, 2.0), Vec3::new(0.0, 10.0, 0.0))
            .unwrap();
        let body = world.body(ball).unwrap();
        assert_relative_eq!(body.linear_velocity().z, 2.0);
        assert_relative_eq!(body.angular_velocity().norm(), 0.0);
    }

    #[test]
    fn test_advance_accumulates() {
        let mut world = World::default();
        ground_and_ball(&mut world, 50.0);
        let dt = world.config().timestep;

        assert_eq!(world.advance(dt / 2.0).unwrap(), 0);
        assert_eq!(world.advance(dt / 2.0).unwrap(), 1);
        assert_eq!(world.advance(1.0).unwrap(), world.config().max_substeps);
        assert!(world.advance(-1.0).is_err());
    }

    #[test]
    fn test_advance_tolerates_rounding() {
        let config = WorldConfig {
            timestep: 0.1,
            ..WorldConfig::default()
        };
        let mut world = World::new(config).unwrap();
        ground_and_ball(&mut world, 50.0);

        assert_eq!(world.advance(0.3).unwrap(), 3);
        assert_eq!(world.advance(0.05).unwrap(), 0);
        assert_eq!(world.advance(0.05).unwrap(), 1);
        assert_eq!(world.step_count(), 4);
    }

    #[test]
    fn test_set_gravity_updates_config() {
        let mut world = World::default();
        world.set_gravity(Vec3::new(0.0, -9.81, 0.0)).unwrap();
        assert_eq!(world.gravity().y, -9.81);
        assert_eq!(world.config().gravity[1], -9.81);
    }

    #[test]
    fn test_non_finite_gravity_rejected() {
        assert!(matches!(
            World::with_gravity(Vec3::new(0.0, f64::NAN, 0.0)),
            Err(PhysicsError::Config(_))
        ));

        let mut world = World::default();
        let (_, ball) = ground_and_ball(&mut world, 5.0);
        assert!(matches!(
            world.set_gravity(Vec3::new(0.0, f64::INFINITY, 0.0)),
            Err(PhysicsError::Config(_))
        ));
        assert_eq!(world.gravity(), Vec3::new(0.0, -10.0, 0.0));
        assert!(world.config().validate().is_ok());

        world.step(1.0 / 60.0, 10).unwrap();
        assert!(world.pose(ball).unwrap().is_finite());
    }

    #[test]
    fn test_non_finite_impulse_rejected() {
        let mut world = World::with_gravity(Vec3::zeros()).unwrap();
        let (_, ball) = ground_and_ball(&mut world, 10.0);

        let err = world
            .apply_impulse(ball, Vec3::new(f64::NAN, 0.0, 0.0), Vec3::new(0.0, 10.0, 0.0))
            .unwrap_err();
        assert_eq!(err, PhysicsError::NonFinite { what: "impulse" });
        assert!(world
            .apply_impulse(ball, Vec3::y(), Vec3::new(0.0, f64::INFINITY, 0.0))
            .is_err());
        assert!(world.set_linear_velocity(ball, Vec3::new(0.0, f64::NAN, 0.0)).is_err());
        assert!(world.set_angular_velocity(ball, Vec3::new(f64::NAN, 0.0, 0.0)).is_err());

        let body = world.body(ball).unwrap();
        assert_eq!(body.linear_velocity(), Vec3::zeros());
        assert_eq!(body.angular_velocity(), Vec3::zeros());
    }

    #[test]
    fn test_new_validates_config() {
        let config = WorldConfig {
            timestep: 0.0,
            ..WorldConfig::default()
        };
        assert!(matches!(World::new(config), Err(PhysicsError::Config(_))));
    }
}
