//! Broadphase: cheap AABB culling that produces candidate body pairs.
//!
//! Two implementations share the [`BroadPhase`] trait:
//!
//! - [`BvhBroadPhase`] builds a bounding-volume hierarchy with the surface
//!   area heuristic and scales as `O(n log n + k)`.
//! - [`BruteForceBroadPhase`] tests every pair. Fine for a handful of bodies
//!   and useful as a reference.

mod brute_force;
mod bvh;

pub use brute_force::BruteForceBroadPhase;
pub use bvh::BvhBroadPhase;

use serde::{Deserialize, Serialize};

use crate::body::{BodyId, CollisionFilter};
use crate::bounds::Aabb;

/// The broadphase's record of one body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proxy {
    /// Body this proxy stands for.
    pub id: BodyId,
    /// World-space bounds at the current pose.
    pub aabb: Aabb,
    /// Static bodies never pair with each other.
    pub is_static: bool,
    /// Group/mask filter.
    pub filter: CollisionFilter,
}

/// An unordered pair of bodies, stored with `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyPair {
    /// Smaller id.
    pub a: BodyId,
    /// Larger id.
    pub b: BodyId,
}

impl BodyPair {
    /// Normalize `(x, y)` into `a < b` order. Returns `None` for a self pair.
    pub fn new(x: BodyId, y: BodyId) -> Option<Self> {
        match x.cmp(&y) {
            std::cmp::Ordering::Less => Some(Self { a: x, b: y }),
            std::cmp::Ordering::Greater => Some(Self { a: y, b: x }),
            std::cmp::Ordering::Equal => None,
        }
    }
}

/// Which broadphase a world should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadPhaseKind {
    /// Bounding-volume hierarchy.
    #[default]
    Bvh,
    /// All-pairs scan.
    BruteForce,
}

impl BroadPhaseKind {
    /// Instantiate the broadphase.
    pub fn build(self) -> Box<dyn BroadPhase> {
        match self {
            BroadPhaseKind::Bvh => Box::new(BvhBroadPhase::new()),
            BroadPhaseKind::BruteForce => Box::new(BruteForceBroadPhase::new()),
        }
    }
}

/// Spatial index producing potentially overlapping pairs.
pub trait BroadPhase: std::fmt::Debug {
    /// Replace the indexed bounds with `proxies`.
    fn update(&mut self, proxies: &[Proxy]);

    /// Forget everything cached for `id`.
    fn remove(&mut self, id: BodyId);

    /// Overlapping pairs, sorted, without duplicates or self pairs.
    fn query_pairs(&self) -> Vec<BodyPair>;

    /// Number of indexed proxies.
    fn len(&self) -> usize;

    /// True when nothing is indexed.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pair acceptance shared by every implementation.
pub(crate) fn accepts(a: &Proxy, b: &Proxy) -> Option<BodyPair> {
    if a.is_static && b.is_static {
        return None;
    }
    if !a.filter.allows(&b.filter) || !a.aabb.overlaps(&b.aabb) {
        return None;
    }
    BodyPair::new(a.id, b.id)
}

/// Sort and deduplicate a pair list.
pub(crate) fn finish(mut pairs: Vec<BodyPair>) -> Vec<BodyPair> {
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}

#[cfg(test)]
pub(crate) mod test_support {
    use slotmap::SlotMap;
    use tumble_math::Vec3;

    use super::*;

    /// `n` spheres of radius 1 on a line spaced `spacing` apart, plus a static
    /// ground plane and a static sphere at the far end.
    pub fn scene(n: usize, spacing: f64) -> Vec<Proxy> {
        let mut keys: SlotMap<BodyId, ()> = SlotMap::with_key();
        let mut proxies = Vec::new();
        proxies.push(Proxy {
            id: keys.insert(()),
            aabb: Aabb::half_space(&Vec3::y(), 0.0),
            is_static: true,
            filter: CollisionFilter::default(),
        });
        for i in 0..n {
            proxies.push(Proxy {
                id: keys.insert(()),
                aabb: Aabb::from_center(
                    Vec3::new(i as f64 * spacing, 0.5 + (i % 3) as f64, 0.0),
                    Vec3::repeat(1.0),
                ),
                is_static: false,
                filter: CollisionFilter::default(),
            });
        }
        proxies.push(Proxy {
            id: keys.insert(()),
            aabb: Aabb::from_center(Vec3::new(-1.0, 0.5, 0.0), Vec3::repeat(1.0)),
            is_static: true,
            filter: CollisionFilter::default(),
        });
        proxies
    }
}
