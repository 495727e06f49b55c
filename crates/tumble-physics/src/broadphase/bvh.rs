//! Bounding volume hierarchy broadphase.
//!
//! The tree is rebuilt from scratch on every update using the surface area
//! heuristic. Unbounded proxies (planes) are kept out of the tree and tested
//! against every bounded proxy directly.

use crate::body::BodyId;
use crate::bounds::Aabb;

use super::{accepts, finish, BodyPair, BroadPhase, Proxy};

const NUM_BUCKETS: usize = 12;
const MAX_LEAF_SIZE: usize = 4;

/// A BVH node - either a leaf of proxy indices or an internal node.
#[derive(Debug, Clone)]
enum BvhNode {
    Leaf {
        aabb: Aabb,
        items: Vec<usize>,
    },
    Internal {
        aabb: Aabb,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    fn aabb(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { aabb, .. } | BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// SAH bounding-volume hierarchy over body bounds.
#[derive(Debug, Clone, Default)]
pub struct BvhBroadPhase {
    proxies: Vec<Proxy>,
    unbounded: Vec<usize>,
    root: Option<BvhNode>,
}

impl BvhBroadPhase {
    /// Create an empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Depth of the tree, 0 when empty.
    pub fn depth(&self) -> usize {
        fn depth_of(node: &BvhNode) -> usize {
            match node {
                BvhNode::Leaf { .. } => 1,
                BvhNode::Internal { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        self.root.as_ref().map_or(0, depth_of)
    }

    fn rebuild(&mut self) {
        self.unbounded.clear();
        let mut items: Vec<(usize, Aabb, tumble_math::Vec3)> = Vec::new();
        for (i, proxy) in self.proxies.iter().enumerate() {
            if proxy.aabb.is_bounded() {
                items.push((i, proxy.aabb, proxy.aabb.center()));
            } else {
                self.unbounded.push(i);
            }
        }
        self.root = if items.is_empty() {
            None
        } else {
            Some(build_node(&mut items))
        };
    }

    /// Collect pairs between proxy `i` and tree items with a larger index.
    fn query_node(&self, i: usize, node: &BvhNode, pairs: &mut Vec<BodyPair>) {
        let proxy = &self.proxies[i];
        if !node.aabb().overlaps(&proxy.aabb) {
            return;
        }
        match node {
            BvhNode::Leaf { items, .. } => {
                for &j in items {
                    if j > i {
                        if let Some(pair) = accepts(proxy, &self.proxies[j]) {
                            pairs.push(pair);
                        }
                    }
                }
            }
            BvhNode::Internal { left, right, .. } => {
                self.query_node(i, left, pairs);
                self.query_node(i, right, pairs);
            }
        }
    }
}

impl BroadPhase for BvhBroadPhase {
    fn update(&mut self, proxies: &[Proxy]) {
        self.proxies.clear();
        self.proxies.extend_from_slice(proxies);
        self.rebuild();
    }

    fn remove(&mut self, id: BodyId) {
        let before = self.proxies.len();
        self.proxies.retain(|p| p.id != id);
        if self.proxies.len() != before {
            self.rebuild();
        }
    }

    fn query_pairs(&self) -> Vec<BodyPair> {
        let mut pairs = Vec::new();

        if let Some(root) = &self.root {
            for i in 0..self.proxies.len() {
                if self.proxies[i].aabb.is_bounded() {
                    self.query_node(i, root, &mut pairs);
                }
            }
        }

        // Unbounded proxies against everything else.
        for (k, &u) in self.unbounded.iter().enumerate() {
            let plane = &self.proxies[u];
            for (j, other) in self.proxies.iter().enumerate() {
                let already_seen = self.unbounded[..k].contains(&j);
                if j == u || already_seen {
                    continue;
                }
                if let Some(pair) = accepts(plane, other) {
                    pairs.push(pair);
                }
            }
        }

        finish(pairs)
    }

    fn len(&self) -> usize {
        self.proxies.len()
    }
}

/// Build a BVH node recursively using SAH.
fn build_node(items: &mut [(usize, Aabb, tumble_math::Vec3)]) -> BvhNode {
    let mut bounds = Aabb::empty();
    for (_, aabb, _) in items.iter() {
        bounds.merge(aabb);
    }

    if items.len() <= MAX_LEAF_SIZE {
        return BvhNode::Leaf {
            aabb: bounds,
            items: items.iter().map(|(i, _, _)| *i).collect(),
        };
    }

    let mut mid = match find_best_split(items, &bounds) {
        Some((axis, pos)) => partition(items, axis, pos),
        None => 0,
    };

    // Fallback if partition fails: split in the middle.
    if mid == 0 || mid == items.len() {
        mid = items.len() / 2;
    }

    let (left, right) = items.split_at_mut(mid);
    BvhNode::Internal {
        aabb: bounds,
        left: Box::new(build_node(left)),
        right: Box::new(build_node(right)),
    }
}

/// Find the best split axis and position using SAH over centroid buckets.
fn find_best_split(
    items: &[(usize, Aabb, tumble_math::Vec3)],
    bounds: &Aabb,
) -> Option<(usize, f64)> {
    let mut centroid_bounds = Aabb::empty();
    for (_, _, c) in items {
        centroid_bounds.include_point(c);
    }
    let extent = centroid_bounds.extent();
    let total_area = bounds.half_area();
    if total_area <= 0.0 {
        return None;
    }

    let mut best: Option<(f64, usize, f64)> = None;

    for axis in 0..3 {
        let axis_extent = extent[axis];
        if axis_extent < 1e-10 {
            continue;
        }
        let axis_min = centroid_bounds.min[axis];

        let mut bucket_counts = [0usize; NUM_BUCKETS];
        let mut bucket_bounds = [Aabb::empty(); NUM_BUCKETS];

        for (_, aabb, centroid) in items {
            let b = ((centroid[axis] - axis_min) / axis_extent * NUM_BUCKETS as f64) as usize;
            let b = b.min(NUM_BUCKETS - 1);
            bucket_counts[b] += 1;
            bucket_bounds[b].merge(aabb);
        }

        for split in 1..NUM_BUCKETS {
            let mut left_count = 0;
            let mut left_bounds = Aabb::empty();
            for i in 0..split {
                left_count += bucket_counts[i];
                if bucket_counts[i] > 0 {
                    left_bounds.merge(&bucket_bounds[i]);
                }
            }

            let mut right_count = 0;
            let mut right_bounds = Aabb::empty();
            for i in split..NUM_BUCKETS {
                right_count += bucket_counts[i];
                if bucket_counts[i] > 0 {
                    right_bounds.merge(&bucket_bounds[i]);
                }
            }

            if left_count == 0 || right_count == 0 {
                continue;
            }

            // SAH cost: traversal + P(left) * N_left + P(right) * N_right
            let cost = 0.125
                + left_bounds.half_area() / total_area * left_count as f64
                + right_bounds.half_area() / total_area * right_count as f64;

            if best.map_or(true, |(c, _, _)| cost < c) {
                let pos = axis_min + (split as f64 / NUM_BUCKETS as f64) * axis_extent;
                best = Some((cost, axis, pos));
            }
        }
    }

    best.map(|(_, axis, pos)| (axis, pos))
}

/// Partition items by centroid along an axis.
fn partition(items: &mut [(usize, Aabb, tumble_math::Vec3)], axis: usize, pos: f64) -> usize {
    let mut left = 0;
    let mut right = items.len();

    while left < right {
        if items[left].2[axis] < pos {
            left += 1;
        } else {
            right -= 1;
            items.swap(left, right);
        }
    }

    left
}
