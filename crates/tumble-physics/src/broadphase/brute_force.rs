//! All-pairs broadphase.

use crate::body::BodyId;

use super::{accepts, finish, BodyPair, BroadPhase, Proxy};

/// Tests every proxy against every other one.
#[derive(Debug, Clone, Default)]
pub struct BruteForceBroadPhase {
    proxies: Vec<Proxy>,
}

impl BruteForceBroadPhase {
    /// Create an empty broadphase.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadPhase for BruteForceBroadPhase {
    fn update(&mut self, proxies: &[Proxy]) {
        self.proxies.clear();
        self.proxies.extend_from_slice(proxies);
    }

    fn remove(&mut self, id: BodyId) {
        self.proxies.retain(|p| p.id != id);
    }

    fn query_pairs(&self) -> Vec<BodyPair> {
        let mut pairs = Vec::new();
        for (i, a) in self.proxies.iter().enumerate() {
            for b in &self.proxies[i + 1..] {
                if let Some(pair) = accepts(a, b) {
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
