use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::EdgesSection;

use super::SimState;

const SAME_CLUSTER_PREFERENCE: f64 = 0.75;

pub struct Rebalancer {
    interval: Duration,
    cull_percentile: f32,
    last_sweep: Instant,
}

impl Rebalancer {
    pub fn new(edges: &EdgesSection) -> Self {
        Self {
            interval: Duration::from_millis(edges.rebalance_interval_ms),
            cull_percentile: edges.cull_percentile,
            last_sweep: Instant::now(),
        }
    }

    pub fn set_config(&mut self, edges: &EdgesSection) {
        self.interval = Duration::from_millis(edges.rebalance_interval_ms);
        self.cull_percentile = edges.cull_percentile;
    }

    pub fn run_if_due(
        &mut self,
        state: &mut SimState,
        max_links: usize,
        rng: &mut impl Rng,
        now: Instant,
    ) -> bool {
        if now.duration_since(self.last_sweep) < self.interval {
            return false;
        }
        self.last_sweep = now;
        sweep(state, self.cull_percentile, max_links, rng)
    }
}

fn degree_map(state: &SimState) -> HashMap<u32, u32> {
    let mut degrees = HashMap::with_capacity(state.nodes.len());
    for link in &state.links {
        *degrees.entry(link.a).or_insert(0) += 1;
        *degrees.entry(link.b).or_insert(0) += 1;
    }
    degrees
}

fn cull_candidate(state: &SimState, cull_percentile: f32) -> Option<usize> {
    let degrees = degree_map(state);

    let mut order = (0..state.links.len()).collect::<Vec<_>>();
    order.sort_by_key(|&index| state.links[index].utilized);

    let fraction = cull_percentile.clamp(0.0, 1.0);
    let window = ((order.len() as f32 * fraction).ceil() as usize).clamp(1, order.len());

    order[..window].iter().copied().find(|&index| {
        let link = &state.links[index];
        degrees.get(&link.a).copied().unwrap_or(0) > 1
            && degrees.get(&link.b).copied().unwrap_or(0) > 1
    })
}

fn grow_replacement(state: &mut SimState, max_links: usize, rng: &mut impl Rng) -> bool {
    if state.links.len() >= max_links || state.nodes.len() < 2 {
        return false;
    }

    let source = &state.nodes[rng.gen_range(0..state.nodes.len())];
    let source_id = source.id;
    let source_cluster = source.cluster;

    let candidates = state
        .nodes
        .iter()
        .filter(|node| node.id != source_id && !state.contains_link(source_id, node.id))
        .map(|node| (node.id, node.cluster))
        .collect::<Vec<_>>();
    if candidates.is_empty() {
        return false;
    }

    let same_cluster = candidates
        .iter()
        .filter(|(_, cluster)| cluster.is_some() && *cluster == source_cluster)
        .map(|(id, _)| *id)
        .collect::<Vec<_>>();

    let target = if !same_cluster.is_empty() && rng.gen_bool(SAME_CLUSTER_PREFERENCE) {
        same_cluster[rng.gen_range(0..same_cluster.len())]
    } else {
        candidates[rng.gen_range(0..candidates.len())].0
    };

    state.try_link(source_id, target)
}

pub fn sweep(
    state: &mut SimState,
    cull_percentile: f32,
    max_links: usize,
    rng: &mut impl Rng,
) -> bool {
    if state.links.len() < 2 || state.nodes.len() < 2 {
        return false;
    }

    let Some(candidate) = cull_candidate(state, cull_percentile) else {
        return false;
    };

    state.remove_link(candidate);
    grow_replacement(state, max_links, rng);
    true
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::app::sim::vec3;
    use crate::util::EdgeKey;

    fn ring_of_clusters(clusters: u32, per_cluster: u32) -> SimState {
        let mut state = SimState::new();
        for cluster in 0..clusters {
            let base = cluster * per_cluster;
            for member in 0..per_cluster {
                let index = base + member;
                state.push_node(
                    vec3(index as f32 * 3.0, cluster as f32 * 5.0, 0.0),
                    1.0,
                    Some(cluster),
                );
            }
            for member in 0..per_cluster {
                let from = base + member;
                let to = base + ((member + 1) % per_cluster);
                state.try_link(from, to);
            }
        }
        for cluster in 0..clusters {
            let from = cluster * per_cluster;
            let to = ((cluster + 1) % clusters) * per_cluster;
            state.try_link(from, to);
        }
        state
    }

    fn assert_invariants(state: &SimState, max_links: usize) {
        assert!(state.links.len() <= max_links);
        let mut seen = HashSet::new();
        for link in &state.links {
            assert_ne!(link.a, link.b);
            assert!(seen.insert(EdgeKey::new(link.a, link.b)));
            assert!(state.node_index(link.a).is_some());
            assert!(state.node_index(link.b).is_some());
        }
    }

    #[test]
    fn sweeps_never_isolate_a_connected_node() {
        let mut state = ring_of_clusters(10, 10);
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let max_links = 150;

        for _ in 0..200 {
            sweep(&mut state, 0.5, max_links, &mut rng);
            assert_invariants(&state, max_links);

            let degrees = degree_map(&state);
            for node in &state.nodes {
                assert!(
                    degrees.get(&node.id).copied().unwrap_or(0) >= 1,
                    "node {} was isolated",
                    node.id
                );
            }
        }
    }

    #[test]
    fn sweep_skips_tiny_graphs() {
        let mut state = SimState::new();
        let a = state.push_node(vec3(0.0, 0.0, 0.0), 1.0, None);
        let b = state.push_node(vec3(1.0, 0.0, 0.0), 1.0, None);
        state.try_link(a, b);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        assert!(!sweep(&mut state, 0.5, 10, &mut rng));
        assert_eq!(state.links.len(), 1);
    }

    #[test]
    fn sweep_prefers_low_utilization_edges() {
        let mut state = ring_of_clusters(2, 6);
        for link in state.links.iter_mut().skip(1) {
            link.utilized = 50;
        }
        let key = EdgeKey::new(state.links[0].a, state.links[0].b);
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let no_regrow = state.links.len() - 1;
        assert!(sweep(&mut state, 0.5, no_regrow, &mut rng));
        assert!(
            !state
                .links
                .iter()
                .any(|link| EdgeKey::new(link.a, link.b) == key)
        );
    }

    #[test]
    fn equal_seeds_produce_equal_edge_set_sizes() {
        let mut left = ring_of_clusters(10, 10);
        let mut right = ring_of_clusters(10, 10);
        let mut rng_left = ChaCha8Rng::seed_from_u64(40);
        let mut rng_right = ChaCha8Rng::seed_from_u64(41);
        let max_links = 160;

        for _ in 0..120 {
            sweep(&mut left, 0.5, max_links, &mut rng_left);
            sweep(&mut right, 0.5, max_links, &mut rng_right);
        }

        assert_eq!(left.links.len(), right.links.len());
        assert_invariants(&left, max_links);
        assert_invariants(&right, max_links);
    }

    #[test]
    fn cadence_gate_defers_until_interval_elapses() {
        let edges = EdgesSection::default();
        let mut rebalancer = Rebalancer::new(&edges);
        let mut state = ring_of_clusters(3, 4);
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let immediately = Instant::now();
        assert!(!rebalancer.run_if_due(&mut state, 100, &mut rng, immediately));

        let later = immediately + Duration::from_millis(edges.rebalance_interval_ms + 50);
        assert!(rebalancer.run_if_due(&mut state, 100, &mut rng, later));
    }
}
