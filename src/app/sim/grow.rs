use rand::Rng;

use crate::config::{TierCaps, Tunables};

use super::{SimState, Vec3, cluster_centers, vec3};

const MIN_BATCH: usize = 4;
const MAX_BATCH: usize = 7;

fn jitter(rng: &mut impl Rng, spread: f32) -> Vec3 {
    vec3(
        rng.gen_range(-spread..=spread),
        rng.gen_range(-spread..=spread),
        rng.gen_range(-spread * 0.6..=spread * 0.6),
    )
}

fn node_size(rng: &mut impl Rng, tunables: &Tunables) -> f32 {
    let min = tunables.nodes.min_size.min(tunables.nodes.max_size);
    let max = tunables.nodes.min_size.max(tunables.nodes.max_size);
    rng.gen_range(min..=max)
}

fn attach_distance(tunables: &Tunables) -> f32 {
    tunables.simulation.center_radius.max(30.0) * 1.25
}

pub fn seed_graph(
    state: &mut SimState,
    tunables: &Tunables,
    caps: TierCaps,
    rng: &mut impl Rng,
) {
    let centers = cluster_centers(
        tunables.simulation.center_count,
        tunables.simulation.center_radius,
    );
    let spread = (tunables.simulation.center_radius * 0.45).max(12.0);
    let target = caps.target_nodes.min(caps.max_nodes);

    let mut members: Vec<Vec<u32>> = vec![Vec::new(); centers.len()];
    for index in 0..target {
        let slot = index % centers.len();
        let pos = centers[slot] + jitter(rng, spread);
        let size = node_size(rng, tunables);
        let id = state.push_node(pos, size, Some(slot as u32));
        members[slot].push(id);
    }

    for cluster in &members {
        if cluster.len() < 2 {
            continue;
        }
        for pair in cluster.windows(2) {
            if state.links.len() >= caps.max_links {
                return;
            }
            state.try_link(pair[0], pair[1]);
        }
        if state.links.len() < caps.max_links && cluster.len() > 2 {
            state.try_link(cluster[cluster.len() - 1], cluster[0]);
        }

        let chords = cluster.len() / 3;
        for _ in 0..chords {
            if state.links.len() >= caps.max_links {
                return;
            }
            let a = cluster[rng.gen_range(0..cluster.len())];
            let b = cluster[rng.gen_range(0..cluster.len())];
            state.try_link(a, b);
        }
    }

    for slot in 0..members.len() {
        if state.links.len() >= caps.max_links {
            return;
        }
        let next = (slot + 1) % members.len();
        if let (Some(&from), Some(&to)) = (members[slot].first(), members[next].first()) {
            state.try_link(from, to);
        }
    }

    let extra_target = (target + (target / 4)).min(caps.max_links);
    let mut attempts = 0;
    while state.links.len() < extra_target && attempts < target * 4 {
        attempts += 1;
        if state.nodes.len() < 2 {
            break;
        }
        let a = state.nodes[rng.gen_range(0..state.nodes.len())].id;
        let b = state.nodes[rng.gen_range(0..state.nodes.len())].id;
        state.try_link(a, b);
    }
}

pub fn add_cluster_batch(
    state: &mut SimState,
    origin: Vec3,
    tunables: &Tunables,
    caps: TierCaps,
    rng: &mut impl Rng,
) -> bool {
    let headroom = caps.max_nodes.saturating_sub(state.nodes.len());
    if headroom == 0 {
        return false;
    }
    let batch = rng.gen_range(MIN_BATCH..=MAX_BATCH).min(headroom);
    if batch == 0 {
        return false;
    }

    let threshold_sq = attach_distance(tunables).powi(2);
    let nearest = state
        .nodes
        .iter()
        .map(|node| (node.id, node.pos.distance_sq(origin)))
        .min_by(|left, right| left.1.total_cmp(&right.1))
        .filter(|&(_, distance_sq)| distance_sq <= threshold_sq)
        .map(|(id, _)| id);

    let cluster = state.allocate_cluster();
    let spread = (tunables.simulation.center_radius * 0.3).max(8.0);
    let mut added = Vec::with_capacity(batch);
    for _ in 0..batch {
        let pos = origin + jitter(rng, spread);
        let size = node_size(rng, tunables);
        added.push(state.push_node(pos, size, Some(cluster)));
    }

    for pair in added.windows(2) {
        if state.links.len() >= caps.max_links {
            break;
        }
        state.try_link(pair[0], pair[1]);
    }
    if added.len() > 2 && state.links.len() < caps.max_links {
        state.try_link(added[added.len() - 1], added[0]);
    }

    if let Some(anchor) = nearest
        && state.links.len() < caps.max_links
        && let Some(&first) = added.first()
    {
        state.try_link(first, anchor);
    }

    true
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::config::TierCaps;
    use crate::util::EdgeKey;

    fn caps(max_nodes: usize, max_links: usize, target_nodes: usize) -> TierCaps {
        TierCaps {
            max_nodes,
            max_links,
            target_nodes,
        }
    }

    #[test]
    fn seeded_graph_respects_caps_and_invariants() {
        let tunables = Tunables::default();
        let mut state = SimState::new();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        seed_graph(&mut state, &tunables, caps(96, 120, 80), &mut rng);

        assert_eq!(state.nodes.len(), 80);
        assert!(state.links.len() <= 120);
        assert!(!state.links.is_empty());

        let mut seen = std::collections::HashSet::new();
        for link in &state.links {
            assert_ne!(link.a, link.b);
            assert!(seen.insert(EdgeKey::new(link.a, link.b)));
            assert!(state.node_index(link.a).is_some());
            assert!(state.node_index(link.b).is_some());
        }
    }

    #[test]
    fn cluster_batch_connects_to_nearby_anchor() {
        let tunables = Tunables::default();
        let mut state = SimState::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let anchor = state.push_node(vec3(4.0, 0.0, 0.0), 1.0, Some(0));

        let changed = add_cluster_batch(
            &mut state,
            vec3(10.0, 0.0, 0.0),
            &tunables,
            caps(64, 64, 32),
            &mut rng,
        );

        assert!(changed);
        assert!(state.nodes.len() >= 1 + MIN_BATCH);
        assert!(
            state
                .links
                .iter()
                .any(|link| link.a == anchor || link.b == anchor)
        );
    }

    #[test]
    fn cluster_batch_is_capped_by_node_ceiling() {
        let tunables = Tunables::default();
        let mut state = SimState::new();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for index in 0..6 {
            state.push_node(vec3(index as f32, 0.0, 0.0), 1.0, Some(0));
        }

        let changed = add_cluster_batch(
            &mut state,
            Vec3::ZERO,
            &tunables,
            caps(6, 12, 6),
            &mut rng,
        );

        assert!(!changed);
        assert_eq!(state.nodes.len(), 6);
    }
}
