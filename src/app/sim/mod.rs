mod forces;
pub mod grow;
pub mod rebalance;
mod vec3;

use std::collections::HashMap;

use crate::config::SimulationSection;
use crate::util::{EdgeKey, stable_hash};

pub use vec3::{Vec3, vec3};

#[derive(Clone, Debug)]
pub struct SimNode {
    pub id: u32,
    pub pos: Vec3,
    pub vel: Vec3,
    pub size: f32,
    pub cluster: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct SimLink {
    pub a: u32,
    pub b: u32,
    pub utilized: u32,
}

#[derive(Default)]
pub struct SimState {
    pub nodes: Vec<SimNode>,
    pub links: Vec<SimLink>,
    edge_index: HashMap<EdgeKey, usize>,
    index_by_id: HashMap<u32, usize>,
    next_id: u32,
    next_cluster: u32,
}

impl SimState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_node(&mut self, pos: Vec3, size: f32, cluster: Option<u32>) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        if let Some(cluster) = cluster {
            self.next_cluster = self.next_cluster.max(cluster + 1);
        }
        self.index_by_id.insert(id, self.nodes.len());
        self.nodes.push(SimNode {
            id,
            pos,
            vel: Vec3::ZERO,
            size,
            cluster,
        });
        id
    }

    pub fn allocate_cluster(&mut self) -> u32 {
        let cluster = self.next_cluster;
        self.next_cluster += 1;
        cluster
    }

    pub fn node_index(&self, id: u32) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    pub fn contains_link(&self, a: u32, b: u32) -> bool {
        self.edge_index.contains_key(&EdgeKey::new(a, b))
    }

    pub fn try_link(&mut self, a: u32, b: u32) -> bool {
        if a == b || self.contains_link(a, b) {
            return false;
        }
        if self.node_index(a).is_none() || self.node_index(b).is_none() {
            return false;
        }
        self.edge_index.insert(EdgeKey::new(a, b), self.links.len());
        self.links.push(SimLink { a, b, utilized: 0 });
        true
    }

    pub fn remove_link(&mut self, index: usize) {
        if index >= self.links.len() {
            return;
        }
        self.links.swap_remove(index);
        self.rebuild_edge_index();
    }

    pub fn rebuild_edge_index(&mut self) {
        self.edge_index.clear();
        for (index, link) in self.links.iter().enumerate() {
            self.edge_index.insert(EdgeKey::new(link.a, link.b), index);
        }
    }

    pub fn mark_utilized(&mut self, key: EdgeKey) {
        if let Some(&index) = self.edge_index.get(&key)
            && let Some(link) = self.links.get_mut(index)
        {
            link.utilized = link.utilized.saturating_add(1);
        }
    }

    pub(in crate::app) fn index_by_id(&self) -> &HashMap<u32, usize> {
        &self.index_by_id
    }
}

pub fn cluster_centers(count: u32, radius: f32) -> Vec<Vec3> {
    let count = count.max(1);
    if count == 1 || radius <= 0.0 {
        return vec![Vec3::ZERO];
    }

    (0..count)
        .map(|index| {
            let angle = (index as f32 / count as f32) * std::f32::consts::TAU;
            vec3(angle.cos() * radius, angle.sin() * radius, 0.0)
        })
        .collect()
}

pub fn center_slot(node: &SimNode, center_count: usize) -> usize {
    let seed = node.cluster.unwrap_or(node.id);
    (stable_hash(seed as u64) % center_count.max(1) as u64) as usize
}

pub struct SimEngine {
    params: SimulationSection,
    centers: Vec<Vec3>,
    alpha: f32,
    force_scratch: Vec<Vec3>,
}

impl SimEngine {
    pub fn new(params: &SimulationSection) -> Self {
        Self {
            params: *params,
            centers: cluster_centers(params.center_count, params.center_radius),
            alpha: 1.0,
            force_scratch: Vec::new(),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn reheat(&mut self, alpha: f32) {
        self.alpha = self.alpha.max(alpha.clamp(0.0, 1.0));
    }

    pub fn set_forces(&mut self, params: &SimulationSection) {
        self.params = *params;
        self.centers = cluster_centers(params.center_count, params.center_radius);
    }

    pub fn tick(&mut self, state: &mut SimState) {
        let node_count = state.nodes.len();
        if node_count == 0 {
            return;
        }

        self.alpha += (self.params.alpha_min - self.alpha) * self.params.alpha_decay;
        self.alpha = self.alpha.max(self.params.alpha_min);

        self.force_scratch.resize(node_count, Vec3::ZERO);
        self.force_scratch.fill(Vec3::ZERO);

        forces::accumulate_repulsion(
            &state.nodes,
            self.params.repulsion * self.alpha,
            &mut self.force_scratch,
        );
        forces::accumulate_link_springs(
            &state.nodes,
            &state.links,
            state.index_by_id(),
            self.params.link_distance,
            self.params.link_strength * self.alpha,
            &mut self.force_scratch,
        );
        forces::accumulate_center_pull(
            &state.nodes,
            &self.centers,
            self.params.center_strength * self.alpha,
            &mut self.force_scratch,
        );

        for (node, force) in state.nodes.iter_mut().zip(self.force_scratch.iter()) {
            node.vel = (node.vel + *force) * self.params.velocity_decay;
            node.pos += node.vel;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationSection;

    fn two_node_state() -> SimState {
        let mut state = SimState::new();
        let a = state.push_node(vec3(-5.0, 0.0, 0.0), 1.0, Some(0));
        let b = state.push_node(vec3(5.0, 0.0, 0.0), 1.0, Some(1));
        assert!(state.try_link(a, b));
        state
    }

    #[test]
    fn links_reject_self_loops_and_duplicates() {
        let mut state = two_node_state();
        assert!(!state.try_link(0, 0));
        assert!(!state.try_link(0, 1));
        assert!(!state.try_link(1, 0));
        assert_eq!(state.links.len(), 1);
    }

    #[test]
    fn mark_utilized_increments_by_canonical_key() {
        let mut state = two_node_state();
        state.mark_utilized(EdgeKey::new(1, 0));
        state.mark_utilized(EdgeKey::new(0, 1));
        assert_eq!(state.links[0].utilized, 2);
        state.mark_utilized(EdgeKey::new(0, 7));
        assert_eq!(state.links[0].utilized, 2);
    }

    #[test]
    fn center_slot_is_stable_across_ticks() {
        let mut state = two_node_state();
        let before = center_slot(&state.nodes[0], 5);
        let mut engine = SimEngine::new(&SimulationSection::default());
        for _ in 0..32 {
            engine.tick(&mut state);
        }
        assert_eq!(center_slot(&state.nodes[0], 5), before);
    }

    #[test]
    fn single_center_collapses_to_origin() {
        assert_eq!(cluster_centers(1, 60.0), vec![Vec3::ZERO]);
        assert_eq!(cluster_centers(5, 0.0), vec![Vec3::ZERO]);
        assert_eq!(cluster_centers(4, 10.0).len(), 4);
    }

    #[test]
    fn tick_depends_only_on_current_state() {
        let params = SimulationSection::default();
        let mut first = two_node_state();
        let mut second = two_node_state();
        let mut engine_a = SimEngine::new(&params);
        let mut engine_b = SimEngine::new(&params);

        engine_a.tick(&mut first);
        engine_b.tick(&mut second);

        for (left, right) in first.nodes.iter().zip(second.nodes.iter()) {
            assert_eq!(left.pos, right.pos);
            assert_eq!(left.vel, right.vel);
        }
    }

    #[test]
    fn reheat_raises_energy_and_cooling_floors_at_alpha_min() {
        let params = SimulationSection::default();
        let mut engine = SimEngine::new(&params);
        let mut state = two_node_state();
        for _ in 0..600 {
            engine.tick(&mut state);
        }
        assert!(engine.alpha() <= params.alpha_min + 0.01);

        engine.reheat(params.reheat_alpha);
        assert!(engine.alpha() >= params.reheat_alpha);
    }
}
