use std::collections::HashMap;

use super::{SimLink, SimNode, Vec3, center_slot, vec3};

const SOFTENING: f32 = 18.0;

fn separation_direction(delta: Vec3, a: usize, b: usize) -> Vec3 {
    let length = delta.length();
    if length > 0.0001 {
        delta / length
    } else {
        let angle = ((a as f32) * 0.618_034 + (b as f32) * 0.414_214) * std::f32::consts::TAU;
        vec3(angle.cos(), angle.sin(), (angle * 0.5).sin() * 0.4).normalized_or(vec3(1.0, 0.0, 0.0))
    }
}

pub(super) fn accumulate_repulsion(nodes: &[SimNode], strength: f32, forces: &mut [Vec3]) {
    for first in 0..nodes.len() {
        for second in (first + 1)..nodes.len() {
            let delta = nodes[first].pos - nodes[second].pos;
            let distance_sq = delta.length_sq();
            let direction = separation_direction(delta, first, second);
            let push = direction * (strength / (distance_sq + SOFTENING));
            forces[first] += push;
            forces[second] -= push;
        }
    }
}

pub(super) fn accumulate_link_springs(
    nodes: &[SimNode],
    links: &[SimLink],
    index_by_id: &HashMap<u32, usize>,
    rest_distance: f32,
    strength: f32,
    forces: &mut [Vec3],
) {
    for link in links {
        let Some(&from) = index_by_id.get(&link.a) else {
            continue;
        };
        let Some(&to) = index_by_id.get(&link.b) else {
            continue;
        };
        if from == to || from >= nodes.len() || to >= nodes.len() {
            continue;
        }

        let delta = nodes[from].pos - nodes[to].pos;
        let distance = delta.length();
        if distance <= 0.0001 {
            continue;
        }
        let direction = delta / distance;
        let correction = direction * ((distance - rest_distance) * strength);

        forces[from] -= correction;
        forces[to] += correction;
    }
}

pub(super) fn accumulate_center_pull(
    nodes: &[SimNode],
    centers: &[Vec3],
    strength: f32,
    forces: &mut [Vec3],
) {
    for (index, node) in nodes.iter().enumerate() {
        let center = centers[center_slot(node, centers.len())];
        forces[index] += (center - node.pos) * strength;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::sim::SimState;

    #[test]
    fn repulsion_pushes_pairs_apart() {
        let mut state = SimState::new();
        state.push_node(vec3(-1.0, 0.0, 0.0), 1.0, None);
        state.push_node(vec3(1.0, 0.0, 0.0), 1.0, None);
        let mut forces = vec![Vec3::ZERO; 2];

        accumulate_repulsion(&state.nodes, 10.0, &mut forces);

        assert!(forces[0].x < 0.0);
        assert!(forces[1].x > 0.0);
    }

    #[test]
    fn springs_pull_stretched_links_together() {
        let mut state = SimState::new();
        let a = state.push_node(vec3(-40.0, 0.0, 0.0), 1.0, None);
        let b = state.push_node(vec3(40.0, 0.0, 0.0), 1.0, None);
        state.try_link(a, b);
        let mut forces = vec![Vec3::ZERO; 2];

        accumulate_link_springs(
            &state.nodes,
            &state.links,
            state.index_by_id(),
            34.0,
            0.1,
            &mut forces,
        );

        assert!(forces[0].x > 0.0);
        assert!(forces[1].x < 0.0);
    }

    #[test]
    fn dangling_link_endpoints_are_skipped() {
        let mut state = SimState::new();
        let a = state.push_node(vec3(-1.0, 0.0, 0.0), 1.0, None);
        let b = state.push_node(vec3(1.0, 0.0, 0.0), 1.0, None);
        state.try_link(a, b);
        state.links[0].b = 99;
        let mut forces = vec![Vec3::ZERO; 2];

        accumulate_link_springs(
            &state.nodes,
            &state.links,
            state.index_by_id(),
            34.0,
            0.1,
            &mut forces,
        );

        assert_eq!(forces[0], Vec3::ZERO);
        assert_eq!(forces[1], Vec3::ZERO);
    }

    #[test]
    fn coincident_nodes_still_separate() {
        let mut state = SimState::new();
        state.push_node(Vec3::ZERO, 1.0, None);
        state.push_node(Vec3::ZERO, 1.0, None);
        let mut forces = vec![Vec3::ZERO; 2];

        accumulate_repulsion(&state.nodes, 10.0, &mut forces);

        assert!(forces[0].length_sq() > 0.0);
        assert!((forces[0] + forces[1]).length_sq() < 0.0001);
    }
}
