use std::collections::HashMap;

use crate::config::{PacketsSection, TierCaps};

use super::backend::{ActiveLink, MirrorNode};
use super::packets::PacketRouter;

const DEPTH_FADE_RANGE: f32 = 120.0;
const MIN_DEPTH_OPACITY: f32 = 0.3;

fn depth_opacity(z: f32) -> f32 {
    let normalized = 0.5 - (z / (DEPTH_FADE_RANGE * 2.0));
    (MIN_DEPTH_OPACITY + (normalized * (1.0 - MIN_DEPTH_OPACITY))).clamp(MIN_DEPTH_OPACITY, 1.0)
}

pub struct RenderBuffers {
    pub node_positions: Vec<f32>,
    pub node_sizes: Vec<f32>,
    pub node_opacities: Vec<f32>,
    pub link_positions: Vec<f32>,
    pub link_opacities: Vec<f32>,
    pub packet_positions: Vec<f32>,
    pub packet_sizes: Vec<f32>,
    pub packet_intensities: Vec<f32>,
    pub trail_positions: Vec<f32>,
    pub trail_directions: Vec<f32>,
    pub trail_alphas: Vec<f32>,
    pub trail_sizes: Vec<f32>,
    pub node_count: usize,
    pub link_count: usize,
    pub packet_count: usize,
    pub trail_count: usize,
    max_nodes: usize,
    max_links: usize,
    max_packets: usize,
    max_trails: usize,
    index_scratch: HashMap<u32, usize>,
}

impl RenderBuffers {
    pub fn new(caps: TierCaps, packets: &PacketsSection) -> Self {
        let max_nodes = caps.max_nodes;
        let max_links = caps.max_links;
        let max_packets = packets.max_packets;
        let max_trails = packets.max_trail_points;

        Self {
            node_positions: vec![0.0; max_nodes * 3],
            node_sizes: vec![0.0; max_nodes],
            node_opacities: vec![0.0; max_nodes],
            link_positions: vec![0.0; max_links * 6],
            link_opacities: vec![0.0; max_links],
            packet_positions: vec![0.0; max_packets * 3],
            packet_sizes: vec![0.0; max_packets],
            packet_intensities: vec![0.0; max_packets],
            trail_positions: vec![0.0; max_trails * 3],
            trail_directions: vec![0.0; max_trails * 3],
            trail_alphas: vec![0.0; max_trails],
            trail_sizes: vec![0.0; max_trails],
            node_count: 0,
            link_count: 0,
            packet_count: 0,
            trail_count: 0,
            max_nodes,
            max_links,
            max_packets,
            max_trails,
            index_scratch: HashMap::new(),
        }
    }

    pub fn sync(&mut self, nodes: &[MirrorNode], links: &[ActiveLink], router: &PacketRouter) {
        let previous_nodes = self.node_count;
        let previous_links = self.link_count;
        let previous_packets = self.packet_count;
        let previous_trails = self.trail_count;

        self.index_scratch.clear();
        for (index, node) in nodes.iter().enumerate() {
            self.index_scratch.insert(node.id, index);
        }

        let live_nodes = nodes.len().min(self.max_nodes);
        for (index, node) in nodes.iter().take(live_nodes).enumerate() {
            let base = index * 3;
            self.node_positions[base] = node.pos.x;
            self.node_positions[base + 1] = node.pos.y;
            self.node_positions[base + 2] = node.pos.z;
            self.node_sizes[index] = node.size;
            self.node_opacities[index] = depth_opacity(node.pos.z);
        }
        self.node_count = live_nodes;

        let mut live_links = 0;
        for link in links {
            if live_links >= self.max_links {
                break;
            }
            let from = self
                .index_scratch
                .get(&link.a)
                .and_then(|&slot| nodes.get(slot));
            let to = self
                .index_scratch
                .get(&link.b)
                .and_then(|&slot| nodes.get(slot));
            let (Some(from), Some(to)) = (from, to) else {
                continue;
            };

            let base = live_links * 6;
            self.link_positions[base] = from.pos.x;
            self.link_positions[base + 1] = from.pos.y;
            self.link_positions[base + 2] = from.pos.z;
            self.link_positions[base + 3] = to.pos.x;
            self.link_positions[base + 4] = to.pos.y;
            self.link_positions[base + 5] = to.pos.z;
            self.link_opacities[live_links] =
                depth_opacity(from.pos.z).min(depth_opacity(to.pos.z)) * 0.6;
            live_links += 1;
        }
        self.link_count = live_links;

        let packets = router.packets();
        let live_packets = packets.len().min(self.max_packets);
        for (index, packet) in packets.iter().take(live_packets).enumerate() {
            let base = index * 3;
            self.packet_positions[base] = packet.pos.x;
            self.packet_positions[base + 1] = packet.pos.y;
            self.packet_positions[base + 2] = packet.pos.z;
            self.packet_sizes[index] = 1.2 + (packet.intensity * 1.6);
            self.packet_intensities[index] = packet.intensity * depth_opacity(packet.pos.z);
        }
        self.packet_count = live_packets;

        let trails = router.trails();
        let live_trails = trails.len().min(self.max_trails);
        for (index, trail) in trails.iter().take(live_trails).enumerate() {
            let base = index * 3;
            self.trail_positions[base] = trail.pos.x;
            self.trail_positions[base + 1] = trail.pos.y;
            self.trail_positions[base + 2] = trail.pos.z;
            self.trail_directions[base] = trail.dir.x;
            self.trail_directions[base + 1] = trail.dir.y;
            self.trail_directions[base + 2] = trail.dir.z;
            let life = (1.0 - (trail.age / trail.max_age.max(0.001))).clamp(0.0, 1.0);
            self.trail_alphas[index] = life * depth_opacity(trail.pos.z);
            self.trail_sizes[index] = 0.6 + (life * 0.9);
        }
        self.trail_count = live_trails;

        zero_tail(&mut self.node_positions, self.node_count * 3, previous_nodes * 3);
        zero_tail(&mut self.node_sizes, self.node_count, previous_nodes);
        zero_tail(&mut self.node_opacities, self.node_count, previous_nodes);
        zero_tail(&mut self.link_positions, self.link_count * 6, previous_links * 6);
        zero_tail(&mut self.link_opacities, self.link_count, previous_links);
        zero_tail(
            &mut self.packet_positions,
            self.packet_count * 3,
            previous_packets * 3,
        );
        zero_tail(&mut self.packet_sizes, self.packet_count, previous_packets);
        zero_tail(
            &mut self.packet_intensities,
            self.packet_count,
            previous_packets,
        );
        zero_tail(
            &mut self.trail_positions,
            self.trail_count * 3,
            previous_trails * 3,
        );
        zero_tail(
            &mut self.trail_directions,
            self.trail_count * 3,
            previous_trails * 3,
        );
        zero_tail(&mut self.trail_alphas, self.trail_count, previous_trails);
        zero_tail(&mut self.trail_sizes, self.trail_count, previous_trails);
    }
}

fn zero_tail(buffer: &mut [f32], live: usize, previous: usize) {
    if previous > live {
        let end = previous.min(buffer.len());
        for value in &mut buffer[live..end] {
            *value = 0.0;
        }
    }
}
