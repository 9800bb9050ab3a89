use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Baseline,
    Enhanced,
}

impl Tier {
    pub fn label(self) -> &'static str {
        match self {
            Tier::Baseline => "baseline",
            Tier::Enhanced => "enhanced",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierCaps {
    pub max_nodes: usize,
    pub max_links: usize,
    pub target_nodes: usize,
}

impl TierCaps {
    fn baseline() -> Self {
        Self {
            max_nodes: 96,
            max_links: 180,
            target_nodes: 80,
        }
    }

    fn enhanced() -> Self {
        Self {
            max_nodes: 220,
            max_links: 420,
            target_nodes: 180,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TiersSection {
    pub baseline: TierCaps,
    pub enhanced: TierCaps,
}

impl Default for TiersSection {
    fn default() -> Self {
        Self {
            baseline: TierCaps::baseline(),
            enhanced: TierCaps::enhanced(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NodesSection {
    pub min_size: f32,
    pub max_size: f32,
}

impl Default for NodesSection {
    fn default() -> Self {
        Self {
            min_size: 1.2,
            max_size: 3.4,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EdgesSection {
    pub rebalance_interval_ms: u64,
    pub cull_percentile: f32,
}

impl Default for EdgesSection {
    fn default() -> Self {
        Self {
            rebalance_interval_ms: 1400,
            cull_percentile: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PacketsSection {
    pub max_packets: usize,
    pub min_packets: usize,
    pub spawn_probability: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub reroute_probability: f32,
    pub max_trail_points: usize,
    pub trail_min_age: f32,
    pub trail_max_age: f32,
}

impl Default for PacketsSection {
    fn default() -> Self {
        Self {
            max_packets: 28,
            min_packets: 6,
            spawn_probability: 0.12,
            min_speed: 0.006,
            max_speed: 0.016,
            reroute_probability: 0.9,
            max_trail_points: 600,
            trail_min_age: 0.5,
            trail_max_age: 1.1,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ColorsSection {
    pub background: [u8; 3],
    pub node: [u8; 3],
    pub link: [u8; 3],
    pub packet: [u8; 3],
    pub trail: [u8; 3],
}

impl Default for ColorsSection {
    fn default() -> Self {
        Self {
            background: [10, 12, 18],
            node: [108, 196, 255],
            link: [62, 88, 120],
            packet: [255, 214, 120],
            trail: [214, 164, 255],
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SimulationSection {
    pub repulsion: f32,
    pub link_distance: f32,
    pub link_strength: f32,
    pub center_strength: f32,
    pub center_count: u32,
    pub center_radius: f32,
    pub velocity_decay: f32,
    pub alpha_decay: f32,
    pub alpha_min: f32,
    pub reheat_alpha: f32,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            repulsion: 38.0,
            link_distance: 34.0,
            link_strength: 0.015,
            center_strength: 0.012,
            center_count: 5,
            center_radius: 60.0,
            velocity_decay: 0.88,
            alpha_decay: 0.025,
            alpha_min: 0.02,
            reheat_alpha: 0.35,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Tunables {
    pub tiers: TiersSection,
    pub nodes: NodesSection,
    pub edges: EdgesSection,
    pub packets: PacketsSection,
    pub colors: ColorsSection,
    pub simulation: SimulationSection,
}

impl Tunables {
    pub fn caps(&self, tier: Tier) -> TierCaps {
        match tier {
            Tier::Baseline => self.tiers.baseline,
            Tier::Enhanced => self.tiers.enhanced,
        }
    }

    pub fn apply(&mut self, patch: &TunablesPatch) {
        if let Some(tiers) = &patch.tiers {
            if let Some(caps) = &tiers.baseline {
                merge_caps(&mut self.tiers.baseline, caps);
            }
            if let Some(caps) = &tiers.enhanced {
                merge_caps(&mut self.tiers.enhanced, caps);
            }
        }

        if let Some(nodes) = &patch.nodes {
            overwrite(&mut self.nodes.min_size, nodes.min_size);
            overwrite(&mut self.nodes.max_size, nodes.max_size);
        }

        if let Some(edges) = &patch.edges {
            overwrite(&mut self.edges.rebalance_interval_ms, edges.rebalance_interval_ms);
            overwrite(&mut self.edges.cull_percentile, edges.cull_percentile);
        }

        if let Some(packets) = &patch.packets {
            overwrite(&mut self.packets.max_packets, packets.max_packets);
            overwrite(&mut self.packets.min_packets, packets.min_packets);
            overwrite(&mut self.packets.spawn_probability, packets.spawn_probability);
            overwrite(&mut self.packets.min_speed, packets.min_speed);
            overwrite(&mut self.packets.max_speed, packets.max_speed);
            overwrite(&mut self.packets.reroute_probability, packets.reroute_probability);
            overwrite(&mut self.packets.max_trail_points, packets.max_trail_points);
            overwrite(&mut self.packets.trail_min_age, packets.trail_min_age);
            overwrite(&mut self.packets.trail_max_age, packets.trail_max_age);
        }

        if let Some(colors) = &patch.colors {
            overwrite(&mut self.colors.background, colors.background);
            overwrite(&mut self.colors.node, colors.node);
            overwrite(&mut self.colors.link, colors.link);
            overwrite(&mut self.colors.packet, colors.packet);
            overwrite(&mut self.colors.trail, colors.trail);
        }

        if let Some(simulation) = &patch.simulation {
            overwrite(&mut self.simulation.repulsion, simulation.repulsion);
            overwrite(&mut self.simulation.link_distance, simulation.link_distance);
            overwrite(&mut self.simulation.link_strength, simulation.link_strength);
            overwrite(&mut self.simulation.center_strength, simulation.center_strength);
            overwrite(&mut self.simulation.center_count, simulation.center_count);
            overwrite(&mut self.simulation.center_radius, simulation.center_radius);
            overwrite(&mut self.simulation.velocity_decay, simulation.velocity_decay);
            overwrite(&mut self.simulation.alpha_decay, simulation.alpha_decay);
            overwrite(&mut self.simulation.alpha_min, simulation.alpha_min);
            overwrite(&mut self.simulation.reheat_alpha, simulation.reheat_alpha);
        }
    }
}

fn overwrite<T: Copy>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn merge_caps(caps: &mut TierCaps, patch: &TierCapsPatch) {
    overwrite(&mut caps.max_nodes, patch.max_nodes);
    overwrite(&mut caps.max_links, patch.max_links);
    overwrite(&mut caps.target_nodes, patch.target_nodes);
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TunablesPatch {
    pub tiers: Option<TiersPatch>,
    pub nodes: Option<NodesPatch>,
    pub edges: Option<EdgesPatch>,
    pub packets: Option<PacketsPatch>,
    pub colors: Option<ColorsPatch>,
    pub simulation: Option<SimulationPatch>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TiersPatch {
    pub baseline: Option<TierCapsPatch>,
    pub enhanced: Option<TierCapsPatch>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TierCapsPatch {
    pub max_nodes: Option<usize>,
    pub max_links: Option<usize>,
    pub target_nodes: Option<usize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodesPatch {
    pub min_size: Option<f32>,
    pub max_size: Option<f32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EdgesPatch {
    pub rebalance_interval_ms: Option<u64>,
    pub cull_percentile: Option<f32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacketsPatch {
    pub max_packets: Option<usize>,
    pub min_packets: Option<usize>,
    pub spawn_probability: Option<f32>,
    pub min_speed: Option<f32>,
    pub max_speed: Option<f32>,
    pub reroute_probability: Option<f32>,
    pub max_trail_points: Option<usize>,
    pub trail_min_age: Option<f32>,
    pub trail_max_age: Option<f32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorsPatch {
    pub background: Option<[u8; 3]>,
    pub node: Option<[u8; 3]>,
    pub link: Option<[u8; 3]>,
    pub packet: Option<[u8; 3]>,
    pub trail: Option<[u8; 3]>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationPatch {
    pub repulsion: Option<f32>,
    pub link_distance: Option<f32>,
    pub link_strength: Option<f32>,
    pub center_strength: Option<f32>,
    pub center_count: Option<u32>,
    pub center_radius: Option<f32>,
    pub velocity_decay: Option<f32>,
    pub alpha_decay: Option<f32>,
    pub alpha_min: Option<f32>,
    pub reheat_alpha: Option<f32>,
}

pub fn load_patch(path: &Path) -> anyhow::Result<TunablesPatch> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading tunables patch {}", path.display()))?;
    let patch = serde_json::from_str(&raw)
        .with_context(|| format!("parsing tunables patch {}", path.display()))?;
    Ok(patch)
}
