use std::collections::HashMap;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::PacketsSection;
use crate::util::EdgeKey;

use super::backend::{ActiveLink, MirrorNode};
use super::sim::{Vec3, vec3};

#[derive(Clone, Copy, Debug)]
pub struct Packet {
    pub source: u32,
    pub target: u32,
    pub progress: f32,
    pub speed: f32,
    pub intensity: f32,
    pub pos: Vec3,
    pub dir: Vec3,
}

#[derive(Clone, Copy, Debug)]
pub struct TrailPoint {
    pub pos: Vec3,
    pub dir: Vec3,
    pub age: f32,
    pub max_age: f32,
}

pub struct PacketRouter {
    packets: Vec<Packet>,
    trails: Vec<TrailPoint>,
    utilized: Vec<EdgeKey>,
    index_scratch: HashMap<u32, usize>,
    rng: ChaCha8Rng,
}

impl PacketRouter {
    pub fn new(seed: u64) -> Self {
        Self {
            packets: Vec::new(),
            trails: Vec::new(),
            utilized: Vec::new(),
            index_scratch: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn trails(&self) -> &[TrailPoint] {
        &self.trails
    }

    pub fn interpolate(source: Vec3, target: Vec3, progress: f32) -> Vec3 {
        source.lerp(target, progress.clamp(0.0, 1.0))
    }

    fn spawn_one(&mut self, links: &[ActiveLink], config: &PacketsSection) -> bool {
        if links.is_empty() || self.packets.len() >= config.max_packets {
            return false;
        }

        let link = links[self.rng.gen_range(0..links.len())];
        let (source, target) = if self.rng.gen_bool(0.5) {
            (link.a, link.b)
        } else {
            (link.b, link.a)
        };
        let min_speed = config.min_speed.min(config.max_speed);
        let max_speed = config.min_speed.max(config.max_speed);

        self.packets.push(Packet {
            source,
            target,
            progress: 0.0,
            speed: self.rng.gen_range(min_speed..=max_speed),
            intensity: self.rng.gen_range(0.55..=1.0),
            pos: Vec3::ZERO,
            dir: vec3(1.0, 0.0, 0.0),
        });
        true
    }

    fn reroute_target(&mut self, links: &[ActiveLink], from: u32) -> Option<u32> {
        let incident = links
            .iter()
            .filter_map(|link| {
                if link.a == from {
                    Some(link.b)
                } else if link.b == from {
                    Some(link.a)
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();
        if incident.is_empty() {
            return None;
        }
        Some(incident[self.rng.gen_range(0..incident.len())])
    }

    pub fn advance(
        &mut self,
        nodes: &[MirrorNode],
        links: &[ActiveLink],
        config: &PacketsSection,
        dt: f32,
    ) -> &[EdgeKey] {
        self.utilized.clear();

        self.index_scratch.clear();
        for (index, node) in nodes.iter().enumerate() {
            self.index_scratch.insert(node.id, index);
        }

        while self.packets.len() < config.min_packets.min(config.max_packets) {
            if !self.spawn_one(links, config) {
                break;
            }
        }
        if self.rng.gen_bool(config.spawn_probability.clamp(0.0, 1.0) as f64) {
            self.spawn_one(links, config);
        }

        let step_scale = (dt * 60.0).clamp(0.25, 3.0);
        let mut index = 0;
        while index < self.packets.len() {
            let packet = self.packets[index];
            let source_pos = self
                .index_scratch
                .get(&packet.source)
                .and_then(|&slot| nodes.get(slot))
                .map(|node| node.pos);
            let target_pos = self
                .index_scratch
                .get(&packet.target)
                .and_then(|&slot| nodes.get(slot))
                .map(|node| node.pos);
            let (Some(source_pos), Some(target_pos)) = (source_pos, target_pos) else {
                self.packets.swap_remove(index);
                continue;
            };

            let mut progress = packet.progress + (packet.speed * step_scale);
            if progress >= 1.0 {
                self.utilized
                    .push(EdgeKey::new(packet.source, packet.target));

                let reroute = self
                    .rng
                    .gen_bool(config.reroute_probability.clamp(0.0, 1.0) as f64);
                let next_target = if reroute {
                    self.reroute_target(links, packet.target)
                } else {
                    None
                };

                let Some(next_target) = next_target else {
                    self.packets.swap_remove(index);
                    continue;
                };

                let packet = &mut self.packets[index];
                packet.source = packet.target;
                packet.target = next_target;
                progress = 0.0;
            }

            let (source, target) = {
                let packet = &self.packets[index];
                (packet.source, packet.target)
            };
            let from = self
                .index_scratch
                .get(&source)
                .and_then(|&slot| nodes.get(slot))
                .map(|node| node.pos)
                .unwrap_or(source_pos);
            let to = self
                .index_scratch
                .get(&target)
                .and_then(|&slot| nodes.get(slot))
                .map(|node| node.pos)
                .unwrap_or(target_pos);

            let packet = &mut self.packets[index];
            packet.progress = progress;
            packet.pos = Self::interpolate(from, to, progress);
            packet.dir = (to - from).normalized_or(vec3(1.0, 0.0, 0.0));
            index += 1;
        }

        for packet_index in 0..self.packets.len() {
            if self.trails.len() >= config.max_trail_points {
                break;
            }
            let packet = self.packets[packet_index];
            let min_age = config.trail_min_age.min(config.trail_max_age).max(0.05);
            let max_age = config.trail_min_age.max(config.trail_max_age).max(min_age);
            self.trails.push(TrailPoint {
                pos: packet.pos,
                dir: packet.dir,
                age: 0.0,
                max_age: self.rng.gen_range(min_age..=max_age),
            });
        }

        for trail in &mut self.trails {
            trail.age += dt;
        }
        self.trails.retain(|trail| trail.age < trail.max_age);

        &self.utilized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PacketsSection;

    fn mirror(id: u32, x: f32) -> MirrorNode {
        MirrorNode {
            id,
            pos: vec3(x, 0.0, 0.0),
            size: 1.5,
            cluster: Some(0),
        }
    }

    fn line_graph(count: u32) -> (Vec<MirrorNode>, Vec<ActiveLink>) {
        let nodes = (0..count).map(|id| mirror(id, id as f32 * 10.0)).collect();
        let links = (0..count - 1)
            .map(|id| ActiveLink { a: id, b: id + 1 })
            .collect();
        (nodes, links)
    }

    #[test]
    fn interpolation_matches_endpoints() {
        let source = vec3(2.0, -1.0, 4.0);
        let target = vec3(-6.0, 3.0, 0.0);

        assert_eq!(PacketRouter::interpolate(source, target, 0.0), source);
        let near_arrival = PacketRouter::interpolate(source, target, 0.999);
        assert!((near_arrival - target).length() < 0.05);
    }

    #[test]
    fn router_fills_to_min_floor_and_respects_cap() {
        let (nodes, links) = line_graph(8);
        let config = PacketsSection {
            min_packets: 5,
            max_packets: 5,
            spawn_probability: 1.0,
            ..PacketsSection::default()
        };
        let mut router = PacketRouter::new(3);

        router.advance(&nodes, &links, &config, 1.0 / 60.0);
        assert_eq!(router.packets().len(), 5);

        for _ in 0..10 {
            router.advance(&nodes, &links, &config, 1.0 / 60.0);
            assert!(router.packets().len() <= 5);
        }
    }

    #[test]
    fn empty_link_set_spawns_nothing() {
        let nodes = vec![mirror(0, 0.0)];
        let config = PacketsSection::default();
        let mut router = PacketRouter::new(3);

        router.advance(&nodes, &[], &config, 1.0 / 60.0);
        assert!(router.packets().is_empty());
    }

    #[test]
    fn arrivals_report_canonical_keys_and_never_orphan() {
        let (nodes, links) = line_graph(6);
        let config = PacketsSection {
            min_packets: 4,
            max_packets: 6,
            min_speed: 0.6,
            max_speed: 0.9,
            reroute_probability: 0.5,
            ..PacketsSection::default()
        };
        let mut router = PacketRouter::new(11);

        let mut total_utilized = 0;
        for _ in 0..60 {
            let utilized = router.advance(&nodes, &links, &config, 1.0 / 60.0);
            total_utilized += utilized.len();
            for key in utilized {
                assert!(
                    links
                        .iter()
                        .any(|link| EdgeKey::new(link.a, link.b) == *key)
                );
            }
            for packet in router.packets() {
                assert!(
                    links.iter().any(|link| {
                        EdgeKey::new(link.a, link.b)
                            == EdgeKey::new(packet.source, packet.target)
                    }),
                    "packet references a link that is not active"
                );
            }
        }
        assert!(total_utilized > 0);
    }

    #[test]
    fn dangling_endpoints_remove_the_packet() {
        let (nodes, links) = line_graph(4);
        let config = PacketsSection {
            min_packets: 3,
            max_packets: 3,
            ..PacketsSection::default()
        };
        let mut router = PacketRouter::new(5);
        router.advance(&nodes, &links, &config, 1.0 / 60.0);
        assert_eq!(router.packets().len(), 3);

        let orphan_links = vec![ActiveLink { a: 90, b: 91 }];
        router.advance(&nodes[..1], &orphan_links, &config, 1.0 / 60.0);
        assert!(router.packets().is_empty());
    }

    #[test]
    fn trail_points_age_out_and_stay_capped() {
        let (nodes, links) = line_graph(6);
        let config = PacketsSection {
            min_packets: 4,
            max_packets: 4,
            max_trail_points: 10,
            trail_min_age: 0.1,
            trail_max_age: 0.2,
            ..PacketsSection::default()
        };
        let mut router = PacketRouter::new(7);

        for _ in 0..30 {
            router.advance(&nodes, &links, &config, 1.0 / 60.0);
            assert!(router.trails().len() <= 10);
        }
        assert!(!router.trails().is_empty());

        router.advance(&nodes, &links, &config, 5.0);
        router.advance(&nodes, &links, &config, 5.0);
        assert!(router.trails().len() <= config.min_packets * 2);
    }
}
