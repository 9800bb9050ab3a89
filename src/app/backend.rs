use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use log::{debug, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{Tier, TierCaps, Tunables, TunablesPatch};
use crate::util::EdgeKey;

use super::sim::{SimEngine, SimState, Vec3, grow, rebalance::Rebalancer, vec3};
use super::worker::{
    WireLink, WireNode, WorkerReply, WorkerRequest, spawn_worker,
};

const BASELINE_TICK_INTERVAL: Duration = Duration::from_millis(33);
const WORKER_READY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug)]
pub struct MirrorNode {
    pub id: u32,
    pub pos: Vec3,
    pub size: f32,
    pub cluster: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveLink {
    pub a: u32,
    pub b: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendHealth {
    Healthy,
    Lost,
}

pub trait SimulationBackend {
    fn begin_frame(&mut self) -> BackendHealth;
    fn nodes(&self) -> &[MirrorNode];
    fn links(&self) -> &[ActiveLink];
    fn alpha(&self) -> f32;
    fn report_utilized(&mut self, keys: &[EdgeKey]);
    fn request_cluster(&mut self, origin: Vec3);
    fn apply_config(&mut self, patch: &TunablesPatch);
}

fn mirror_from_state(state: &SimState, nodes: &mut Vec<MirrorNode>, links: &mut Vec<ActiveLink>) {
    nodes.clear();
    links.clear();
    for node in &state.nodes {
        nodes.push(MirrorNode {
            id: node.id,
            pos: node.pos,
            size: node.size,
            cluster: node.cluster,
        });
    }
    for link in &state.links {
        links.push(ActiveLink {
            a: link.a,
            b: link.b,
        });
    }
}

pub struct LocalBackend {
    state: SimState,
    engine: SimEngine,
    rebalancer: Rebalancer,
    tunables: Tunables,
    tier: Tier,
    caps: TierCaps,
    rng: ChaCha8Rng,
    last_tick: Instant,
    mirror_nodes: Vec<MirrorNode>,
    mirror_links: Vec<ActiveLink>,
}

impl LocalBackend {
    pub fn from_state(state: SimState, tunables: Tunables, tier: Tier, seed: u64) -> Self {
        let engine = SimEngine::new(&tunables.simulation);
        let rebalancer = Rebalancer::new(&tunables.edges);
        let caps = tunables.caps(tier);
        let mut backend = Self {
            state,
            engine,
            rebalancer,
            tunables,
            tier,
            caps,
            rng: ChaCha8Rng::seed_from_u64(seed),
            last_tick: Instant::now() - BASELINE_TICK_INTERVAL,
            mirror_nodes: Vec::new(),
            mirror_links: Vec::new(),
        };
        mirror_from_state(
            &backend.state,
            &mut backend.mirror_nodes,
            &mut backend.mirror_links,
        );
        backend
    }

    pub fn from_snapshot(
        nodes: &[MirrorNode],
        links: &[ActiveLink],
        tunables: Tunables,
        tier: Tier,
        seed: u64,
    ) -> Self {
        let mut state = SimState::new();
        for node in nodes {
            state.push_node(node.pos, node.size, node.cluster);
        }
        for link in links {
            state.try_link(link.a, link.b);
        }
        Self::from_state(state, tunables, tier, seed)
    }
}

impl SimulationBackend for LocalBackend {
    fn begin_frame(&mut self) -> BackendHealth {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= BASELINE_TICK_INTERVAL {
            self.last_tick = now;
            self.engine.tick(&mut self.state);
            let changed =
                self.rebalancer
                    .run_if_due(&mut self.state, self.caps.max_links, &mut self.rng, now);
            if changed {
                self.engine.reheat(self.tunables.simulation.reheat_alpha);
            }
        }
        mirror_from_state(&self.state, &mut self.mirror_nodes, &mut self.mirror_links);
        BackendHealth::Healthy
    }

    fn nodes(&self) -> &[MirrorNode] {
        &self.mirror_nodes
    }

    fn links(&self) -> &[ActiveLink] {
        &self.mirror_links
    }

    fn alpha(&self) -> f32 {
        self.engine.alpha()
    }

    fn report_utilized(&mut self, keys: &[EdgeKey]) {
        for &key in keys {
            self.state.mark_utilized(key);
        }
    }

    fn request_cluster(&mut self, origin: Vec3) {
        let changed = grow::add_cluster_batch(
            &mut self.state,
            origin,
            &self.tunables,
            self.caps,
            &mut self.rng,
        );
        if changed {
            self.engine.reheat(self.tunables.simulation.reheat_alpha);
        }
    }

    fn apply_config(&mut self, patch: &TunablesPatch) {
        self.tunables.apply(patch);
        self.caps = self.tunables.caps(self.tier);
        self.engine.set_forces(&self.tunables.simulation);
        self.rebalancer.set_config(&self.tunables.edges);
    }
}

pub struct WorkerBackend {
    requests: Sender<WorkerRequest>,
    replies: Receiver<WorkerReply>,
    handle: Option<JoinHandle<()>>,
    tunables: Tunables,
    tick_pending: bool,
    lost: bool,
    alpha: f32,
    mirror_nodes: Vec<MirrorNode>,
    mirror_links: Vec<ActiveLink>,
}

impl WorkerBackend {
    pub fn spawn(state: &SimState, tunables: &Tunables, seed: u64) -> anyhow::Result<Self> {
        let channel = spawn_worker().context("starting enhanced tier")?;

        let nodes = state
            .nodes
            .iter()
            .map(|node| WireNode {
                id: node.id,
                x: node.pos.x,
                y: node.pos.y,
                z: node.pos.z,
                size: node.size,
                cluster: node.cluster,
            })
            .collect::<Vec<_>>();
        let links = state
            .links
            .iter()
            .map(|link| WireLink {
                a: link.a,
                b: link.b,
            })
            .collect::<Vec<_>>();

        channel
            .requests
            .send(WorkerRequest::Init {
                nodes,
                links,
                tunables: Box::new(tunables.clone()),
                caps: tunables.caps(Tier::Enhanced),
                seed,
            })
            .context("sending init to physics worker")?;

        match channel.replies.recv_timeout(WORKER_READY_TIMEOUT) {
            Ok(WorkerReply::Ready {
                node_count,
                link_count,
            }) => {
                debug!("physics worker ready: {node_count} nodes, {link_count} links");
            }
            Ok(other) => bail!("physics worker sent {other:?} before ready"),
            Err(error) => bail!("physics worker never became ready: {error}"),
        }

        let mut backend = Self {
            requests: channel.requests,
            replies: channel.replies,
            handle: Some(channel.handle),
            tunables: tunables.clone(),
            tick_pending: false,
            lost: false,
            alpha: 1.0,
            mirror_nodes: Vec::new(),
            mirror_links: Vec::new(),
        };
        mirror_from_state(state, &mut backend.mirror_nodes, &mut backend.mirror_links);
        Ok(backend)
    }

    #[cfg(test)]
    pub(in crate::app) fn disconnected(state: &SimState, tunables: &Tunables) -> Self {
        let (requests, _) = std::sync::mpsc::channel();
        let (_, replies) = std::sync::mpsc::channel();
        let mut backend = Self {
            requests,
            replies,
            handle: None,
            tunables: tunables.clone(),
            tick_pending: false,
            lost: false,
            alpha: 1.0,
            mirror_nodes: Vec::new(),
            mirror_links: Vec::new(),
        };
        mirror_from_state(state, &mut backend.mirror_nodes, &mut backend.mirror_links);
        backend
    }

    fn default_node_size(&self) -> f32 {
        (self.tunables.nodes.min_size + self.tunables.nodes.max_size) * 0.5
    }

    fn apply_frame(
        &mut self,
        positions: Vec<f32>,
        link_offsets: Vec<u32>,
        node_count: usize,
        alpha: f32,
    ) {
        self.alpha = alpha;

        while self.mirror_nodes.len() < node_count {
            self.mirror_nodes.push(MirrorNode {
                id: self.mirror_nodes.len() as u32,
                pos: Vec3::ZERO,
                size: self.default_node_size(),
                cluster: None,
            });
        }

        for (offset, mirror) in self
            .mirror_nodes
            .iter_mut()
            .enumerate()
            .take(node_count)
        {
            let base = offset * 3;
            if base + 2 >= positions.len() {
                break;
            }
            mirror.pos = vec3(positions[base], positions[base + 1], positions[base + 2]);
        }

        self.mirror_links.clear();
        for pair in link_offsets.chunks_exact(2) {
            let a = pair[0] as usize;
            let b = pair[1] as usize;
            if a >= node_count || b >= node_count {
                continue;
            }
            self.mirror_links.push(ActiveLink {
                a: self.mirror_nodes[a].id,
                b: self.mirror_nodes[b].id,
            });
        }
    }

    fn drain_replies(&mut self) {
        loop {
            match self.replies.try_recv() {
                Ok(WorkerReply::Frame {
                    positions,
                    link_offsets,
                    node_count,
                    link_count: _,
                    alpha,
                }) => {
                    self.tick_pending = false;
                    self.apply_frame(positions, link_offsets, node_count, alpha);
                }
                Ok(WorkerReply::NodesAdded {
                    node_count,
                    link_count,
                }) => {
                    debug!("worker grew graph to {node_count} nodes, {link_count} links");
                }
                Ok(WorkerReply::Ready { .. }) => {}
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.lost = true;
                    break;
                }
            }
        }
    }

    fn send(&mut self, request: WorkerRequest) {
        if self.lost {
            return;
        }
        if self.requests.send(request).is_err() {
            warn!("physics worker channel closed");
            self.lost = true;
        }
    }
}

impl SimulationBackend for WorkerBackend {
    fn begin_frame(&mut self) -> BackendHealth {
        self.drain_replies();

        if !self.lost && !self.tick_pending {
            self.send(WorkerRequest::Tick);
            self.tick_pending = true;
        }

        if self.lost {
            BackendHealth::Lost
        } else {
            BackendHealth::Healthy
        }
    }

    fn nodes(&self) -> &[MirrorNode] {
        &self.mirror_nodes
    }

    fn links(&self) -> &[ActiveLink] {
        &self.mirror_links
    }

    fn alpha(&self) -> f32 {
        self.alpha
    }

    fn report_utilized(&mut self, keys: &[EdgeKey]) {
        if keys.is_empty() {
            return;
        }
        self.send(WorkerRequest::Utilized(keys.to_vec()));
    }

    fn request_cluster(&mut self, origin: Vec3) {
        self.send(WorkerRequest::AddCluster {
            x: origin.x,
            y: origin.y,
            z: origin.z,
        });
    }

    fn apply_config(&mut self, patch: &TunablesPatch) {
        self.tunables.apply(patch);
        self.send(WorkerRequest::SetConfig(Box::new(patch.clone())));
    }
}

impl Drop for WorkerBackend {
    fn drop(&mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
