use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::Context;
use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{TierCaps, Tunables, TunablesPatch};
use crate::util::EdgeKey;

use super::sim::{SimEngine, SimState, Vec3, grow, rebalance::Rebalancer, vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WireNode {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub size: f32,
    pub cluster: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireLink {
    pub a: u32,
    pub b: u32,
}

#[derive(Debug)]
pub enum WorkerRequest {
    Init {
        nodes: Vec<WireNode>,
        links: Vec<WireLink>,
        tunables: Box<Tunables>,
        caps: TierCaps,
        seed: u64,
    },
    Tick,
    Utilized(Vec<EdgeKey>),
    AddNodes {
        nodes: Vec<WireNode>,
        links: Vec<WireLink>,
    },
    AddCluster {
        x: f32,
        y: f32,
        z: f32,
    },
    SetConfig(Box<TunablesPatch>),
    Shutdown,
}

#[derive(Debug)]
pub enum WorkerReply {
    Ready {
        node_count: usize,
        link_count: usize,
    },
    Frame {
        positions: Vec<f32>,
        link_offsets: Vec<u32>,
        node_count: usize,
        link_count: usize,
        alpha: f32,
    },
    NodesAdded {
        node_count: usize,
        link_count: usize,
    },
}

pub struct WorkerChannel {
    pub requests: Sender<WorkerRequest>,
    pub replies: Receiver<WorkerReply>,
    pub handle: JoinHandle<()>,
}

pub fn spawn_worker() -> anyhow::Result<WorkerChannel> {
    let (request_tx, request_rx) = channel::<WorkerRequest>();
    let (reply_tx, reply_rx) = channel::<WorkerReply>();

    let handle = thread::Builder::new()
        .name("meshpulse-physics".to_owned())
        .spawn(move || run_worker(request_rx, reply_tx))
        .context("spawning physics worker thread")?;

    Ok(WorkerChannel {
        requests: request_tx,
        replies: reply_rx,
        handle,
    })
}

struct WorkerSim {
    state: SimState,
    engine: SimEngine,
    rebalancer: Rebalancer,
    tunables: Tunables,
    caps: TierCaps,
    rng: ChaCha8Rng,
}

impl WorkerSim {
    fn init(
        nodes: Vec<WireNode>,
        links: Vec<WireLink>,
        tunables: Tunables,
        caps: TierCaps,
        seed: u64,
    ) -> Self {
        let mut state = SimState::new();
        ingest_nodes(&mut state, nodes, usize::MAX);
        for link in links {
            state.try_link(link.a, link.b);
        }

        let engine = SimEngine::new(&tunables.simulation);
        let rebalancer = Rebalancer::new(&tunables.edges);
        Self {
            state,
            engine,
            rebalancer,
            tunables,
            caps,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn tick(&mut self) -> WorkerReply {
        self.engine.tick(&mut self.state);
        let changed = self.rebalancer.run_if_due(
            &mut self.state,
            self.caps.max_links,
            &mut self.rng,
            Instant::now(),
        );
        if changed {
            self.engine.reheat(self.tunables.simulation.reheat_alpha);
        }
        self.frame()
    }

    fn frame(&self) -> WorkerReply {
        let node_count = self.state.nodes.len();
        let mut positions = Vec::with_capacity(node_count * 3);
        for node in &self.state.nodes {
            positions.push(node.pos.x);
            positions.push(node.pos.y);
            positions.push(node.pos.z);
        }

        let mut link_offsets = Vec::with_capacity(self.state.links.len() * 2);
        for link in &self.state.links {
            let Some(a) = self.state.node_index(link.a) else {
                continue;
            };
            let Some(b) = self.state.node_index(link.b) else {
                continue;
            };
            link_offsets.push(a as u32);
            link_offsets.push(b as u32);
        }
        let link_count = link_offsets.len() / 2;

        WorkerReply::Frame {
            positions,
            link_offsets,
            node_count,
            link_count,
            alpha: self.engine.alpha(),
        }
    }

    fn add_nodes(&mut self, nodes: Vec<WireNode>, links: Vec<WireLink>) -> WorkerReply {
        let mut changed = ingest_nodes(&mut self.state, nodes, self.caps.max_nodes);
        for link in links {
            if self.state.links.len() >= self.caps.max_links {
                break;
            }
            changed |= self.state.try_link(link.a, link.b);
        }
        if changed {
            self.engine.reheat(self.tunables.simulation.reheat_alpha);
        }
        WorkerReply::NodesAdded {
            node_count: self.state.nodes.len(),
            link_count: self.state.links.len(),
        }
    }

    fn add_cluster(&mut self, origin: Vec3) -> WorkerReply {
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
        WorkerReply::NodesAdded {
            node_count: self.state.nodes.len(),
            link_count: self.state.links.len(),
        }
    }

    fn apply_config(&mut self, patch: &TunablesPatch) {
        self.tunables.apply(patch);
        self.engine.set_forces(&self.tunables.simulation);
        self.rebalancer.set_config(&self.tunables.edges);
    }
}

fn ingest_nodes(state: &mut SimState, nodes: Vec<WireNode>, max_nodes: usize) -> bool {
    let mut changed = false;
    for node in nodes {
        if state.nodes.len() >= max_nodes {
            break;
        }
        if node.id != state.nodes.len() as u32 {
            continue;
        }
        state.push_node(vec3(node.x, node.y, node.z), node.size, node.cluster);
        changed = true;
    }
    changed
}

fn run_worker(requests: Receiver<WorkerRequest>, replies: Sender<WorkerReply>) {
    let mut sim: Option<WorkerSim> = None;

    while let Ok(request) = requests.recv() {
        let reply = match request {
            WorkerRequest::Init {
                nodes,
                links,
                tunables,
                caps,
                seed,
            } => {
                let built = WorkerSim::init(nodes, links, *tunables, caps, seed);
                let ready = WorkerReply::Ready {
                    node_count: built.state.nodes.len(),
                    link_count: built.state.links.len(),
                };
                sim = Some(built);
                Some(ready)
            }
            WorkerRequest::Tick => sim.as_mut().map(WorkerSim::tick),
            WorkerRequest::Utilized(keys) => {
                if let Some(sim) = sim.as_mut() {
                    for key in keys {
                        sim.state.mark_utilized(key);
                    }
                }
                None
            }
            WorkerRequest::AddNodes { nodes, links } => {
                sim.as_mut().map(|sim| sim.add_nodes(nodes, links))
            }
            WorkerRequest::AddCluster { x, y, z } => {
                sim.as_mut().map(|sim| sim.add_cluster(vec3(x, y, z)))
            }
            WorkerRequest::SetConfig(patch) => {
                if let Some(sim) = sim.as_mut() {
                    sim.apply_config(&patch);
                }
                None
            }
            WorkerRequest::Shutdown => break,
        };

        if let Some(reply) = reply
            && replies.send(reply).is_err()
        {
            break;
        }
    }

    debug!("physics worker exiting");
}
