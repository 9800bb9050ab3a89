use std::time::{Duration, Instant};

use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::{Tier, Tunables, TunablesPatch};

use super::backend::{
    BackendHealth, LocalBackend, SimulationBackend, WorkerBackend,
};
use super::buffers::RenderBuffers;
use super::packets::PacketRouter;
use super::sim::{SimState, cluster_centers, grow, vec3};

const GROWTH_INTERVAL: Duration = Duration::from_millis(2600);

#[derive(Clone, Copy, Debug, Default)]
pub struct HostCapabilities {
    pub background_context: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TierChoice {
    #[default]
    Auto,
    Baseline,
    Enhanced,
}

pub struct VizSession {
    tunables: Tunables,
    tier: Tier,
    seed: u64,
    backend: Box<dyn SimulationBackend>,
    router: PacketRouter,
    buffers: RenderBuffers,
    growth_rng: ChaCha8Rng,
    last_growth: Instant,
}

impl VizSession {
    pub fn init(
        tunables: Tunables,
        capabilities: HostCapabilities,
        choice: TierChoice,
        seed: u64,
    ) -> Self {
        let wants_enhanced = match choice {
            TierChoice::Baseline => false,
            TierChoice::Enhanced | TierChoice::Auto => true,
        };
        let mut tier = if wants_enhanced && capabilities.background_context {
            Tier::Enhanced
        } else {
            Tier::Baseline
        };

        let mut state = SimState::new();
        let mut seed_rng = ChaCha8Rng::seed_from_u64(seed);
        grow::seed_graph(&mut state, &tunables, tunables.caps(tier), &mut seed_rng);

        let backend: Box<dyn SimulationBackend> = if tier == Tier::Enhanced {
            match WorkerBackend::spawn(&state, &tunables, seed) {
                Ok(worker) => Box::new(worker),
                Err(error) => {
                    warn!("enhanced tier unavailable, falling back to baseline: {error:#}");
                    tier = Tier::Baseline;
                    Box::new(LocalBackend::from_state(
                        state,
                        tunables.clone(),
                        tier,
                        seed,
                    ))
                }
            }
        } else {
            Box::new(LocalBackend::from_state(
                state,
                tunables.clone(),
                tier,
                seed,
            ))
        };

        info!("visualization session initialized on {} tier", tier.label());

        let buffers = RenderBuffers::new(tunables.caps(tier), &tunables.packets);
        Self {
            router: PacketRouter::new(seed.wrapping_add(1)),
            buffers,
            growth_rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(2)),
            last_growth: Instant::now(),
            tunables,
            tier,
            seed,
            backend,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn node_count(&self) -> usize {
        self.backend.nodes().len()
    }

    pub fn link_count(&self) -> usize {
        self.backend.links().len()
    }

    pub fn packet_count(&self) -> usize {
        self.router.packets().len()
    }

    pub fn buffers(&self) -> &RenderBuffers {
        &self.buffers
    }

    pub fn colors(&self) -> &crate::config::ColorsSection {
        &self.tunables.colors
    }

    #[cfg(test)]
    fn install_backend(&mut self, tier: Tier, backend: Box<dyn SimulationBackend>) {
        self.tier = tier;
        self.backend = backend;
    }

    pub fn apply_config(&mut self, patch: &TunablesPatch) {
        self.tunables.apply(patch);
        self.backend.apply_config(patch);
    }

    fn downgrade_to_baseline(&mut self) {
        warn!("physics worker lost mid-session, downgrading to baseline tier");
        self.tier = Tier::Baseline;
        let replacement = LocalBackend::from_snapshot(
            self.backend.nodes(),
            self.backend.links(),
            self.tunables.clone(),
            self.tier,
            self.seed,
        );
        self.backend = Box::new(replacement);
    }

    fn maybe_grow(&mut self, now: Instant) {
        if now.duration_since(self.last_growth) < GROWTH_INTERVAL {
            return;
        }
        self.last_growth = now;

        let caps = self.tunables.caps(self.tier);
        if self.backend.nodes().len() >= caps.target_nodes {
            return;
        }

        let centers = cluster_centers(
            self.tunables.simulation.center_count,
            self.tunables.simulation.center_radius,
        );
        let center = centers[self.growth_rng.gen_range(0..centers.len())];
        let spread = (self.tunables.simulation.center_radius * 0.6).max(16.0);
        let origin = center
            + vec3(
                self.growth_rng.gen_range(-spread..=spread),
                self.growth_rng.gen_range(-spread..=spread),
                self.growth_rng.gen_range(-spread * 0.5..=spread * 0.5),
            );
        self.backend.request_cluster(origin);
    }

    pub fn advance_frame(&mut self, dt: f32) {
        if self.backend.begin_frame() == BackendHealth::Lost {
            self.downgrade_to_baseline();
            let _ = self.backend.begin_frame();
        }

        self.maybe_grow(Instant::now());

        let utilized = self.router.advance(
            self.backend.nodes(),
            self.backend.links(),
            &self.tunables.packets,
            dt,
        );
        if !utilized.is_empty() {
            let keys = utilized.to_vec();
            self.backend.report_utilized(&keys);
        }

        self.buffers
            .sync(self.backend.nodes(), self.backend.links(), &self.router);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_absence_selects_baseline() {
        let session = VizSession::init(
            Tunables::default(),
            HostCapabilities {
                background_context: false,
            },
            TierChoice::Enhanced,
            9,
        );
        assert_eq!(session.tier(), Tier::Baseline);
        assert!(session.node_count() > 0);
    }

    #[test]
    fn explicit_baseline_choice_ignores_capability() {
        let session = VizSession::init(
            Tunables::default(),
            HostCapabilities {
                background_context: true,
            },
            TierChoice::Baseline,
            9,
        );
        assert_eq!(session.tier(), Tier::Baseline);
    }

    #[test]
    fn worker_loss_downgrades_and_keeps_the_graph() {
        let mut session = VizSession::init(
            Tunables::default(),
            HostCapabilities::default(),
            TierChoice::Auto,
            19,
        );

        let tunables = Tunables::default();
        let mut state = SimState::new();
        let mut rng = ChaCha8Rng::seed_from_u64(19);
        grow::seed_graph(&mut state, &tunables, tunables.caps(Tier::Enhanced), &mut rng);
        let node_count = state.nodes.len();
        let link_count = state.links.len();

        let dead = WorkerBackend::disconnected(&state, &tunables);
        session.install_backend(Tier::Enhanced, Box::new(dead));
        assert_eq!(session.tier(), Tier::Enhanced);

        session.advance_frame(1.0 / 60.0);

        assert_eq!(session.tier(), Tier::Baseline);
        assert_eq!(session.node_count(), node_count);
        assert_eq!(session.link_count(), link_count);

        for _ in 0..4 {
            session.advance_frame(1.0 / 60.0);
        }
        assert_eq!(session.node_count(), node_count);
    }

    #[test]
    fn baseline_session_advances_and_fills_buffers() {
        let mut session = VizSession::init(
            Tunables::default(),
            HostCapabilities::default(),
            TierChoice::Auto,
            13,
        );

        for _ in 0..8 {
            session.advance_frame(1.0 / 60.0);
        }

        let buffers = session.buffers();
        assert_eq!(buffers.node_count, session.node_count());
        assert_eq!(buffers.link_count, session.link_count());
        assert!(buffers.node_count > 0);
    }
}
