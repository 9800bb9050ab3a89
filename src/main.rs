use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use env_logger::{Builder, Env};

use meshpulse::app::MeshPulseApp;
use meshpulse::app::session::TierChoice;
use meshpulse::config::{Tunables, load_patch};

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum TierArg {
    Auto,
    Baseline,
    Enhanced,
}

impl From<TierArg> for TierChoice {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Auto => TierChoice::Auto,
            TierArg::Baseline => TierChoice::Baseline,
            TierArg::Enhanced => TierChoice::Enhanced,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = TierArg::Auto)]
    tier: TierArg,

    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut tunables = Tunables::default();
    if let Some(path) = &args.config {
        let patch = load_patch(path)?;
        tunables.apply(&patch);
    }

    let seed = args.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0)
    });
    let choice = TierChoice::from(args.tier);

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1280.0, 840.0]),
        ..Default::default()
    };

    eframe::run_native(
        "meshpulse",
        options,
        Box::new(move |cc| Ok(Box::new(MeshPulseApp::new(cc, tunables, choice, seed)))),
    )
    .map_err(|error| anyhow::anyhow!("running visualization window: {error}"))
}
