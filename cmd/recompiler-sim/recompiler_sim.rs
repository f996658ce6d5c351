use clap::Parser;
use recompiler_sim::{cli::Options, initializers::init_tracing, sim};
use tracing::error;

fn main() -> eyre::Result<()> {
    let opts = Options::parse();
    init_tracing(&opts)?;

    if let Err(err) = sim::run(&opts) {
        error!("Simulation failed: {err:#}");
        return Err(err);
    }
    Ok(())
}
