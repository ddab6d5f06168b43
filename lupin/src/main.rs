mod run_oed;

use run_oed::*;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "lupin",
    version,
    about = "Sigmoid iterated experiment design",
    long_about = "Sequential Bayesian experimental design on a sigmoid linear model\n\
		  with random participant intercepts:\n\
		  (1) Score candidate A/B group assignments by an amortized\n\
		      Barber-Agakov estimate of the average posterior entropy\n\
		  (2) Pick a design (greedy or random) and simulate its outcome\n\
		  (3) Update the posterior of the treatment effects and repeat.\n"
)]
struct Cli {
    #[command(flatten)]
    args: OedArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    run_sequential_oed(&cli.args)?;

    log::info!("Done");
    Ok(())
}
