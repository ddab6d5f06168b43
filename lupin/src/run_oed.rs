use lupin::common::*;
use lupin::eig::BaConfig;
use lupin::experiment::{run_experiment, ExperimentConfig, PosteriorUpdate, Strategy};
use lupin::output::{log_summary, write_parameters, write_results_json, write_trace_tsv_gz};
use lupin::svi::SviConfig;

use clap::{Args, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

/// Compute device for the tensor work
#[derive(ValueEnum, Clone, Debug, PartialEq, Serialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

impl ComputeDevice {
    pub fn to_device(&self, device_no: usize) -> anyhow::Result<Device> {
        Ok(match self {
            ComputeDevice::Metal => Device::new_metal(device_no)?,
            ComputeDevice::Cuda => Device::new_cuda(device_no)?,
            ComputeDevice::Cpu => Device::Cpu,
        })
    }
}

#[derive(Args, Debug)]
pub struct OedArgs {
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "oed,rand",
        help = "Design selection strategies to compare"
    )]
    pub strategies: Vec<Strategy>,

    #[arg(long, default_value_t = 5, help = "Independent runs per strategy")]
    pub runs: usize,

    #[arg(long, default_value_t = 5, help = "Sequential experiments per run")]
    pub rounds: usize,

    #[arg(long, default_value_t = 100, help = "Joint samples per design in each BA step")]
    pub ba_samples: usize,

    #[arg(long, default_value_t = 500, help = "Optimisation steps of the BA guide")]
    pub ba_steps: usize,

    #[arg(long, default_value_t = 0.05)]
    pub ba_lr: f64,

    #[arg(long, default_value_t = 500, help = "Joint samples per design for the final APE")]
    pub final_samples: usize,

    #[arg(long, value_enum, default_value = "amortized", help = "Posterior update after each outcome")]
    pub posterior: PosteriorUpdate,

    #[arg(long, default_value_t = 10_000)]
    pub svi_steps: usize,

    #[arg(long, default_value_t = 0.005)]
    pub svi_lr: f64,

    #[arg(long, default_value_t = 1, help = "Monte Carlo particles per ELBO estimate")]
    pub svi_particles: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value = "cpu")]
    pub device: ComputeDevice,

    #[arg(long, default_value_t = 0)]
    pub device_no: usize,

    #[arg(
        short,
        long,
        help = "Output prefix (creates {output}.results.json, {output}.trace.tsv.gz, {output}.parameters.json)"
    )]
    pub output: Option<Box<str>>,

    #[arg(long, help = "Show progress bars of the BA and SVI optimisation loops")]
    pub inner_progress: bool,

    #[arg(short, long, help = "Log every round (hides progress bars)")]
    pub verbose: bool,
}

impl OedArgs {
    pub fn experiment_config(&self) -> ExperimentConfig {
        let show_progress = !self.verbose;
        let inner_progress = self.inner_progress && !self.verbose;
        ExperimentConfig {
            strategies: self.strategies.clone(),
            num_runs: self.runs,
            num_rounds: self.rounds,
            posterior_update: self.posterior,
            ba: BaConfig {
                num_samples: self.ba_samples,
                num_steps: self.ba_steps,
                learning_rate: self.ba_lr,
                final_num_samples: self.final_samples,
                show_progress: inner_progress,
            },
            svi: SviConfig {
                num_steps: self.svi_steps,
                learning_rate: self.svi_lr,
                num_particles: self.svi_particles,
                show_progress: inner_progress,
            },
            show_progress,
        }
    }

    /// Everything needed to repeat the run
    pub fn parameters_json(&self) -> serde_json::Value {
        serde_json::json!({
            "command": "lupin",
            "strategies": &self.strategies,
            "runs": self.runs,
            "rounds": self.rounds,
            "ba_samples": self.ba_samples,
            "ba_steps": self.ba_steps,
            "ba_lr": self.ba_lr,
            "final_samples": self.final_samples,
            "posterior": self.posterior,
            "svi_steps": self.svi_steps,
            "svi_lr": self.svi_lr,
            "svi_particles": self.svi_particles,
            "seed": self.seed,
            "device": &self.device,
            "device_no": self.device_no,
        })
    }
}

pub fn run_sequential_oed(args: &OedArgs) -> anyhow::Result<()> {
    let device = args.device.to_device(args.device_no)?;
    let config = args.experiment_config();
    let mut rng = StdRng::seed_from_u64(args.seed);

    info!(
        "{} run(s) x {} round(s) for {:?}, posterior update: {:?}",
        config.num_runs, config.num_rounds, config.strategies, config.posterior_update
    );

    let results = run_experiment(&config, &device, &mut rng)?;
    log_summary(&results);

    if let Some(out) = args.output.as_deref() {
        write_results_json(&format!("{}.results.json", out), &results)?;
        write_trace_tsv_gz(&format!("{}.trace.tsv.gz", out), &results)?;

        let params = args.parameters_json();
        write_parameters(&format!("{}.parameters.json", out), &params)?;
    }

    Ok(())
}
