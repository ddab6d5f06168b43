use crate::common::*;
use crate::designs::{rf_group_assignments, CandidateDesigns};
use crate::eig::{barber_agakov_ape, BaConfig};
use crate::guide::SigmoidPosteriorGuide;
use crate::model::{SigmoidModel, TrueModel};
use crate::svi::{learn_posterior, SviConfig};

use candle_nn::{VarBuilder, VarMap};
use candle_util::candle_random::uniform_index;
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressDrawTarget};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

/// How the next design is chosen
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Greedy: smallest average posterior entropy
    Oed,
    /// Uniformly random baseline
    Rand,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Oed => "oed",
            Strategy::Rand => "rand",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the posterior of `w1` is refreshed after each outcome
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PosteriorUpdate {
    /// Read the posterior off the trained Barber-Agakov guide
    Amortized,
    /// Fit a mean-field posterior by stochastic variational inference
    Svi,
}

#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub strategies: Vec<Strategy>,
    pub num_runs: usize,
    pub num_rounds: usize,
    pub posterior_update: PosteriorUpdate,
    pub ba: BaConfig,
    pub svi: SviConfig,
    pub show_progress: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            strategies: vec![Strategy::Oed, Strategy::Rand],
            num_runs: 5,
            num_rounds: 5,
            posterior_update: PosteriorUpdate::Amortized,
            ba: BaConfig::default(),
            svi: SviConfig::default(),
            show_progress: false,
        }
    }
}

/// Gaussian posterior of `w1`
#[derive(Debug, Clone, Serialize)]
pub struct Posterior {
    pub mean: Vec<f32>,
    /// Lower-triangular scale
    pub scale_tril: Vec<Vec<f32>>,
}

impl Posterior {
    fn diagonal(mean: Vec<f32>, sd: &[f32]) -> Self {
        let p = sd.len();
        let scale_tril = (0..p)
            .map(|i| (0..p).map(|j| if i == j { sd[i] } else { 0.0 }).collect())
            .collect();
        Self { mean, scale_tril }
    }

    /// Marginal scales `|L_jj|`
    pub fn sd(&self) -> Vec<f32> {
        self.scale_tril
            .iter()
            .enumerate()
            .map(|(j, row)| row[j].abs())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundRecord {
    /// 1-based round number
    pub round: usize,
    pub design_index: usize,
    /// Prior of `w1` this round was scored under
    pub prior_mean: Vec<f32>,
    pub prior_sd: Vec<f32>,
    pub ape: Vec<f32>,
    pub eig_lower_bound: Vec<f32>,
    pub observation: Vec<f32>,
    pub posterior: Posterior,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run: usize,
    pub rounds: Vec<RoundRecord>,
}

impl RunRecord {
    /// Posterior after the last round
    pub fn final_posterior(&self) -> Option<&Posterior> {
        self.rounds.last().map(|r| &r.posterior)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentResults {
    /// Ground-truth `w1` of the simulator
    pub truth_w1: Vec<f32>,
    pub posterior_update: PosteriorUpdate,
    /// Strategy name -> runs in order
    pub runs: BTreeMap<String, Vec<RunRecord>>,
}

impl ExperimentResults {
    /// Strategy name -> final posterior of every run
    pub fn final_posteriors(&self) -> BTreeMap<String, Vec<Posterior>> {
        self.runs
            .iter()
            .map(|(name, runs)| {
                let posts = runs
                    .iter()
                    .filter_map(|r| r.final_posterior().cloned())
                    .collect();
                (name.clone(), posts)
            })
            .collect()
    }
}

/// Pick the next design from the APE surface
pub fn select_design<R: Rng + ?Sized>(
    strategy: Strategy,
    ape: &[f32],
    rng: &mut R,
) -> anyhow::Result<usize> {
    match strategy {
        Strategy::Oed => argmin(ape),
        Strategy::Rand => {
            if ape.is_empty() {
                anyhow::bail!("no candidate designs");
            }
            Ok(uniform_index(ape.len(), rng)?)
        }
    }
}

struct SequentialContext<'a> {
    config: &'a ExperimentConfig,
    candidates: &'a CandidateDesigns,
    designs: &'a Tensor,
    truth: &'a TrueModel,
    device: &'a Device,
    pb: &'a ProgressBar,
}

/// One run: a fresh prior and a fresh guide, then `num_rounds` of
/// score -> select -> observe -> update.
fn run_sequential_design<R: Rng + ?Sized>(
    ctx: &SequentialContext,
    strategy: Strategy,
    run: usize,
    rng: &mut R,
) -> anyhow::Result<RunRecord> {
    let config = ctx.config;
    let mut model = SigmoidModel::prior_default(ctx.candidates.slope_design.clone())?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DEFAULT_DTYPE, ctx.device);
    let guide = SigmoidPosteriorGuide::new(
        vb.pp("ba_guide"),
        model.w1_sd(),
        ctx.candidates.num_designs(),
        ctx.candidates.num_participants(),
    )?;

    let mut rounds = Vec::with_capacity(config.num_rounds);

    for round in 1..=config.num_rounds {
        info!("[{} run {}] experiment number {}", strategy, run, round);
        let prior_mean = model.w1_mean().to_vec();
        let prior_sd = model.w1_sd().to_vec();

        let est = barber_agakov_ape(&model, &guide, &varmap, ctx.designs, &config.ba, rng)?;
        info!("APE surface: {:?}", est.ape);

        let design_index = select_design(strategy, &est.ape, rng)?;
        let design = ctx.candidates.design_tensor(design_index, ctx.device)?;
        let y = ctx.truth.sample(&design, rng)?;

        let posterior = match config.posterior_update {
            PosteriorUpdate::Amortized => {
                let post = guide.posterior_at(&y, ctx.designs, design_index)?;
                model = model.with_w1_prior(&post.mean, &post.sd())?;
                Posterior {
                    mean: post.mean,
                    scale_tril: post.scale_tril,
                }
            }
            PosteriorUpdate::Svi => {
                let (updated, post) = learn_posterior(&model, &y, &design, &config.svi, rng)?;
                model = updated;
                Posterior::diagonal(post.mean, &post.sd)
            }
        };

        info!(
            "design {} -> w1 mean {:?}, sd {:?}",
            design_index,
            posterior.mean,
            posterior.sd()
        );

        rounds.push(RoundRecord {
            round,
            design_index,
            prior_mean,
            prior_sd,
            ape: est.ape,
            eig_lower_bound: est.eig_lower_bound,
            observation: tensor_to_vec1(&y)?,
            posterior,
        });
        ctx.pb.inc(1);
    }

    Ok(RunRecord { run, rounds })
}

/// Run every strategy `num_runs` times
pub fn run_experiment<R: Rng + ?Sized>(
    config: &ExperimentConfig,
    device: &Device,
    rng: &mut R,
) -> anyhow::Result<ExperimentResults> {
    if config.strategies.is_empty() {
        anyhow::bail!("no design strategy selected");
    }
    if config.num_runs == 0 || config.num_rounds == 0 {
        anyhow::bail!("need at least one run and one round");
    }

    let truth = TrueModel::default();
    let candidates = rf_group_assignments(truth.num_participants())?;
    let designs = candidates.to_tensor(device)?;

    info!(
        "{} candidate designs of {} participants x {} coefficients",
        candidates.num_designs(),
        candidates.num_participants(),
        candidates.num_columns()
    );

    let total = config.strategies.len() * config.num_runs * config.num_rounds;
    let pb = ProgressBar::new(total as u64);
    if !config.show_progress {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let ctx = SequentialContext {
        config,
        candidates: &candidates,
        designs: &designs,
        truth: &truth,
        device,
        pb: &pb,
    };

    let mut runs = BTreeMap::new();
    for &strategy in config.strategies.iter() {
        info!("Type {}", strategy);
        let strategy_runs = (0..config.num_runs)
            .map(|k| run_sequential_design(&ctx, strategy, k, rng))
            .collect::<anyhow::Result<Vec<_>>>()?;
        runs.insert(strategy.name().to_string(), strategy_runs);
    }
    pb.finish_and_clear();

    Ok(ExperimentResults {
        truth_w1: truth.w1.clone(),
        posterior_update: config.posterior_update,
        runs,
    })
}
