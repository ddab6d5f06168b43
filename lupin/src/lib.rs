//! Sequential Bayesian optimal experimental design for a sigmoid
//! random-effects linear model.
//!
//! Each round scores the candidate designs with an amortized
//! Barber-Agakov estimate of the average posterior entropy, runs the
//! chosen experiment against a simulated ground truth and carries the
//! posterior of the treatment effects into the next round's prior.

pub mod common;
pub mod designs;
pub mod eig;
pub mod experiment;
pub mod guide;
pub mod model;
pub mod output;
pub mod svi;

pub use designs::{group_assignment_matrix, rf_group_assignments, CandidateDesigns};
pub use eig::{barber_agakov_ape, ApeEstimate, BaConfig};
pub use experiment::{
    run_experiment, select_design, ExperimentConfig, ExperimentResults, Posterior,
    PosteriorUpdate, Strategy,
};
pub use guide::SigmoidPosteriorGuide;
pub use model::{SigmoidModel, SigmoidModelParams, TrueModel};
pub use svi::{learn_posterior, SviConfig};
