use crate::common::*;
use crate::experiment::ExperimentResults;

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};

/// Write the full results (all strategies, all rounds) as JSON
pub fn write_results_json(out_file: &str, results: &ExperimentResults) -> anyhow::Result<()> {
    let writer = BufWriter::new(File::create(out_file)?);
    serde_json::to_writer_pretty(writer, results)?;
    info!("Wrote results: {}", out_file);
    Ok(())
}

/// Write one row per (strategy, run, round) to a gzipped TSV.
///
/// Columns: `strategy run round design w1_mean_{j}... w1_sd_{j}... ape_{d}...`
pub fn write_trace_tsv_gz(out_file: &str, results: &ExperimentResults) -> anyhow::Result<()> {
    let first = results
        .runs
        .values()
        .flat_map(|runs| runs.iter())
        .flat_map(|r| r.rounds.first())
        .next()
        .ok_or_else(|| anyhow::anyhow!("no rounds to write"))?;
    let p = first.posterior.mean.len();
    let nd = first.ape.len();

    let mut writer = GzEncoder::new(BufWriter::new(File::create(out_file)?), Compression::default());

    write!(writer, "strategy\trun\tround\tdesign")?;
    for j in 0..p {
        write!(writer, "\tw1_mean_{}", j)?;
    }
    for j in 0..p {
        write!(writer, "\tw1_sd_{}", j)?;
    }
    for d in 0..nd {
        write!(writer, "\tape_{}", d)?;
    }
    writeln!(writer)?;

    for (name, runs) in results.runs.iter() {
        for run in runs {
            for r in run.rounds.iter() {
                write!(writer, "{}\t{}\t{}\t{}", name, run.run, r.round, r.design_index)?;
                for m in r.posterior.mean.iter() {
                    write!(writer, "\t{:.6}", m)?;
                }
                for s in r.posterior.sd() {
                    write!(writer, "\t{:.6}", s)?;
                }
                for a in r.ape.iter() {
                    write!(writer, "\t{:.6}", a)?;
                }
                writeln!(writer)?;
            }
        }
    }

    writer.finish()?.flush()?;
    info!("Wrote trace: {}", out_file);
    Ok(())
}

/// Write the run parameters as pretty JSON
pub fn write_parameters(param_file: &str, params: &serde_json::Value) -> anyhow::Result<()> {
    std::fs::write(param_file, serde_json::to_string_pretty(params)?)?;
    info!("Wrote parameters: {}", param_file);
    Ok(())
}

/// Log the final posterior of every run, one line per run
pub fn log_summary(results: &ExperimentResults) {
    info!("true w1: {:?}", results.truth_w1);
    for (name, posts) in results.final_posteriors() {
        for (k, post) in posts.iter().enumerate() {
            info!(
                "{} run {}: mean {:?}, scale_tril {:?}",
                name, k, post.mean, post.scale_tril
            );
        }
    }
}
