extern crate clap;
extern crate env_logger;
extern crate failure;
#[macro_use]
extern crate log;
extern crate rand;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate sketchrec;

use std::fs::{create_dir_all, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use sketchrec::data::{load_interaction_csv, Events};
use sketchrec::evaluation::{run, Protocol, Report};
use sketchrec::models::popular::PopularModel;
use sketchrec::models::random::RandomModel;
use sketchrec::models::sketch::Hyperparameters;

#[derive(Clone, Copy, Debug, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
enum ModelKind {
    Sketch,
    Popular,
    Random,
}

/// Evaluate a streaming recommender on an event stream.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Event stream: a `.json` document of events, or a
    /// `user_id,item_id,timestamp` CSV interaction log.
    #[arg(long)]
    events: PathBuf,
    /// Model to evaluate.
    #[arg(long, value_enum, default_value = "sketch")]
    model: ModelKind,
    /// Window size of the moving average of recall.
    #[arg(long, default_value_t = 5000)]
    window_size: usize,
    /// Number of epochs of batch training.
    #[arg(long, default_value_t = 1)]
    n_epoch: usize,
    /// Length of each recommendation list.
    #[arg(long, default_value_t = 10)]
    at: usize,
    /// Dimension of the randomly projected feature space.
    #[arg(long, default_value_t = 40)]
    sketch_dim: usize,
    /// Seed of the first trial; trial `i` uses `seed + i`.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Number of trials under the same setting.
    #[arg(long, default_value_t = 1)]
    n_trial: usize,
    /// Directory receiving one JSON report per trial.
    #[arg(long, default_value = "results")]
    output: PathBuf,
}

#[derive(Debug, Serialize)]
struct TrialResult {
    model: ModelKind,
    trial: usize,
    seed: u64,
    elapsed: Duration,
    protocol: Protocol,
    report: Report,
}

fn load_events(path: &Path) -> Result<Events, failure::Error> {
    match path.extension().and_then(|x| x.to_str()) {
        Some("json") => Events::from_json_reader(BufReader::new(File::open(path)?)),
        _ => load_interaction_csv(path),
    }
}

fn evaluate(
    args: &Args,
    events: &Events,
    protocol: &Protocol,
    seed: u64,
) -> Result<Report, failure::Error> {
    let report = match args.model {
        ModelKind::Sketch => {
            let mut model = Hyperparameters::new(*events.contexts())
                .sketch_dim(args.sketch_dim)
                .from_seed(seed)
                .build();
            run(&mut model, events, protocol)?
        }
        ModelKind::Popular => run(&mut PopularModel::new(), events, protocol)?,
        ModelKind::Random => {
            let mut rng = XorShiftRng::seed_from_u64(seed);
            run(&mut RandomModel::new(&mut rng), events, protocol)?
        }
    };

    Ok(report)
}

fn main() -> Result<(), failure::Error> {
    env_logger::init();

    let args = Args::parse();
    let events = load_events(&args.events)?;

    info!(
        "Loaded {} events: {} users, {} items",
        events.len(),
        events.num_users(),
        events.num_items()
    );

    let protocol = Protocol::new()
        .window_size(args.window_size)
        .n_epoch(args.n_epoch)
        .at(args.at);

    create_dir_all(&args.output)?;

    for trial in 0..args.n_trial {
        let seed = args.seed + trial as u64;

        let start = Instant::now();
        let report = evaluate(&args, &events, &protocol, seed)?;
        let result = TrialResult {
            model: args.model,
            trial: trial + 1,
            seed,
            elapsed: start.elapsed(),
            protocol: protocol.clone(),
            report,
        };

        let name = format!(
            "{:?}_{}_{}.json",
            args.model, args.window_size, result.trial
        );
        let path = args.output.join(name.to_lowercase());

        serde_json::to_writer_pretty(File::create(&path)?, &result)?;

        println!(
            "Trial {}: final recall {:.4} in {:?} -> {}",
            result.trial,
            result.report.recalls.last().cloned().unwrap_or(0.0),
            result.elapsed,
            path.display()
        );
    }

    Ok(())
}
