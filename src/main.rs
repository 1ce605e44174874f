use anyhow::{Context, Result};
use clap::Parser;
use qlstm::{LstmModel, LstmRun};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "qlstm", version, about = "Run a quantized integer LSTM model over a sequence")]
struct Args {
    /// Path to model (.json) file
    #[arg(long)]
    model: PathBuf,

    /// JSON array of real input values; random when omitted
    #[arg(long)]
    input: Option<PathBuf>,

    /// Batch size of every sequence
    #[arg(long, default_value_t = 1)]
    batch: usize,

    /// Time steps of a random input sequence
    #[arg(long, default_value_t = 8)]
    steps: usize,

    /// Number of random sequences to run in parallel
    #[arg(long, default_value_t = 1)]
    sequences: usize,

    /// Seed for random input
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

fn read_input(path: &Path) -> Result<Vec<f32>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read input: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse input: {}", path.display()))
}

fn random_input(rng: &mut SmallRng, len: usize) -> Vec<f32> { (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect() }

fn print_run(idx: usize, run: &LstmRun) {
    println!("sequence {} output shape {:?}", idx, run.output_shape);
    let s = run.output_shape[2];
    for (row, h) in run.hidden_state.chunks(s.max(1)).enumerate() {
        println!("  batch {} hidden {:?}", row, h);
    }
    for (row, c) in run.cell_state.chunks(s.max(1)).enumerate() {
        println!("  batch {} cell   {:?}", row, c);
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let model = LstmModel::load(&args.model).with_context(|| format!("load model: {}", args.model.display()))?;
    let sequences = match &args.input {
        Some(path) => vec![read_input(path)?],
        None => {
            let mut rng = SmallRng::seed_from_u64(args.seed);
            let len = args.batch * args.steps * model.input_dimension;
            (0..args.sequences.max(1)).map(|_| random_input(&mut rng, len)).collect()
        }
    };

    let t0 = Instant::now();
    let runs = model
        .run_batch(&sequences, args.batch)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .context("run model")?;
    let elapsed = t0.elapsed().as_secs_f64();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
    } else {
        for (i, run) in runs.iter().enumerate() {
            print_run(i, run);
        }
        println!("{} sequence(s) in {:.3} ms ({:?})", runs.len(), elapsed * 1000.0, model.scheme);
    }
    Ok(())
}
