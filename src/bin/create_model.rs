use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use qlstm::lstm::FusedActivation;
use qlstm::{LstmModel, LstmParams, QuantScheme, RandomModelSpec};
use std::path::PathBuf;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Scheme {
    Int8,
    Int16,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CellActivation {
    Tanh,
    Sigmoid,
}

#[derive(Parser, Debug)]
#[command(name = "create_model", version, about = "Write a random quantized LSTM model file")]
struct Args {
    /// Output path
    #[arg(long, default_value = "lstm_model.json")]
    output: PathBuf,

    /// Activation width
    #[arg(long, value_enum, default_value_t = Scheme::Int16)]
    scheme: Scheme,

    #[arg(long, default_value_t = 4)]
    input_dim: usize,

    #[arg(long, default_value_t = 8)]
    state_dim: usize,

    /// Cell gate nonlinearity
    #[arg(long, value_enum, default_value_t = CellActivation::Tanh)]
    activation: CellActivation,

    /// Real-valued cell clip (0 disables)
    #[arg(long, default_value_t = 0.0)]
    cell_clip: f32,

    /// Inputs are [time, batch, input] instead of [batch, time, input]
    #[arg(long)]
    time_major: bool,

    /// Cell state scale is 2^cell_scale_power
    #[arg(long, default_value_t = -11, allow_hyphen_values = true)]
    cell_scale_power: i32,

    #[arg(long, default_value_t = 0.5)]
    weight_std: f32,

    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let spec = RandomModelSpec {
        scheme: match args.scheme {
            Scheme::Int8 => QuantScheme::Int8Activations,
            Scheme::Int16 => QuantScheme::Int16Activations,
        },
        input_dimension: args.input_dim,
        state_dimension: args.state_dim,
        params: LstmParams {
            activation: match args.activation {
                CellActivation::Tanh => FusedActivation::Tanh,
                CellActivation::Sigmoid => FusedActivation::Sigmoid,
            },
            cell_clip: args.cell_clip,
            time_major: args.time_major,
        },
        cell_scale_power: args.cell_scale_power,
        weight_std: args.weight_std,
    };
    let model = LstmModel::random(&spec, args.seed).context("build random model")?;
    model.save(&args.output).with_context(|| format!("write model: {}", args.output.display()))?;
    println!(
        "Model saved to: {} ({:?}, input {}, state {})",
        args.output.display(),
        model.scheme,
        model.input_dimension,
        model.state_dimension
    );
    Ok(())
}
