//! JSON model description and a host-side runner around [`IntegerLstmOp`].
//!
//! A model file carries everything `prepare` needs: the scheme, sizes,
//! operator options, per-tensor quantization and the integer weights. The
//! runner owns all buffers, binds them into a [`TensorSlots`] table and
//! converts between real values and the quantized domain at the edges.

use std::fs;
use std::path::Path;

use log::debug;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Status};
use crate::lstm::{
    CellType, Gate, GateQuantization, Int16Activations, Int8Activations, IntegerLstmOp, LstmConfig, LstmParams,
    LstmQuantization, LstmSizeInfo, LstmTensor, OpDataLstm, QuantScheme, TensorSlots,
};
use crate::lstm::params::{DEFAULT_NONLINEAR_INPUT_SCALE, DEFAULT_NONLINEAR_OUTPUT_SCALE};
use crate::quant::{dequantize, quantize, TensorQuantization};
use crate::tensor::{ElementKind, EvalTensor, QuantElement};

/// Integer weights of one gate. Biases are stored wide and narrowed to the
/// scheme's bias type at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateWeights {
    /// `[state, input]`, row major.
    pub input_weights: Vec<i8>,
    /// `[state, state]`, row major.
    pub recurrent_weights: Vec<i8>,
    /// In `input scale * input weight scale` units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<Vec<i64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmModel {
    pub scheme: QuantScheme,
    pub input_dimension: usize,
    pub state_dimension: usize,
    #[serde(default)]
    pub params: LstmParams,
    pub quantization: LstmQuantization,
    pub forget_gate: GateWeights,
    pub input_gate: GateWeights,
    pub cell_gate: GateWeights,
    pub output_gate: GateWeights,
    /// One `[state]` row copied into every batch row. Absent means real zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_hidden_state: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_cell_state: Option<Vec<i32>>,
}

/// Real-valued result of one sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LstmRun {
    /// `[T, B, S]` when time major, `[B, T, S]` otherwise.
    pub output_shape: [usize; 3],
    pub output: Vec<f32>,
    /// Final `[B, S]` hidden state.
    pub hidden_state: Vec<f32>,
    /// Final `[B, S]` cell state.
    pub cell_state: Vec<f32>,
}

/// Knobs for [`LstmModel::random`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomModelSpec {
    pub scheme: QuantScheme,
    pub input_dimension: usize,
    pub state_dimension: usize,
    pub params: LstmParams,
    /// Cell state scale is `2^cell_scale_power`.
    pub cell_scale_power: i32,
    /// Standard deviation of the real-valued weights.
    pub weight_std: f32,
}

impl Default for RandomModelSpec {
    fn default() -> Self {
        Self {
            scheme: QuantScheme::Int16Activations,
            input_dimension: 2,
            state_dimension: 2,
            params: LstmParams::default(),
            cell_scale_power: -11,
            weight_std: 0.5,
        }
    }
}

fn check_len(what: impl Into<String>, expected: usize, found: usize) -> Result<(), ModelError> {
    if expected == found { Ok(()) } else { Err(ModelError::Length { what: what.into(), expected, found }) }
}

fn check_fits<V: Copy + Into<i64>>(what: impl Into<String>, values: &[V], kind: ElementKind) -> Result<(), ModelError> {
    let (min, max) = kind.bounds();
    match values.iter().map(|&v| v.into()).find(|v| *v < min || *v > max) {
        Some(value) => Err(ModelError::OutOfRange { what: what.into(), value, kind }),
        None => Ok(()),
    }
}

fn initial_state<T: QuantElement>(row: Option<&[i32]>, state_dimension: usize, batch_size: usize, fill: i32) -> Vec<T> {
    let len = state_dimension * batch_size;
    match row {
        Some(row) => row.iter().cycle().take(len).map(|&v| T::saturate_from(v as i64)).collect(),
        None => vec![T::saturate_from(fill as i64); len],
    }
}

/// A gate's weights narrowed to one [`LstmConfig`].
struct OwnedGate<C: LstmConfig> {
    input_weights: Vec<C::Weight>,
    recurrent_weights: Vec<C::Weight>,
    bias: Option<Vec<C::Bias>>,
}

impl<C: LstmConfig> OwnedGate<C> {
    fn new(w: &GateWeights) -> Self {
        let narrow = |v: &[i8]| -> Vec<C::Weight> {
            v.iter().map(|&x| <C::Weight as QuantElement>::saturate_from(x as i64)).collect()
        };
        Self {
            input_weights: narrow(&w.input_weights),
            recurrent_weights: narrow(&w.recurrent_weights),
            bias: w.bias.as_ref().map(|b| b.iter().map(|&x| <C::Bias as QuantElement>::saturate_from(x)).collect()),
        }
    }
}

impl LstmModel {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let text = fs::read_to_string(path.as_ref())?;
        let model = Self::from_json(&text)?;
        debug!("loaded LSTM model from {}", path.as_ref().display());
        Ok(model)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Parses and validates a model.
    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_str(text)?;
        model.validate()?;
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String, ModelError> { Ok(serde_json::to_string_pretty(self)?) }

    pub fn gate(&self, gate: Gate) -> &GateWeights {
        match gate {
            Gate::Forget => &self.forget_gate,
            Gate::Input => &self.input_gate,
            Gate::Cell => &self.cell_gate,
            Gate::Output => &self.output_gate,
        }
    }

    pub fn gate_quantization(&self, gate: Gate) -> &GateQuantization {
        let q = &self.quantization;
        match gate {
            Gate::Forget => &q.forget_gate,
            Gate::Input => &q.input_gate,
            Gate::Cell => &q.cell_gate,
            Gate::Output => &q.output_gate,
        }
    }

    /// Checks sizes and value ranges, then derives the op data once so that
    /// quantization errors surface at load time.
    pub fn validate(&self) -> Result<(), ModelError> {
        let (s, i) = (self.state_dimension, self.input_dimension);
        if s == 0 || i == 0 {
            return Err(ModelError::EmptyDimension);
        }
        for gate in Gate::ALL {
            let w = self.gate(gate);
            check_len(format!("{:?} gate input weights", gate), s * i, w.input_weights.len())?;
            check_len(format!("{:?} gate recurrent weights", gate), s * s, w.recurrent_weights.len())?;
            if let Some(bias) = &w.bias {
                check_len(format!("{:?} gate bias", gate), s, bias.len())?;
                check_fits(format!("{:?} gate bias", gate), &bias[..], self.scheme.bias_kind())?;
            }
        }
        if let Some(h) = &self.initial_hidden_state {
            check_len("initial hidden state", s, h.len())?;
            check_fits("initial hidden state", &h[..], self.scheme.activation_kind())?;
        }
        if let Some(c) = &self.initial_cell_state {
            check_len("initial cell state", s, c.len())?;
            check_fits("initial cell state", &c[..], CellType::KIND)?;
        }
        let size = LstmSizeInfo {
            time_major: self.params.time_major,
            batch_size: 1,
            time_steps: 1,
            input_dimension: i,
            state_dimension: s,
        };
        OpDataLstm::derive(size, &self.params, &self.quantization, self.scheme)?;
        Ok(())
    }

    /// Runs one sequence of real-valued input laid out `[T, B, I]` (time major)
    /// or `[B, T, I]`. The time step count is inferred from `input.len()`.
    pub fn run(&self, input: &[f32], batch_size: usize) -> Result<LstmRun, ModelError> {
        let step = batch_size * self.input_dimension;
        if step == 0 || input.is_empty() || input.len() % step != 0 {
            return Err(ModelError::InputShape { len: input.len(), batch_size, input_dimension: self.input_dimension });
        }
        let time_steps = input.len() / step;
        match self.scheme {
            QuantScheme::Int8Activations => self.run_with::<Int8Activations>(input, batch_size, time_steps),
            QuantScheme::Int16Activations => self.run_with::<Int16Activations>(input, batch_size, time_steps),
        }
    }

    /// Independent sequences in parallel, each from the model's initial state.
    pub fn run_batch(&self, sequences: &[Vec<f32>], batch_size: usize) -> Vec<Result<LstmRun, ModelError>> {
        sequences.par_iter().map(|seq| self.run(seq, batch_size)).collect()
    }

    fn run_with<C: LstmConfig>(&self, input: &[f32], batch_size: usize, time_steps: usize) -> Result<LstmRun, ModelError> {
        let (s, i) = (self.state_dimension, self.input_dimension);
        let q = &self.quantization;
        let input_dims =
            if self.params.time_major { [time_steps, batch_size, i] } else { [batch_size, time_steps, i] };
        let output_shape = [input_dims[0], input_dims[1], s];

        let mut q_input = vec![C::Activation::default(); input.len()];
        quantize(input, &mut q_input, q.input);
        let gates: Vec<OwnedGate<C>> = Gate::ALL.iter().map(|&g| OwnedGate::new(self.gate(g))).collect();
        let mut hidden: Vec<C::Activation> =
            initial_state(self.initial_hidden_state.as_deref(), s, batch_size, q.hidden_state.zero_point);
        let mut cell: Vec<CellType> = initial_state(self.initial_cell_state.as_deref(), s, batch_size, 0);
        let mut output = vec![C::Activation::default(); output_shape.iter().product()];

        let mut slots = TensorSlots::new().with(LstmTensor::Input, EvalTensor::shared(&input_dims, &q_input[..]));
        for (gate, owned) in Gate::ALL.iter().zip(&gates) {
            slots.set(gate.input_weights(), EvalTensor::shared(&[s, i], &owned.input_weights[..]));
            slots.set(gate.recurrent_weights(), EvalTensor::shared(&[s, s], &owned.recurrent_weights[..]));
            if let Some(bias) = &owned.bias {
                slots.set(gate.bias(), EvalTensor::shared(&[s], &bias[..]));
            }
        }
        slots.set(LstmTensor::OutputState, EvalTensor::exclusive(&[batch_size, s], &mut hidden[..]));
        slots.set(LstmTensor::CellState, EvalTensor::exclusive(&[batch_size, s], &mut cell[..]));
        let out = EvalTensor::exclusive(&output_shape, &mut output[..]);

        let op = IntegerLstmOp::prepare(&slots, &out, &self.params, q)?;
        let mut scratch = op.scratch();
        if op.invoke(slots, out, &mut scratch) != Status::Ok {
            return Err(ModelError::Invoke);
        }

        let mut run = LstmRun {
            output_shape,
            output: vec![0.0; output.len()],
            hidden_state: vec![0.0; hidden.len()],
            cell_state: vec![0.0; cell.len()],
        };
        dequantize(&output, &mut run.output, q.hidden_state);
        dequantize(&hidden, &mut run.hidden_state, q.hidden_state);
        dequantize(&cell, &mut run.cell_state, q.cell_state);
        Ok(run)
    }

    /// A seeded random model with symmetric per-tensor weight quantization.
    /// The forget gate bias is centered on 1.
    pub fn random(spec: &RandomModelSpec, seed: u64) -> Result<Self, ModelError> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let (s, i) = (spec.state_dimension, spec.input_dimension);
        if s == 0 || i == 0 {
            return Err(ModelError::EmptyDimension);
        }
        let weights = Normal::new(0.0f32, spec.weight_std.abs())?;
        let biases = Normal::new(0.0f32, 0.1)?;

        let (input_q, hidden_q) = match spec.scheme {
            QuantScheme::Int8Activations => (TensorQuantization::new(1.0 / 64.0, 3), TensorQuantization::symmetric(1.0 / 128.0)),
            QuantScheme::Int16Activations => {
                (TensorQuantization::symmetric(1.0 / 4096.0), TensorQuantization::symmetric(1.0 / 32768.0))
            }
        };

        let mut random_gate = |gate: Gate| -> (GateWeights, GateQuantization) {
            let (input_weights, activation_weight) = random_matrix(&mut rng, &weights, s * i);
            let (recurrent_weights, recurrent_weight) = random_matrix(&mut rng, &weights, s * s);
            let center = if gate == Gate::Forget { 1.0 } else { 0.0 };
            let bias_scale = input_q.scale as f64 * activation_weight.scale as f64;
            let bias = (0..s).map(|_| ((center + biases.sample(&mut rng)) as f64 / bias_scale).round() as i64).collect();
            (
                GateWeights { input_weights, recurrent_weights, bias: Some(bias) },
                GateQuantization { activation_weight, recurrent_weight },
            )
        };
        let (forget_gate, forget_q) = random_gate(Gate::Forget);
        let (input_gate, input_gate_q) = random_gate(Gate::Input);
        let (cell_gate, cell_q) = random_gate(Gate::Cell);
        let (output_gate, output_q) = random_gate(Gate::Output);

        let quantization = LstmQuantization {
            input: input_q,
            hidden_state: hidden_q,
            cell_state: TensorQuantization::symmetric(2f32.powi(spec.cell_scale_power)),
            forget_gate: forget_q,
            input_gate: input_gate_q,
            cell_gate: cell_q,
            output_gate: output_q,
            nonlinear_activation_input_scale: DEFAULT_NONLINEAR_INPUT_SCALE,
            nonlinear_activation_output_scale: DEFAULT_NONLINEAR_OUTPUT_SCALE,
        };
        let model = Self {
            scheme: spec.scheme,
            input_dimension: i,
            state_dimension: s,
            params: spec.params,
            quantization,
            forget_gate,
            input_gate,
            cell_gate,
            output_gate,
            initial_hidden_state: None,
            initial_cell_state: None,
        };
        model.validate()?;
        debug!("random {:?} model {}x{} seed {}", spec.scheme, i, s, seed);
        Ok(model)
    }
}

/// Samples a real matrix and quantizes it symmetrically to its max magnitude.
fn random_matrix(rng: &mut SmallRng, dist: &Normal<f32>, len: usize) -> (Vec<i8>, TensorQuantization) {
    let real: Vec<f32> = (0..len).map(|_| dist.sample(rng)).collect();
    let max = real.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    let q = TensorQuantization::symmetric(if max > 0.0 { max / 127.0 } else { 1.0 });
    let mut ints = vec![0i8; len];
    quantize(&real, &mut ints, q);
    (ints, q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_round_trip_preserves_model() {
        let model = LstmModel::random(&RandomModelSpec::default(), 7).unwrap();
        let text = model.to_json().unwrap();
        let back = LstmModel::from_json(&text).unwrap();
        assert_eq!(model, back);
    }

    #[test]
    fn validate_rejects_bad_lengths_and_ranges() {
        let mut model = LstmModel::random(&RandomModelSpec::default(), 1).unwrap();
        model.cell_gate.recurrent_weights.pop();
        assert!(matches!(model.validate(), Err(ModelError::Length { expected: 4, found: 3, .. })));

        let spec = RandomModelSpec { scheme: QuantScheme::Int8Activations, ..Default::default() };
        let mut model = LstmModel::random(&spec, 1).unwrap();
        model.input_gate.bias = Some(vec![i64::from(i32::MAX) + 1, 0]);
        assert!(matches!(model.validate(), Err(ModelError::OutOfRange { kind: ElementKind::Int32, .. })));

        let mut model = LstmModel::random(&RandomModelSpec::default(), 1).unwrap();
        model.quantization.cell_state.scale = 0.3;
        assert!(matches!(model.validate(), Err(ModelError::Lstm(_))));
    }

    #[test]
    fn run_rejects_ragged_input() {
        let model = LstmModel::random(&RandomModelSpec::default(), 3).unwrap();
        assert!(matches!(model.run(&[0.0; 5], 1), Err(ModelError::InputShape { len: 5, .. })));
        assert!(matches!(model.run(&[], 1), Err(ModelError::InputShape { .. })));
    }

    #[test]
    fn run_batch_matches_sequential_runs() {
        let model = LstmModel::random(&RandomModelSpec::default(), 11).unwrap();
        let seqs = vec![vec![0.25f32, -0.5, 0.75, 0.0], vec![-0.125f32, 0.5, 0.0, 1.0, 0.5, -0.5]];
        let parallel = model.run_batch(&seqs, 1);
        for (seq, run) in seqs.iter().zip(parallel) {
            assert_eq!(run.unwrap(), model.run(seq, 1).unwrap());
        }
    }
}
