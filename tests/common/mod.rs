#![allow(dead_code)]

use qlstm::lstm::{FusedActivation, Gate};
use qlstm::quant::{dequantize, quantize};
use qlstm::{LstmModel, QuantScheme};

/// Real-valued LSTM built from a model's dequantized integer weights.
pub struct FloatLstm {
    pub input_dimension: usize,
    pub state_dimension: usize,
    /// Per gate (forget, input, cell, output): input weights, recurrent weights, bias.
    gates: Vec<(Vec<f64>, Vec<f64>, Vec<f64>)>,
    cell_tanh: bool,
    cell_clip: f64,
    time_major: bool,
    /// Hidden state is rounded to this step after every update.
    hidden_scale: f64,
    hidden_zero_point: f64,
}

pub struct FloatRun {
    pub output: Vec<f64>,
    pub hidden_state: Vec<f64>,
    pub cell_state: Vec<f64>,
}

fn sigmoid(x: f64) -> f64 { 1.0 / (1.0 + (-x).exp()) }

impl FloatLstm {
    pub fn from_model(model: &LstmModel) -> Self {
        let q = &model.quantization;
        let gates = Gate::ALL
            .iter()
            .map(|&g| {
                let w = model.gate(g);
                let gq = model.gate_quantization(g);
                let wi = w.input_weights.iter().map(|&v| v as f64 * gq.activation_weight.scale as f64).collect();
                let wr = w.recurrent_weights.iter().map(|&v| v as f64 * gq.recurrent_weight.scale as f64).collect();
                let bias_scale = q.input.scale as f64 * gq.activation_weight.scale as f64;
                let b = match &w.bias {
                    Some(b) => b.iter().map(|&v| v as f64 * bias_scale).collect(),
                    None => vec![0.0; model.state_dimension],
                };
                (wi, wr, b)
            })
            .collect();
        Self {
            input_dimension: model.input_dimension,
            state_dimension: model.state_dimension,
            gates,
            cell_tanh: model.params.activation == FusedActivation::Tanh,
            cell_clip: model.params.cell_clip as f64,
            time_major: model.params.time_major,
            hidden_scale: q.hidden_state.scale as f64,
            hidden_zero_point: q.hidden_state.zero_point as f64,
        }
    }

    fn gate(&self, g: usize, x: &[f64], h: &[f64], out: &mut [f64]) {
        let (wi, wr, b) = &self.gates[g];
        let (s, i) = (self.state_dimension, self.input_dimension);
        for r in 0..s {
            let mut acc = b[r];
            for k in 0..i {
                acc += wi[r * i + k] * x[k];
            }
            for k in 0..s {
                acc += wr[r * s + k] * h[k];
            }
            out[r] = acc;
        }
    }

    /// `input` holds real values already on the model's input grid.
    pub fn run(&self, input: &[f64], batch_size: usize, h0: &[f64], c0: &[f64]) -> FloatRun {
        let (s, i) = (self.state_dimension, self.input_dimension);
        let steps = input.len() / (batch_size * i);
        let mut h = h0.to_vec();
        let mut c = c0.to_vec();
        let mut output = vec![0.0; batch_size * steps * s];
        let (mut f, mut ig, mut g, mut o) = (vec![0.0; s], vec![0.0; s], vec![0.0; s], vec![0.0; s]);
        for b in 0..batch_size {
            for t in 0..steps {
                let row = if self.time_major { t * batch_size + b } else { b * steps + t };
                let x = &input[row * i..(row + 1) * i];
                let hb = h[b * s..(b + 1) * s].to_vec();
                self.gate(0, x, &hb, &mut f);
                self.gate(1, x, &hb, &mut ig);
                self.gate(2, x, &hb, &mut g);
                self.gate(3, x, &hb, &mut o);
                for r in 0..s {
                    let cand = if self.cell_tanh { g[r].tanh() } else { sigmoid(g[r]) };
                    let mut cell = sigmoid(f[r]) * c[b * s + r] + sigmoid(ig[r]) * cand;
                    if self.cell_clip > 0.0 {
                        cell = cell.clamp(-self.cell_clip, self.cell_clip);
                    }
                    c[b * s + r] = cell;
                    let hidden = sigmoid(o[r]) * cell.tanh();
                    let grid = (hidden / self.hidden_scale).round() + self.hidden_zero_point;
                    h[b * s + r] = (grid - self.hidden_zero_point) * self.hidden_scale;
                    output[row * s + r] = h[b * s + r];
                }
            }
        }
        FloatRun { output, hidden_state: h, cell_state: c }
    }
}

/// Deterministic real input in [-1, 1).
pub fn ramp_input(len: usize) -> Vec<f32> {
    (0..len).map(|k| (((k * 7 + 3) % 16) as f32 - 8.0) / 8.0).collect()
}

/// Snaps `input` onto the model's input grid, as the runner sees it.
pub fn on_input_grid(model: &LstmModel, input: &[f32]) -> Vec<f64> {
    let q = model.quantization.input;
    let mut real = vec![0.0f32; input.len()];
    match model.scheme {
        QuantScheme::Int8Activations => {
            let mut ints = vec![0i8; input.len()];
            quantize(input, &mut ints, q);
            dequantize(&ints, &mut real, q);
        }
        QuantScheme::Int16Activations => {
            let mut ints = vec![0i16; input.len()];
            quantize(input, &mut ints, q);
            dequantize(&ints, &mut real, q);
        }
    }
    real.into_iter().map(f64::from).collect()
}

pub fn assert_close(what: &str, got: &[f32], expected: &[f64], tol: f64) {
    assert_eq!(got.len(), expected.len(), "{} length", what);
    for (k, (g, e)) in got.iter().zip(expected).enumerate() {
        let err = (*g as f64 - e).abs();
        assert!(err <= tol, "{}[{}]: got {} expected {} (err {:.2e} > {:.0e})", what, k, g, e, err, tol);
    }
}
