use qlstm::lstm::gate::calculate_lstm_gate;
use qlstm::lstm::params::{cell_state_scale_power, create_fc_params, create_inter_gate_mul_params, quantize_cell_clip};
use qlstm::lstm::{
    FusedActivation, GateTensors, Int16Activations, LstmParams, LstmQuantization, LstmSizeInfo, OpDataLstm, QuantScheme,
    StepManager,
};
use qlstm::quant::{dequantize_multiplier, TensorQuantization};
use qlstm::LstmError;

fn size(time_major: bool) -> LstmSizeInfo {
    LstmSizeInfo { time_major, batch_size: 2, time_steps: 3, input_dimension: 4, state_dimension: 5 }
}

#[test]
fn time_major_steps_cover_the_whole_batch() {
    let mut step = StepManager::new(size(true));
    assert_eq!(step.input_shape(), (2, 4));
    assert_eq!(step.state_shape(), (2, 5));
    step.update_time();
    assert_eq!((step.current_time(), step.input_offset(), step.output_offset()), (1, 8, 10));
    step.update_time();
    assert_eq!((step.input_offset(), step.output_offset()), (16, 20));
    step.update_batch();
    assert_eq!((step.hidden_state_offset(), step.cell_state_offset()), (0, 0));
}

#[test]
fn batch_major_steps_walk_one_row() {
    let mut step = StepManager::new(size(false));
    assert_eq!(step.input_shape(), (1, 4));
    assert_eq!(step.state_len(), 5);
    for _ in 0..3 {
        step.update_time();
    }
    assert_eq!((step.input_offset(), step.output_offset()), (12, 15));
    step.update_batch();
    step.reset_time();
    assert_eq!(step.current_time(), 0);
    assert_eq!(step.current_batch(), 1);
    assert_eq!((step.hidden_state_offset(), step.cell_state_offset()), (5, 5));
    // offsets keep running into the second batch row
    step.update_time();
    assert_eq!((step.input_offset(), step.output_offset()), (16, 20));
}

#[test]
fn size_info_follows_layout() {
    let tm = LstmSizeInfo::from_input_shape(&[3, 2, 4], 5, true).unwrap();
    let bm = LstmSizeInfo::from_input_shape(&[2, 3, 4], 5, false).unwrap();
    assert_eq!(tm, size(true));
    assert_eq!(bm, size(false));
    assert_eq!(bm.output_len(), 30);
    assert_eq!(bm.state_len(), 10);
    assert!(matches!(LstmSizeInfo::from_input_shape(&[2, 4], 5, false), Err(LstmError::InvalidInputRank(_))));
}

#[test]
fn fc_multipliers_round_trip() {
    for input in [1.0 / 4096.0f32, 0.0078125, 0.02, 0.3] {
        for weight in [0.001f32, 0.0125, 0.07] {
            for nl in [1.0 / 4096.0f32, 1.0 / 2048.0] {
                let p = create_fc_params(TensorQuantization::new(input, 2), TensorQuantization::symmetric(weight), nl);
                let expected = input as f64 * weight as f64 / nl as f64;
                let got = dequantize_multiplier(p.output_multiplier, p.output_shift);
                assert!(((got - expected) / expected).abs() < 1e-3, "{} vs {}", got, expected);
                assert_eq!(p.input_offset, -2);
            }
        }
    }
}

#[test]
fn inter_gate_multipliers_round_trip() {
    for (a, b, out) in [(1.0 / 32768.0f32, 1.0 / 4096.0f32, 1.0 / 4096.0f32), (1.0 / 32768.0, 1.0 / 32768.0, 1.0 / 2048.0), (1.0 / 32768.0, 1.0 / 32768.0, 0.0078125)] {
        let p = create_inter_gate_mul_params(a, b, out, 0, (-128, 127));
        let expected = a as f64 * b as f64 / out as f64;
        let got = dequantize_multiplier(p.output_multiplier, p.output_shift);
        assert!(((got - expected) / expected).abs() < 1e-3);
        assert_eq!((p.quantized_activation_min, p.quantized_activation_max), (-128, 127));
    }
}

#[test]
fn cell_scale_must_be_power_of_two() {
    assert_eq!(cell_state_scale_power(1.0 / 4096.0).unwrap(), -12);
    assert_eq!(cell_state_scale_power(1.0 / 2048.0).unwrap(), -11);
    assert!(matches!(cell_state_scale_power(0.0003), Err(LstmError::CellScaleNotPowerOfTwo(_))));
}

#[test]
fn cell_clip_is_saturated_to_int16() {
    assert_eq!(quantize_cell_clip(0.0, 1.0 / 4096.0), 0);
    assert_eq!(quantize_cell_clip(0.25, 1.0 / 4096.0), 1024);
    assert_eq!(quantize_cell_clip(100.0, 1.0 / 4096.0), i16::MAX);
}

#[test]
fn derivation_is_deterministic() {
    let q: LstmQuantization = serde_json::from_str(
        r#"{
            "input": {"scale": 0.000244140625},
            "hidden_state": {"scale": 0.000030517578125},
            "cell_state": {"scale": 0.000244140625},
            "forget_gate": {"activation_weight": {"scale": 0.01}, "recurrent_weight": {"scale": 0.02}},
            "input_gate": {"activation_weight": {"scale": 0.01}, "recurrent_weight": {"scale": 0.02}},
            "cell_gate": {"activation_weight": {"scale": 0.01}, "recurrent_weight": {"scale": 0.02}},
            "output_gate": {"activation_weight": {"scale": 0.01}, "recurrent_weight": {"scale": 0.02}}
        }"#,
    )
    .unwrap();
    let params = LstmParams { cell_clip: 1.5, ..Default::default() };
    let a = OpDataLstm::derive(size(false), &params, &q, QuantScheme::Int16Activations).unwrap();
    let b = OpDataLstm::derive(size(false), &params, &q, QuantScheme::Int16Activations).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.cell_state_info.quantized_cell_clip, 6144);
    assert_eq!(a.cell_gate_nonlinear_type, FusedActivation::Tanh);
    let out = a.inter_gate_parameters.output_mul_params;
    assert_eq!((out.quantized_activation_min, out.quantized_activation_max), (-32768, 32767));
}

#[test]
fn zero_gate_is_one_half_after_sigmoid() {
    let size = LstmSizeInfo { time_major: false, batch_size: 1, time_steps: 1, input_dimension: 2, state_dimension: 2 };
    let step = StepManager::new(size);
    let zeros = [0i8; 4];
    let tensors = GateTensors::<Int16Activations> { input_weight: &zeros, recurrent_weight: &zeros, bias: None, recurrent_bias: None };
    let params = qlstm::lstm::params::create_gate_params(
        TensorQuantization::symmetric(1.0 / 4096.0),
        TensorQuantization::symmetric(1.0 / 32768.0),
        &qlstm::lstm::GateQuantization {
            activation_weight: TensorQuantization::symmetric(0.01),
            recurrent_weight: TensorQuantization::symmetric(0.01),
        },
        1.0 / 4096.0,
    );
    let (mut out, mut buf) = ([0i16; 2], [0i16; 2]);
    calculate_lstm_gate::<Int16Activations>(&step, &params, &tensors, &[100, -100], &[300, 7], &mut out, &mut buf, FusedActivation::Sigmoid);
    assert_eq!(out, [16384, 16384]);
    calculate_lstm_gate::<Int16Activations>(&step, &params, &tensors, &[100, -100], &[300, 7], &mut out, &mut buf, FusedActivation::Tanh);
    assert_eq!(out, [0, 0]);
}

#[test]
#[should_panic(expected = "unsupported LSTM gate activation")]
fn gate_panics_on_unsupported_activation() {
    let size = LstmSizeInfo { time_major: false, batch_size: 1, time_steps: 1, input_dimension: 1, state_dimension: 1 };
    let step = StepManager::new(size);
    let w = [1i8];
    let tensors = GateTensors::<Int16Activations> { input_weight: &w, recurrent_weight: &w, bias: None, recurrent_bias: None };
    let params = Default::default();
    let (mut out, mut buf) = ([0i16; 1], [0i16; 1]);
    calculate_lstm_gate::<Int16Activations>(&step, &params, &tensors, &[1], &[1], &mut out, &mut buf, FusedActivation::Relu);
}
