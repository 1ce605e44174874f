//! Fully quantized unidirectional sequence LSTM.
//!
//! [`IntegerLstmOp::prepare`] validates the tensor layout and derives every
//! fixed-point parameter once; [`IntegerLstmOp::invoke`] then walks the
//! sequence with [`eval::lstm_step`], carrying hidden and cell state in the
//! caller's buffers.

pub mod eval;
pub mod gate;
pub mod op;
pub mod params;
pub mod step;
pub mod tensors;
pub mod types;
pub mod update;

pub use eval::{eval_lstm, lstm_step};
pub use op::{IntegerLstmOp, REGISTRATION_NAME};
pub use params::{FusedActivation, GateQuantization, LstmParams, LstmQuantization, LstmSizeInfo, OpDataLstm};
pub use step::StepManager;
pub use tensors::{Gate, GateTensors, LstmKernelContents, LstmTensor, ScratchBuffers, TensorSlots};
pub use types::{CellType, Int16Activations, Int8Activations, LstmConfig, QuantScheme};
