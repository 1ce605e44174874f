//! Integer-only LSTM inference for embedded runtimes.

pub mod error;
pub mod kernels;
pub mod lstm;
pub mod model;
pub mod quant;
pub mod tensor;

// Re-exports for host glue and binaries
pub use error::{LstmError, ModelError, Status};
pub use lstm::{IntegerLstmOp, LstmParams, LstmQuantization, QuantScheme, TensorSlots};
pub use model::{LstmModel, LstmRun, RandomModelSpec};
