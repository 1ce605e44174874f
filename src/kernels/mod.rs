//! Integer reference kernels consumed by the LSTM step.
//!
//! None of these allocate; callers pass exactly-sized slices.

pub mod activation;
pub mod elementwise;
pub mod fully_connected;
pub mod mul;

pub use activation::{logistic, logistic_in_place, tanh, tanh_in_place};
pub use elementwise::{cwise_add_assign, cwise_clipping};
pub use fully_connected::{fully_connected, Accumulator, FullyConnectedParams};
pub use mul::{mul_elementwise, mul_elementwise_assign, ArithmeticParams};
