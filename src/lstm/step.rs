use crate::lstm::params::LstmSizeInfo;

/// Position of the current step inside the input, output and state buffers.
///
/// Time-major sequences process the whole batch per step, so the state shape
/// is `[batch, state]` and state offsets never move. Batch-major sequences
/// process one batch row at a time, moving the state offsets to the next row
/// on [`StepManager::update_batch`].
#[derive(Debug, Clone)]
pub struct StepManager {
    size_info: LstmSizeInfo,
    current_time: usize,
    current_batch: usize,
    input_offset: usize,
    output_offset: usize,
    hidden_state_offset: usize,
    cell_state_offset: usize,
}

impl StepManager {
    pub fn new(size_info: LstmSizeInfo) -> Self {
        Self {
            size_info,
            current_time: 0,
            current_batch: 0,
            input_offset: 0,
            output_offset: 0,
            hidden_state_offset: 0,
            cell_state_offset: 0,
        }
    }

    pub fn update_time(&mut self) {
        self.current_time += 1;
        debug_assert!(self.current_time <= self.size_info.time_steps);
        let (rows, _) = self.input_shape();
        self.input_offset += rows * self.size_info.input_dimension;
        self.output_offset += rows * self.size_info.state_dimension;
    }

    pub fn update_batch(&mut self) {
        self.current_batch += 1;
        debug_assert!(self.current_batch <= self.size_info.batch_size);
        if self.size_info.time_major { return; }
        self.hidden_state_offset += self.size_info.state_dimension;
        self.cell_state_offset += self.size_info.state_dimension;
    }

    pub fn reset_time(&mut self) { self.current_time = 0; }

    fn rows(&self) -> usize { if self.size_info.time_major { self.size_info.batch_size } else { 1 } }

    /// `[rows, input_dimension]` of the input slice consumed by one step.
    pub fn input_shape(&self) -> (usize, usize) { (self.rows(), self.size_info.input_dimension) }

    /// `[rows, state_dimension]` of the state slice updated by one step.
    pub fn state_shape(&self) -> (usize, usize) { (self.rows(), self.size_info.state_dimension) }

    pub fn input_len(&self) -> usize { self.rows() * self.size_info.input_dimension }

    pub fn state_len(&self) -> usize { self.rows() * self.size_info.state_dimension }

    pub fn current_time(&self) -> usize { self.current_time }
    pub fn current_batch(&self) -> usize { self.current_batch }
    pub fn input_offset(&self) -> usize { self.input_offset }
    pub fn output_offset(&self) -> usize { self.output_offset }
    pub fn hidden_state_offset(&self) -> usize { self.hidden_state_offset }
    pub fn cell_state_offset(&self) -> usize { self.cell_state_offset }

    pub fn size_info(&self) -> &LstmSizeInfo { &self.size_info }
}
