//! Test double that records every boundary call and can be told to fail.

use super::Reservoir;
use crate::error::ReservoirError;
use crate::types::InputVector;

#[derive(Debug, Clone, PartialEq)]
pub enum ReservoirCall {
    Initialize { neuron_count: i32, fanout: i32 },
    ApplyInputs { max: f32, active: usize },
    Step,
    ExportSummary,
}

#[derive(Debug, Default)]
pub struct RecordingReservoir {
    pub calls: Vec<ReservoirCall>,
    pub summary: String,
    pub refuse_init: bool,
    pub fail_apply: bool,
    /// Fail the n-th `step` call (1-based).
    pub fail_step_at: Option<usize>,
    pub fail_export: bool,
    steps: usize,
}

impl RecordingReservoir {
    pub fn new(summary: impl Into<String>) -> Self {
        RecordingReservoir {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn step_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, ReservoirCall::Step))
            .count()
    }

    pub fn exported(&self) -> bool {
        self.calls.contains(&ReservoirCall::ExportSummary)
    }
}

impl Reservoir for RecordingReservoir {
    fn initialize(&mut self, neuron_count: i32, fanout: i32) -> bool {
        self.calls.push(ReservoirCall::Initialize {
            neuron_count,
            fanout,
        });
        !self.refuse_init
    }

    fn apply_inputs(&mut self, vector: &InputVector) -> Result<(), ReservoirError> {
        self.calls.push(ReservoirCall::ApplyInputs {
            max: vector.max(),
            active: vector.active(),
        });
        if self.fail_apply {
            return Err(ReservoirError::engine("apply_inputs", "injected failure"));
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), ReservoirError> {
        self.calls.push(ReservoirCall::Step);
        self.steps += 1;
        if self.fail_step_at == Some(self.steps) {
            return Err(ReservoirError::engine("step", "injected failure"));
        }
        Ok(())
    }

    fn export_summary(&mut self) -> Result<String, ReservoirError> {
        self.calls.push(ReservoirCall::ExportSummary);
        if self.fail_export {
            return Err(ReservoirError::engine("export_summary", "injected failure"));
        }
        Ok(self.summary.clone())
    }
}
