use super::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where a screen stands within its current iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IterationState {
    Seeded,
    BatchSelected,
    BatchEvaluated,
    ModelTrained,
    CutoffCalibrated,
    PredictionsReady,
}

impl IterationState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Seeded => "seeded",
            Self::BatchSelected => "batch-selected",
            Self::BatchEvaluated => "batch-evaluated",
            Self::ModelTrained => "model-trained",
            Self::CutoffCalibrated => "cutoff-calibrated",
            Self::PredictionsReady => "predictions-ready",
        }
    }
}

impl fmt::Display for IterationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Select,
    ImportResults,
    Train,
    Calibrate,
    ShardPredictions,
    ImportPredictions,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Select,
        Action::ImportResults,
        Action::Train,
        Action::Calibrate,
        Action::ShardPredictions,
        Action::ImportPredictions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::ImportResults => "import-results",
            Self::Train => "train",
            Self::Calibrate => "calibrate",
            Self::ShardPredictions => "shard-predictions",
            Self::ImportPredictions => "import-predictions",
        }
    }

    pub fn allowed_from(self) -> &'static [IterationState] {
        use IterationState::*;
        match self {
            Self::Select => &[Seeded, PredictionsReady, BatchSelected],
            Self::ImportResults => &[BatchSelected, BatchEvaluated],
            Self::Train => &[BatchEvaluated, ModelTrained],
            Self::Calibrate => &[ModelTrained, CutoffCalibrated],
            Self::ShardPredictions => &[CutoffCalibrated],
            Self::ImportPredictions => &[CutoffCalibrated, PredictionsReady],
        }
    }

    /// State after a successful run; `None` leaves the state unchanged.
    pub fn result_state(self) -> Option<IterationState> {
        match self {
            Self::Select => Some(IterationState::BatchSelected),
            Self::ImportResults => Some(IterationState::BatchEvaluated),
            Self::Train => Some(IterationState::ModelTrained),
            Self::Calibrate => Some(IterationState::CutoffCalibrated),
            Self::ShardPredictions => None,
            Self::ImportPredictions => Some(IterationState::PredictionsReady),
        }
    }

    /// The action that produces the state this one needs.
    pub fn prerequisite(self) -> Action {
        match self {
            Self::Select => Self::ImportPredictions,
            Self::ImportResults => Self::Select,
            Self::Train => Self::ImportResults,
            Self::Calibrate => Self::Train,
            Self::ShardPredictions => Self::Calibrate,
            Self::ImportPredictions => Self::ShardPredictions,
        }
    }

    pub fn check(self, state: IterationState) -> Result<(), EngineError> {
        if self.allowed_from().contains(&state) {
            Ok(())
        } else {
            Err(EngineError::NotAllowed {
                action: self,
                state,
                required: self.prerequisite(),
            })
        }
    }

    /// Stable index used when deriving per-action random seeds.
    pub(crate) fn ordinal(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted progress of one screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenRecord {
    pub state: IterationState,
    /// Active iteration; 0 until the first batch is selected.
    pub iteration: u32,
    pub cutoffs: BTreeMap<u32, f64>,
}

impl Default for ScreenRecord {
    fn default() -> Self {
        Self {
            state: IterationState::Seeded,
            iteration: 0,
            cutoffs: BTreeMap::new(),
        }
    }
}

impl ScreenRecord {
    pub fn cutoff(&self, iteration: u32) -> Option<f64> {
        self.cutoffs.get(&iteration).copied()
    }

    /// Iteration a `select` run from the current state works on.
    pub fn selection_iteration(&self) -> u32 {
        match self.state {
            IterationState::Seeded => 1,
            IterationState::PredictionsReady => self.iteration + 1,
            _ => self.iteration.max(1),
        }
    }
}
