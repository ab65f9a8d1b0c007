//! Orchestrator for a chain of pipe stages.
//!
//! The pipeline owns every stage in an arena; stages refer to their
//! neighbors by index, so teardown is a plain drop with no ownership cycles.
//! `push_pipe` links at the head (the input-producing end), matching the
//! construction order of a chain that grows toward its source.
//!
//! `progress` is a single non-draining pass: it walks the chain head to
//! tail, yielding to the cooperative scheduler before each stage's transfer.
//! Steady state is a caller-driven loop:
//!
//! ```ignore
//! loop {
//!     pipeline.progress().await?;
//! }
//! ```

use std::error::Error;
use std::fmt;

use tracing::{debug, warn};

use super::stage::{Stage, StageError, StageState};

/// Pipeline-level failure, sticky once raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A stage faulted; the whole pipeline has begun draining.
    Faulted { stage: usize, source: StageError },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Faulted { stage, source } => {
                write!(f, "pipeline faulted at stage {stage}: {source}")
            }
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Faulted { source, .. } => Some(source),
        }
    }
}

struct StageSlot {
    stage: Box<dyn Stage>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered chain of stages. Head is the input-producing end.
#[derive(Default)]
pub struct Pipeline {
    slots: Vec<StageSlot>,
    head: Option<usize>,
    fault: Option<PipelineError>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links a stage at the head of the chain; the previous head becomes its
    /// successor. Returns the stage's arena index.
    pub fn push_pipe(&mut self, stage: Box<dyn Stage>) -> usize {
        let idx = self.slots.len();
        self.slots.push(StageSlot {
            stage,
            prev: None,
            next: self.head,
        });
        if let Some(old_head) = self.head {
            self.slots[old_head].prev = Some(idx);
        }
        self.head = Some(idx);
        debug!(stage = idx, "stage linked at pipeline head");
        idx
    }

    pub fn stage_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// State of the stage at `idx` (arena index from [`push_pipe`]).
    ///
    /// [`push_pipe`]: Pipeline::push_pipe
    pub fn stage_state(&self, idx: usize) -> StageState {
        self.slots[idx].stage.state()
    }

    /// Runs one progress step across all stages in chain order, yielding to
    /// the scheduler before each stage.
    ///
    /// A stage fault drains the whole pipeline and surfaces here; later
    /// calls keep returning the same error.
    pub async fn progress(&mut self) -> Result<(), PipelineError> {
        if let Some(err) = &self.fault {
            return Err(err.clone());
        }

        let mut cursor = self.head;
        while let Some(idx) = cursor {
            tokio::task::yield_now().await;
            if let Err(source) = self.slots[idx].stage.transfer().await {
                warn!(stage = idx, error = %source, "stage fault; draining pipeline");
                self.begin_drain();
                let err = PipelineError::Faulted { stage: idx, source };
                self.fault = Some(err.clone());
                return Err(err);
            }
            cursor = self.slots[idx].next;
        }
        Ok(())
    }

    /// Asks every stage to stop submitting new transfers.
    pub fn begin_drain(&mut self) {
        for slot in &mut self.slots {
            slot.stage.begin_drain();
        }
    }

    /// Cancels the pipeline: drains every stage and drives each to its
    /// terminal state. Deterministic and idempotent.
    pub async fn cancel(&mut self) {
        self.begin_drain();
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            // A draining stage terminates on its next step; faulted stages
            // stay faulted.
            let _ = self.slots[idx].stage.transfer().await;
            cursor = self.slots[idx].next;
        }
    }
}
