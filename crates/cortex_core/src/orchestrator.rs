//! One perception→cognition cycle as an explicit state machine.
//!
//! ```text
//! Idle → Translating → Encoding → Applying → Stepping → Exporting
//!      → Interpreting → Archiving → Idle
//! any non-terminal state → Failed
//! ```
//!
//! Agent failures never fail a cycle: the agent client answers with a role
//! default instead. Only reservoir boundary errors move a cycle to `Failed`.
//! The reservoir is not rolled back on failure; apply and step calls made
//! before the error stay applied.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::agent::prompts::{CognitiveRequest, TranslateRequest};
use crate::agent::{AgentClient, ReplySource};
use crate::archive::{ArchivedMemory, MemoryArchive, MemoryOrigin};
use crate::encoder::SensoryEncoder;
use crate::error::CortexError;
use crate::reservoir::SharedReservoir;
use crate::types::{CognitiveOutput, InputVector, TranslatorOutput};

/// Reservoir steps between applying the input and exporting the summary.
pub const STEPS_PER_CYCLE: usize = 4;

/// Cap on the raw-response fallback surfaced as user text.
pub const USER_TEXT_LIMIT: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Translating,
    Encoding,
    Applying,
    Stepping,
    Exporting,
    Interpreting,
    Archiving,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub user_text: String,
    pub translator: TranslatorOutput,
    pub translator_source: ReplySource,
    pub active_inputs: usize,
    pub brain_summary: String,
    pub cognitive: CognitiveOutput,
    pub cognitive_source: ReplySource,
    pub trail: Vec<CycleState>,
}

#[derive(Debug, Error)]
#[error("cycle failed while {failed_in:?}: {source}")]
pub struct CycleFailure {
    pub failed_in: CycleState,
    pub trail: Vec<CycleState>,
    /// True once the cycle reached `Applying`: reservoir state may have changed.
    pub partial_mutation: bool,
    #[source]
    pub source: CortexError,
}

/// Tracks the states one cycle passes through. Only terminal states are
/// published to `last_state`; a cycle dropped mid-way publishes `Failed`.
struct Cycle<'a> {
    last_state: &'a Mutex<CycleState>,
    trail: Vec<CycleState>,
    finished: bool,
}

impl<'a> Cycle<'a> {
    fn begin(last_state: &'a Mutex<CycleState>) -> Self {
        Cycle {
            last_state,
            trail: vec![CycleState::Idle],
            finished: false,
        }
    }

    fn enter(&mut self, state: CycleState) {
        debug!(state = ?state, "Cycle transition");
        self.trail.push(state);
    }

    fn current(&self) -> CycleState {
        self.trail.last().copied().unwrap_or(CycleState::Idle)
    }

    fn settle(&mut self, terminal: CycleState) -> Vec<CycleState> {
        self.enter(terminal);
        *lock(self.last_state) = terminal;
        self.finished = true;
        std::mem::take(&mut self.trail)
    }

    fn finish(mut self) -> Vec<CycleState> {
        self.settle(CycleState::Idle)
    }

    fn fail(mut self, source: CortexError) -> CycleFailure {
        let failed_in = self.current();
        let partial_mutation = failed_in >= CycleState::Applying;
        error!(
            failed_in = ?failed_in,
            partial_mutation = partial_mutation,
            error = %source,
            "Cycle failed; reservoir state is not rolled back"
        );
        CycleFailure {
            failed_in,
            trail: self.settle(CycleState::Failed),
            partial_mutation,
            source,
        }
    }
}

impl Drop for Cycle<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(abandoned_in = ?self.current(), "Cycle dropped before finishing");
            *lock(self.last_state) = CycleState::Failed;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cognitive `user_text`, or the raw reply cut to [`USER_TEXT_LIMIT`] chars.
pub fn surface_user_text(cognitive: &CognitiveOutput, raw: &Value) -> String {
    if let Some(text) = &cognitive.user_text {
        return text.clone();
    }
    let raw = match raw {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    match raw.char_indices().nth(USER_TEXT_LIMIT) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw,
    }
}

pub struct CycleOrchestrator {
    agent: Arc<AgentClient>,
    reservoir: SharedReservoir,
    encoder: SensoryEncoder,
    archive: Mutex<MemoryArchive>,
    last_state: Mutex<CycleState>,
}

impl CycleOrchestrator {
    pub fn new(agent: Arc<AgentClient>, reservoir: SharedReservoir) -> Self {
        CycleOrchestrator {
            agent,
            reservoir,
            encoder: SensoryEncoder::new(),
            archive: Mutex::new(MemoryArchive::default()),
            last_state: Mutex::new(CycleState::Idle),
        }
    }

    pub fn with_archive(mut self, archive: MemoryArchive) -> Self {
        self.archive = Mutex::new(archive);
        self
    }

    /// Terminal state of the most recently finished cycle: `Idle` or `Failed`.
    pub fn last_state(&self) -> CycleState {
        *lock(&self.last_state)
    }

    pub fn archived(&self, limit: usize) -> Vec<ArchivedMemory> {
        lock(&self.archive).recent(limit)
    }

    pub fn archive_len(&self) -> usize {
        lock(&self.archive).len()
    }

    pub async fn run_cycle(
        &self,
        user_text: &str,
        sensory_snapshot: &Value,
    ) -> Result<CycleReport, CycleFailure> {
        let mut cycle = Cycle::begin(&self.last_state);

        cycle.enter(CycleState::Translating);
        let (translator, translator_reply) = self
            .agent
            .translate(&TranslateRequest {
                user_text: user_text.to_string(),
                sensory_snapshot: sensory_snapshot.clone(),
                short_brain_summary: Value::Null,
            })
            .await;

        cycle.enter(CycleState::Encoding);
        let vector = self.encoder.encode(&translator);

        let brain_summary = match self.drive_reservoir(&mut cycle, &vector).await {
            Ok(summary) => summary,
            Err(e) => return Err(cycle.fail(e)),
        };

        cycle.enter(CycleState::Interpreting);
        let (cognitive, cognitive_reply) = self
            .agent
            .interpret(&CognitiveRequest {
                post_brain_summary: Value::String(brain_summary.clone()),
                recent_user_text: user_text.to_string(),
            })
            .await;

        cycle.enter(CycleState::Archiving);
        let reply_text = surface_user_text(&cognitive, &cognitive_reply.value);
        {
            let mut archive = lock(&self.archive);
            archive.record(&translator.memory_flags, MemoryOrigin::Translator);
            archive.record(&cognitive.archive, MemoryOrigin::Cognitive);
        }

        let trail = cycle.finish();
        info!(
            translator_source = ?translator_reply.source,
            cognitive_source = ?cognitive_reply.source,
            active_inputs = vector.active(),
            "Cycle complete"
        );

        Ok(CycleReport {
            user_text: reply_text,
            translator,
            translator_source: translator_reply.source,
            active_inputs: vector.active(),
            brain_summary,
            cognitive,
            cognitive_source: cognitive_reply.source,
            trail,
        })
    }

    /// Apply, step and export under one lock so no other caller interleaves.
    async fn drive_reservoir(
        &self,
        cycle: &mut Cycle<'_>,
        vector: &InputVector,
    ) -> Result<String, CortexError> {
        let mut reservoir = self.reservoir.lock().await;

        cycle.enter(CycleState::Applying);
        reservoir.apply_inputs(vector)?;

        cycle.enter(CycleState::Stepping);
        for _ in 0..STEPS_PER_CYCLE {
            reservoir.step()?;
        }

        cycle.enter(CycleState::Exporting);
        Ok(reservoir.export_summary()?)
    }
}
