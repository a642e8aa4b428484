//! Three-stage content pipeline: background discovery, structural planning,
//! draft generation.
//!
//! Each stage is an ordinary orchestrator run. The artifact of one stage is
//! fed to the next as an input and recorded as its `parent`.

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::orchestrator::PipelineOrchestrator;
use super::result::{PipelineFailure, PipelineResult};
use super::task::{ModelParams, TaskSpec};
use crate::schema::TaskKind;
use crate::storage::{Artifact, TokenUsage};

/// Inputs for a full chain run.
#[derive(Debug, Clone, Default)]
pub struct ChainParams {
    pub topic: String,
    pub content_objectives: Option<String>,
    pub target_audience: Option<String>,
    pub content_type: Option<String>,
    pub additional_instructions: Option<String>,
    /// Overrides the model for every stage.
    pub model: Option<String>,
}

impl ChainParams {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    pub fn with_objectives(mut self, objectives: impl Into<String>) -> Self {
        self.content_objectives = Some(objectives.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.target_audience = Some(audience.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.additional_instructions = Some(instructions.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Artifacts produced by a successful chain, in stage order.
#[derive(Debug, Clone)]
pub struct ChainResult {
    pub background: Artifact,
    pub plan: Artifact,
    pub draft: Artifact,
}

impl ChainResult {
    pub fn artifacts(&self) -> [&Artifact; 3] {
        [&self.background, &self.plan, &self.draft]
    }

    /// Tokens across every attempt of every stage.
    pub fn total_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for artifact in self.artifacts() {
            total += artifact.provenance.usage;
        }
        total
    }
}

/// A stage failed; earlier stages' artifacts remain stored.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {failure}")]
pub struct ChainError {
    pub stage: TaskKind,
    pub failure: PipelineFailure,
    pub completed: Vec<Artifact>,
}

/// Runs the three content stages in sequence.
pub struct ContentChain<'a> {
    orchestrator: &'a PipelineOrchestrator,
}

impl<'a> ContentChain<'a> {
    pub fn new(orchestrator: &'a PipelineOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn run(&self, params: &ChainParams) -> Result<ChainResult, ChainError> {
        self.run_with_cancel(params, CancellationToken::new()).await
    }

    pub async fn run_with_cancel(
        &self,
        params: &ChainParams,
        cancel: CancellationToken,
    ) -> Result<ChainResult, ChainError> {
        let mut completed = Vec::new();

        let background_task = self
            .task(TaskKind::BackgroundDiscovery, params)
            .with_input("topic", params.topic.clone());
        let background = self
            .stage(background_task, &cancel, &mut completed)
            .await?;

        let mut planning_task = self
            .task(TaskKind::StructuralPlanning, params)
            .with_input("background_research", background.content_value())
            .with_parent(background.id);
        for (name, value) in [
            ("content_objectives", &params.content_objectives),
            ("target_audience", &params.target_audience),
            ("content_type", &params.content_type),
        ] {
            if let Some(value) = value {
                planning_task = planning_task.with_input(name, value.clone());
            }
        }
        let plan = self.stage(planning_task, &cancel, &mut completed).await?;

        let mut draft_task = self
            .task(TaskKind::DraftGeneration, params)
            .with_input("background_research", background.content_value())
            .with_input("structural_plan", plan.content_value())
            .with_parent(plan.id);
        if let Some(instructions) = &params.additional_instructions {
            draft_task = draft_task.with_input("additional_instructions", instructions.clone());
        }
        let draft = self.stage(draft_task, &cancel, &mut completed).await?;

        let result = ChainResult {
            background,
            plan,
            draft,
        };
        tracing::info!(
            topic = %params.topic,
            draft_id = %result.draft.id,
            total_tokens = result.total_usage().total(),
            "Content chain completed"
        );
        Ok(result)
    }

    fn task(&self, kind: TaskKind, params: &ChainParams) -> TaskSpec {
        let model = params
            .model
            .clone()
            .unwrap_or_else(|| self.orchestrator.config().default_model.clone());
        TaskSpec::new(kind).with_model_params(ModelParams::for_kind(kind).with_model(model))
    }

    async fn stage(
        &self,
        task: TaskSpec,
        cancel: &CancellationToken,
        completed: &mut Vec<Artifact>,
    ) -> Result<Artifact, ChainError> {
        let stage = task.kind;
        tracing::info!(stage = %stage, task_id = %task.task_id, "Running chain stage");
        match self.orchestrator.run_with_cancel(task, cancel.clone()).await {
            PipelineResult::Success(artifact) => {
                completed.push(artifact.clone());
                Ok(artifact)
            }
            PipelineResult::Failure(failure) => Err(ChainError {
                stage,
                failure,
                completed: std::mem::take(completed),
            }),
        }
    }
}

/// Title of a draft artifact, if present.
pub fn draft_title(artifact: &Artifact) -> Option<&str> {
    artifact.content.get("title").and_then(Value::as_str)
}
