//! RunScheduler -- drives one agent run through the node graph.
//!
//! Every persisted transition goes through the run repository, so a run that
//! suspends for approval can be resumed by any process sharing the store.
//! Collaborator failures fail the run and come back as an `AgentRun`; only
//! store and configuration problems surface as `EngineError`.

use std::sync::Arc;

use agentry_types::agent::{AgentDefinition, AgentRole};
use agentry_types::approval::{Approval, ApprovalStatus};
use agentry_types::config::EngineConfig;
use agentry_types::event::RunEvent;
use agentry_types::llm::CompletionRequest;
use agentry_types::memory::MemoryContext;
use agentry_types::message::{AgentMessage, MessageRole};
use agentry_types::persona::PersonaUpdate;
use agentry_types::run::{
    AgentRun, AgentState, ApprovalGrant, META_APPROVAL_ID, META_APPROVED_ACTION, META_ERROR_CONTEXT,
    META_EVALUATION, PendingApproval, RunNode, RunStatus, ToolCallRecord, ToolCallRequest,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::error::EngineError;
use super::format::{build_prompt, fit_to_budget};
use super::graph::transition;
use super::pricing::estimate_cost;
use crate::evaluation::EvaluationHooks;
use crate::event::EventBus;
use crate::llm::BoxLlmProvider;
use crate::memory::{MemoryError, MemoryManager};
use crate::persona::PersonaEngine;
use crate::policy::PolicyEnforcer;
use crate::repository::EngineStore;
use crate::roles;
use crate::tool::BoxToolExecutor;

/// Everything derived from one agent definition, built once and cached.
pub struct AgentRuntime<S: EngineStore> {
    pub definition: AgentDefinition,
    pub role: AgentRole,
    pub persona: PersonaEngine,
    pub policy: PolicyEnforcer,
    pub memory: MemoryManager<S>,
    pub hooks: EvaluationHooks,
}

enum NodeError {
    /// A collaborator failed; the run fails with this message.
    Collaborator(String),
    Engine(EngineError),
}

impl From<EngineError> for NodeError {
    fn from(e: EngineError) -> Self {
        NodeError::Engine(e)
    }
}

impl From<MemoryError> for NodeError {
    fn from(e: MemoryError) -> Self {
        NodeError::Engine(e.into())
    }
}

enum ToolTurn {
    Done,
    Suspended,
}

pub struct RunScheduler<S: EngineStore> {
    store: Arc<S>,
    llm: BoxLlmProvider,
    tools: BoxToolExecutor,
    events: EventBus,
    config: EngineConfig,
    runtimes: DashMap<Uuid, Arc<AgentRuntime<S>>>,
}

impl<S: EngineStore> RunScheduler<S> {
    pub fn new(
        store: Arc<S>,
        llm: BoxLlmProvider,
        tools: BoxToolExecutor,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            llm,
            tools,
            events: EventBus::default(),
            config,
            runtimes: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Drop the cached runtime so the next run re-reads the definition.
    pub fn invalidate_agent(&self, agent_id: &Uuid) {
        self.runtimes.remove(agent_id);
    }

    /// Apply a persona change to the cached runtime, if any. Runs started
    /// afterwards render the new system prompt.
    pub fn update_persona(&self, agent_id: &Uuid, update: PersonaUpdate) {
        if let Some(runtime) = self.runtimes.get(agent_id) {
            runtime.persona.update_config(update);
            debug!(agent_id = %agent_id, "persona updated on cached runtime");
        }
    }

    /// Load (or reuse) the runtime of an agent. Unknown roles are fatal.
    pub async fn runtime(&self, agent_id: &Uuid) -> Result<Arc<AgentRuntime<S>>, EngineError> {
        if let Some(runtime) = self.runtimes.get(agent_id) {
            return Ok(Arc::clone(runtime.value()));
        }

        let mut definition = self
            .store
            .get_agent(agent_id)
            .await?
            .ok_or(EngineError::AgentNotFound(*agent_id))?;
        let role = roles::apply_role_defaults(&mut definition).map_err(EngineError::Configuration)?;

        let runtime = Arc::new(AgentRuntime {
            role,
            persona: PersonaEngine::new(definition.persona.clone()),
            policy: PolicyEnforcer::new(definition.policies.clone()),
            memory: MemoryManager::new(definition.memory.clone(), Arc::clone(&self.store)),
            hooks: EvaluationHooks::new(definition.kpis.clone()),
            definition,
        });
        self.runtimes.insert(*agent_id, Arc::clone(&runtime));
        Ok(runtime)
    }

    /// Start a new run of `agent_id` for `input`.
    #[tracing::instrument(name = "agent_run", skip(self, input), fields(agent_id = %agent_id))]
    pub async fn run(
        &self,
        agent_id: &Uuid,
        input: &str,
        user_id: Option<Uuid>,
    ) -> Result<AgentRun, EngineError> {
        let runtime = self.runtime(agent_id).await?;
        let definition = &runtime.definition;

        let run_id = Uuid::now_v7();
        let created_at = Utc::now();
        let mut state = AgentState::new(
            run_id,
            definition.id,
            definition.tenant_id,
            user_id,
            input,
            MemoryContext::new(definition.memory.max_tokens),
        );
        self.store.create_run(&state.to_run(created_at)).await?;
        self.events.publish(RunEvent::RunStarted {
            run_id,
            agent_id: definition.id,
        });
        info!(run_id = %run_id, agent = %definition.name, role = %runtime.role, "run started");

        let pre = runtime.hooks.pre_execution(&state);
        if !pre.passed {
            let reason = pre
                .reason
                .unwrap_or_else(|| "Pre-execution check failed".to_string());
            return self.fail(&runtime, state, created_at, reason, None).await;
        }

        state.status = RunStatus::Running;
        self.store.update_run(&state.to_run(created_at)).await?;

        let decision = runtime.policy.validate_input(input);
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "Input rejected by policy".to_string());
            state.output = Some(reason.clone());
            return self.fail(&runtime, state, created_at, reason, None).await;
        }
        if decision.requires_approval {
            // Inputs are never held for approval; only tool calls suspend a run.
            info!(
                target: "agentry::audit",
                run_id = %run_id,
                reason = decision.reason.as_deref().unwrap_or(""),
                "input flagged for approval, continuing"
            );
        }

        let message = AgentMessage::user(input);
        state.memory = runtime.memory.add_message(&run_id, message.clone()).await?;
        state.messages.push(message);

        self.drive(&runtime, state, created_at).await
    }

    /// Continue a run suspended on `approval`, which must be approved.
    #[tracing::instrument(name = "agent_resume", skip(self, approval), fields(run_id = %run_id, approval_id = %approval.id))]
    pub async fn resume(&self, run_id: &Uuid, approval: &Approval) -> Result<AgentRun, EngineError> {
        if approval.run_id != *run_id {
            return Err(EngineError::InvalidState(format!(
                "approval {} belongs to run {}",
                approval.id, approval.run_id
            )));
        }
        if approval.status != ApprovalStatus::Approved {
            return Err(EngineError::InvalidState(format!(
                "approval {} is {}",
                approval.id, approval.status
            )));
        }

        let mut state = self
            .store
            .load_state(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(*run_id))?;
        if state.status != RunStatus::WaitingApproval {
            return Err(EngineError::InvalidState(format!(
                "run {run_id} is {}, not waiting for approval",
                state.status
            )));
        }

        let pending = state.pending_approval().ok_or_else(|| {
            EngineError::InvalidState(format!("run {run_id} has no tool call awaiting approval"))
        })?;
        if pending.tool_call_id != approval.tool_call_id {
            return Err(EngineError::InvalidState(format!(
                "approval {} covers tool call {}, but run {run_id} is waiting on {}",
                approval.id, approval.tool_call_id, pending.tool_call_id
            )));
        }
        if let Some(input) = approval.context.get("input") {
            if *input != pending.input {
                return Err(EngineError::InvalidState(format!(
                    "approval {} was granted for different input to {}",
                    approval.id, pending.tool_name
                )));
            }
        }
        if state.is_approval_applied(&approval.id) {
            return Err(EngineError::InvalidState(format!(
                "approval {} was already applied to run {run_id}",
                approval.id
            )));
        }

        let runtime = self.runtime(&state.agent_id).await?;
        let created_at = self.created_at(run_id).await?;

        state.grant_approval(ApprovalGrant::for_pending(approval.id, &pending));
        state
            .metadata
            .insert(META_APPROVAL_ID.to_string(), serde_json::json!(approval.id));
        state.metadata.insert(
            META_APPROVED_ACTION.to_string(),
            serde_json::Value::String(approval.action.clone()),
        );
        state.set_pending_approval(None);
        state.status = RunStatus::Running;
        let claimed = self
            .store
            .transition_run(&state.to_run(created_at), RunStatus::WaitingApproval)
            .await?;
        if !claimed {
            return Err(EngineError::InvalidState(format!(
                "run {run_id} was resumed concurrently"
            )));
        }
        self.store.save_state(&state).await?;
        state.memory = runtime.memory.restore(run_id, state.memory.clone()).await?;

        info!(
            run_id = %run_id,
            tool_call_id = %approval.tool_call_id,
            node = %state.next_node,
            "run resumed"
        );
        self.drive(&runtime, state, created_at).await
    }

    /// Fail a suspended run without resuming it.
    pub async fn fail_run(
        &self,
        run_id: &Uuid,
        output: String,
        error: String,
    ) -> Result<AgentRun, EngineError> {
        let mut state = self
            .store
            .load_state(run_id)
            .await?
            .ok_or(EngineError::RunNotFound(*run_id))?;
        if state.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "run {run_id} is already {}",
                state.status
            )));
        }
        let created_at = self.created_at(run_id).await?;

        state.status = RunStatus::Failed;
        state.output = Some(output);
        state.error = Some(error.clone());
        state.set_pending_approval(None);
        state.metrics.finish();

        self.store.save_state(&state).await?;
        let run = state.to_run(created_at);
        self.store.update_run(&run).await?;
        if let Some(runtime) = self.runtimes.get(&state.agent_id) {
            runtime.memory.evict(run_id);
        }
        self.events.publish(RunEvent::RunFailed {
            run_id: *run_id,
            error,
        });
        Ok(run)
    }

    async fn created_at(&self, run_id: &Uuid) -> Result<DateTime<Utc>, EngineError> {
        self.store
            .get_run(run_id)
            .await?
            .map(|run| run.created_at)
            .ok_or(EngineError::RunNotFound(*run_id))
    }

    async fn drive(
        &self,
        runtime: &AgentRuntime<S>,
        mut state: AgentState,
        created_at: DateTime<Utc>,
    ) -> Result<AgentRun, EngineError> {
        let max_iterations = runtime
            .definition
            .max_iterations
            .unwrap_or(self.config.default_max_iterations);

        loop {
            let node = state.next_node;
            match node {
                RunNode::Llm => {
                    if state.iteration >= max_iterations {
                        warn!(
                            run_id = %state.run_id,
                            max_iterations,
                            "iteration cap reached"
                        );
                        let error = "iteration limit reached".to_string();
                        return self.fail(runtime, state, created_at, error, Some(node)).await;
                    }
                    match self.llm_node(runtime, &mut state).await {
                        Ok(()) => {}
                        Err(NodeError::Collaborator(error)) => {
                            return self.fail(runtime, state, created_at, error, Some(node)).await;
                        }
                        Err(NodeError::Engine(e)) => return Err(e),
                    }
                }
                RunNode::Router => {}
                RunNode::Tools => {
                    if let ToolTurn::Suspended = self.tools_node(runtime, &mut state).await? {
                        return self.suspend(runtime, state, created_at).await;
                    }
                }
                RunNode::End => return self.complete(runtime, state, created_at).await,
            }
            state.next_node = transition(node, &state);
        }
    }

    async fn llm_node(
        &self,
        runtime: &AgentRuntime<S>,
        state: &mut AgentState,
    ) -> Result<(), NodeError> {
        let run_id = state.run_id;
        let definition = &runtime.definition;

        if !state.tool_results.is_empty() {
            let results = serde_json::Value::Object(
                std::mem::take(&mut state.tool_results).into_iter().collect(),
            );
            let message = AgentMessage::new(MessageRole::Tool, format!("Tool results: {results}"));
            state.memory = runtime.memory.add_message(&run_id, message.clone()).await?;
            state.messages.push(message);
        }

        state.iteration += 1;
        state.metrics.iterations = state.iteration;

        let system_prompt = runtime.persona.generate_system_prompt(state);
        let messages = fit_to_budget(
            build_prompt(&system_prompt, &state.memory),
            state.memory.max_tokens,
        );
        let request = CompletionRequest {
            model: definition.model.clone(),
            messages,
            tools: definition.tools.clone(),
            temperature: Some(definition.temperature),
            max_tokens: definition.max_tokens,
        };

        let span = info_span!(
            "gen_ai.complete",
            gen_ai.system = self.llm.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            run_id = %run_id,
            iteration = state.iteration,
        );
        let response = self
            .llm
            .complete(&request)
            .instrument(span)
            .await
            .map_err(|e| NodeError::Collaborator(e.to_string()))?;

        let model = response.model.as_deref().unwrap_or(&definition.model);
        state.metrics.token_usage.accumulate(&response.usage);
        state.metrics.cost_usd += estimate_cost(model, &response.usage, &self.config.model_pricing);

        let requested = response.tool_calls.len();
        let message =
            AgentMessage::assistant(response.content).with_tool_calls(response.tool_calls.clone());
        state.memory = runtime.memory.add_message(&run_id, message.clone()).await?;
        state.messages.push(message);
        state.pending_tool_calls = response.tool_calls;

        debug!(
            run_id = %run_id,
            iteration = state.iteration,
            tool_calls = requested,
            total_tokens = response.usage.total_tokens,
            "llm turn completed"
        );
        self.events.publish(RunEvent::LlmTurnCompleted {
            run_id,
            iteration: state.iteration,
            tool_calls_requested: requested,
            total_tokens: response.usage.total_tokens,
        });
        Ok(())
    }

    async fn tools_node(
        &self,
        runtime: &AgentRuntime<S>,
        state: &mut AgentState,
    ) -> Result<ToolTurn, EngineError> {
        let run_id = state.run_id;
        let mut permitted: Vec<(ToolCallRequest, bool)> = Vec::new();
        let mut refused: Vec<(ToolCallRequest, String)> = Vec::new();

        // Grants are consumed only once the whole turn executes, so a turn
        // that suspends on a later call keeps the earlier sign-off.
        let mut grants = state.approval_grants();
        let calls = state.pending_tool_calls.clone();
        for call in &calls {
            let decision = runtime.policy.validate_tool_call(&call.tool_name, &call.input);
            if !decision.allowed {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| format!("Tool call blocked: {}", call.tool_name));
                refused.push((call.clone(), reason));
                continue;
            }

            let granted = grants.iter().position(|grant| grant.covers(call));
            let approved = decision.requires_approval && granted.is_some();
            if let (true, Some(index)) = (approved, granted) {
                grants.remove(index);
            }
            if decision.requires_approval && !approved {
                let pending = PendingApproval {
                    tool_call_id: call.id.clone(),
                    tool_name: call.tool_name.clone(),
                    input: call.input.clone(),
                    reason: decision.reason,
                    rule_id: decision.approval_rule_id,
                };
                info!(
                    target: "agentry::audit",
                    run_id = %run_id,
                    tool_call_id = %pending.tool_call_id,
                    tool = %pending.tool_name,
                    rule_id = pending.rule_id.as_deref().unwrap_or(""),
                    "tool call requires approval, suspending run"
                );
                self.events.publish(RunEvent::ApprovalRequired {
                    run_id,
                    tool_call_id: pending.tool_call_id.clone(),
                    tool_name: pending.tool_name.clone(),
                    reason: pending.reason.clone(),
                });
                state.set_pending_approval(Some(&pending));
                state.status = RunStatus::WaitingApproval;
                return Ok(ToolTurn::Suspended);
            }

            permitted.push((call.clone(), approved));
        }
        state.set_approval_grants(&grants);

        let executions = permitted.iter().map(|(call, _)| {
            self.tools
                .execute(&call.tool_name, &call.input)
                .instrument(info_span!("tool.execute", run_id = %run_id, tool = %call.tool_name))
        });
        let outcomes = join_all(executions).await;

        let mut records = Vec::with_capacity(permitted.len() + refused.len());
        for (call, reason) in refused {
            warn!(
                target: "agentry::audit",
                run_id = %run_id,
                tool = %call.tool_name,
                reason = %reason,
                "tool call blocked"
            );
            records.push(record(run_id, call, None, Some(reason), false));
        }
        for ((call, approved), outcome) in permitted.into_iter().zip(outcomes) {
            let (output, error) = match outcome {
                Ok(value) => (Some(value), None),
                Err(e) => {
                    warn!(run_id = %run_id, tool = %call.tool_name, error = %e, "tool call failed");
                    (None, Some(e.to_string()))
                }
            };
            state.metrics.tool_calls_count += 1;
            records.push(record(run_id, call, output, error, approved));
        }

        for rec in records {
            self.store.record_tool_call(&rec).await?;
            self.events.publish(RunEvent::ToolExecuted {
                run_id,
                tool_call_id: rec.id.clone(),
                tool_name: rec.tool_name.clone(),
                success: rec.error.is_none(),
            });
            state.tool_results.insert(rec.id.clone(), rec.result_value());
            state.tool_calls.push(rec);
        }
        state.pending_tool_calls.clear();
        state.set_pending_approval(None);
        Ok(ToolTurn::Done)
    }

    async fn suspend(
        &self,
        runtime: &AgentRuntime<S>,
        state: AgentState,
        created_at: DateTime<Utc>,
    ) -> Result<AgentRun, EngineError> {
        self.store.save_state(&state).await?;
        let run = state.to_run(created_at);
        self.store.update_run(&run).await?;
        runtime.memory.evict(&state.run_id);
        info!(run_id = %state.run_id, iteration = state.iteration, "run waiting for approval");
        Ok(run)
    }

    async fn complete(
        &self,
        runtime: &AgentRuntime<S>,
        mut state: AgentState,
        created_at: DateTime<Utc>,
    ) -> Result<AgentRun, EngineError> {
        state.output = state
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.content.clone());
        state.status = RunStatus::Completed;
        state.metrics.finish();

        let evaluation = runtime.hooks.post_execution(&state);
        if !evaluation.passed {
            warn!(
                run_id = %state.run_id,
                reason = evaluation.reason.as_deref().unwrap_or(""),
                should_retry = evaluation.should_retry,
                "post-execution check failed"
            );
        }
        state
            .metadata
            .insert(META_EVALUATION.to_string(), serde_json::json!(evaluation));

        let snapshot = runtime.hooks.track_kpi(&mut state);
        self.store.record_kpis(&snapshot).await?;

        let ceiling = roles::preset(runtime.role).map(|p| p.max_cost_per_run);
        if let Some(limit_usd) = ceiling.filter(|limit| state.metrics.cost_usd > *limit) {
            warn!(
                target: "agentry::audit",
                run_id = %state.run_id,
                role = %runtime.role,
                cost_usd = state.metrics.cost_usd,
                limit_usd,
                "run exceeded role cost ceiling"
            );
        }

        self.store.save_state(&state).await?;
        let run = state.to_run(created_at);
        self.store.update_run(&run).await?;
        runtime.memory.evict(&state.run_id);

        let duration_ms = state.metrics.duration_ms.unwrap_or(0);
        info!(
            run_id = %state.run_id,
            iterations = state.iteration,
            total_tokens = state.metrics.token_usage.total_tokens,
            duration_ms,
            "run completed"
        );
        self.events.publish(RunEvent::RunCompleted {
            run_id: state.run_id,
            total_tokens: state.metrics.token_usage.total_tokens,
            duration_ms,
        });
        Ok(run)
    }

    async fn fail(
        &self,
        runtime: &AgentRuntime<S>,
        mut state: AgentState,
        created_at: DateTime<Utc>,
        error: String,
        node: Option<RunNode>,
    ) -> Result<AgentRun, EngineError> {
        state.status = RunStatus::Failed;
        state.error = Some(error.clone());
        state.metrics.finish();
        if let Some(node) = node {
            state.metadata.insert(
                META_ERROR_CONTEXT.to_string(),
                serde_json::json!({ "node": node.to_string(), "iteration": state.iteration }),
            );
        }

        let advice = runtime.hooks.on_error(&state);
        state
            .metadata
            .insert(META_EVALUATION.to_string(), serde_json::json!(advice));
        warn!(
            run_id = %state.run_id,
            error = %error,
            should_retry = advice.should_retry,
            should_escalate = advice.should_escalate,
            "run failed"
        );

        self.store.save_state(&state).await?;
        let run = state.to_run(created_at);
        self.store.update_run(&run).await?;
        runtime.memory.evict(&state.run_id);
        self.events.publish(RunEvent::RunFailed {
            run_id: state.run_id,
            error,
        });
        Ok(run)
    }
}

fn record(
    run_id: Uuid,
    call: ToolCallRequest,
    output: Option<serde_json::Value>,
    error: Option<String>,
    approved: bool,
) -> ToolCallRecord {
    ToolCallRecord {
        id: call.id,
        run_id,
        tool_name: call.tool_name,
        input: call.input,
        output,
        error,
        approved,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators shared by the engine, approval and service tests.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use agentry_types::error::ToolError;
    use agentry_types::llm::{CompletionRequest, CompletionResponse, LlmError};
    use agentry_types::run::{TokenUsage, ToolCallRequest};

    use crate::llm::LlmProvider;
    use crate::tool::ToolExecutor;

    pub fn reply(content: &str) -> CompletionResponse {
        CompletionResponse {
            content: content.to_string(),
            tool_calls: Vec::new(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            model: None,
        }
    }

    pub fn tool_request(id: &str, tool: &str, input: serde_json::Value) -> CompletionResponse {
        CompletionResponse {
            tool_calls: vec![ToolCallRequest {
                id: id.to_string(),
                tool_name: tool.to_string(),
                input,
            }],
            ..reply("")
        }
    }

    /// Replays queued responses, then `fallback` (or an error) forever.
    #[derive(Clone, Default)]
    pub struct ScriptedLlm {
        script: Arc<Mutex<VecDeque<Result<CompletionResponse, LlmError>>>>,
        fallback: Option<CompletionResponse>,
        pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl ScriptedLlm {
        pub fn new(script: Vec<CompletionResponse>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into_iter().map(Ok).collect())),
                ..Default::default()
            }
        }

        pub fn repeating(response: CompletionResponse) -> Self {
            Self {
                fallback: Some(response),
                ..Default::default()
            }
        }

        pub fn failing(error: LlmError) -> Self {
            Self {
                script: Arc::new(Mutex::new(VecDeque::from([Err(error)]))),
                ..Default::default()
            }
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn request(&self, index: usize) -> CompletionRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            let next = self.script.lock().unwrap().pop_front();
            match (next, &self.fallback) {
                (Some(result), _) => result,
                (None, Some(fallback)) => Ok(fallback.clone()),
                (None, None) => Err(LlmError::Provider {
                    message: "script exhausted".to_string(),
                }),
            }
        }
    }

    /// Echoes every call; the tool named `broken` fails.
    #[derive(Clone, Default)]
    pub struct RecordingTools {
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingTools {
        pub fn names(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ToolExecutor for RecordingTools {
        async fn execute(
            &self,
            tool_name: &str,
            input: &serde_json::Value,
        ) -> Result<serde_json::Value, ToolError> {
            self.calls.lock().unwrap().push(tool_name.to_string());
            if tool_name == "broken" {
                return Err(ToolError::Execution {
                    tool: tool_name.to_string(),
                    message: "backend unavailable".to_string(),
                });
            }
            Ok(serde_json::json!({ "tool": tool_name, "echo": input }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use agentry_types::llm::{ChatRole, LlmError};
    use agentry_types::policy::{Guardrail, GuardrailAction, GuardrailTrigger};
    use crate::repository::{AgentRepository, InMemoryStore, KpiRepository, RunRepository};

    struct Harness {
        scheduler: RunScheduler<InMemoryStore>,
        store: Arc<InMemoryStore>,
        llm: ScriptedLlm,
        tools: RecordingTools,
        agent_id: Uuid,
    }

    async fn harness(llm: ScriptedLlm, configure: impl FnOnce(&mut AgentDefinition)) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let mut agent = AgentDefinition::new(Uuid::now_v7(), "Helpdesk", "custom");
        configure(&mut agent);
        store.save_agent(&agent).await.unwrap();

        let tools = RecordingTools::default();
        let scheduler = RunScheduler::new(
            Arc::clone(&store),
            BoxLlmProvider::new(llm.clone()),
            BoxToolExecutor::new(tools.clone()),
            EngineConfig::default(),
        );
        Harness {
            scheduler,
            store,
            llm,
            tools,
            agent_id: agent.id,
        }
    }

    fn guardrail(trigger: GuardrailTrigger, action: GuardrailAction) -> Guardrail {
        Guardrail {
            id: "g1".to_string(),
            name: "test guardrail".to_string(),
            trigger,
            action,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_plain_answer_completes() {
        let h = harness(ScriptedLlm::new(vec![reply("Restart the router.")]), |_| {}).await;

        let run = h.scheduler.run(&h.agent_id, "My wifi is down", None).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.output.as_deref(), Some("Restart the router."));
        assert_eq!(run.metrics.token_usage.total_tokens, 15);
        assert_eq!(run.metrics.iterations, 1);
        assert!(run.metrics.cost_usd > 0.0);
        assert!(run.completed_at.is_some());
        assert_eq!(run.metrics.kpi["fcr"], 1.0);

        let stored = h.store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(h.store.list_kpis(&h.agent_id, 10).await.unwrap().len(), 1);

        let request = h.llm.request(0);
        assert_eq!(request.messages[0].role, ChatRole::System);
        assert!(request.messages[0].content.starts_with("You are Helpdesk"));
        assert_eq!(request.messages.last().unwrap().content, "My wifi is down");
    }

    #[tokio::test]
    async fn test_tool_turn_feeds_results_back() {
        let llm = ScriptedLlm::new(vec![
            tool_request("call_1", "lookup", serde_json::json!({"user": "jane"})),
            reply("Jane's account is active."),
        ]);
        let h = harness(llm, |_| {}).await;

        let run = h.scheduler.run(&h.agent_id, "Is jane active?", None).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.metrics.tool_calls_count, 1);
        assert_eq!(run.metrics.iterations, 2);
        assert_eq!(h.tools.names(), vec!["lookup"]);

        let second = h.llm.request(1);
        let results = second.messages.last().unwrap();
        assert_eq!(results.role, ChatRole::User);
        assert!(results.content.starts_with("Tool results: "));
        assert!(results.content.contains("call_1"));

        let records = h.store.list_tool_calls(&run.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].error.is_none());
        assert!(!records[0].approved);
    }

    #[tokio::test]
    async fn test_pii_input_never_reaches_llm() {
        let h = harness(ScriptedLlm::new(vec![reply("unused")]), |_| {}).await;

        let run = h
            .scheduler
            .run(&h.agent_id, "My email is a@b.com, please help", None)
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.as_deref().unwrap().contains("email"));
        assert_eq!(run.output, run.error);
        assert_eq!(h.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_input_fails_before_llm() {
        let h = harness(ScriptedLlm::new(vec![reply("unused")]), |_| {}).await;
        let run = h.scheduler.run(&h.agent_id, "  ", None).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("Input is empty"));
        assert_eq!(h.llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_iteration_cap_fails_run() {
        let llm = ScriptedLlm::repeating(tool_request("loop", "lookup", serde_json::json!({})));
        let h = harness(llm, |_| {}).await;

        let run = h.scheduler.run(&h.agent_id, "keep going", None).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("iteration limit reached"));
        assert_eq!(h.llm.call_count(), 10);
        assert_eq!(run.metadata[META_ERROR_CONTEXT]["node"], "llm");
        assert_eq!(run.metadata[META_ERROR_CONTEXT]["iteration"], 10);
    }

    #[tokio::test]
    async fn test_agent_iteration_cap_overrides_default() {
        let llm = ScriptedLlm::repeating(tool_request("loop", "lookup", serde_json::json!({})));
        let h = harness(llm, |a| a.max_iterations = Some(3)).await;
        let run = h.scheduler.run(&h.agent_id, "keep going", None).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(h.llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_llm_failure_fails_run_with_advice() {
        let llm = ScriptedLlm::failing(LlmError::Timeout("30s elapsed".to_string()));
        let h = harness(llm, |_| {}).await;

        let run = h.scheduler.run(&h.agent_id, "hello", None).await.unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.as_deref().unwrap().contains("timeout"));
        assert_eq!(run.metadata[META_EVALUATION]["should_retry"], true);
        assert_eq!(run.metadata[META_ERROR_CONTEXT]["iteration"], 1);
    }

    #[tokio::test]
    async fn test_blocked_tool_call_is_recorded_not_executed() {
        let llm = ScriptedLlm::new(vec![
            tool_request("call_1", "drop_table", serde_json::json!({"table": "users"})),
            reply("I cannot do that."),
        ]);
        let h = harness(llm, |a| {
            a.policies.guardrails.push(Guardrail {
                message: Some("Destructive SQL is not allowed".to_string()),
                ..guardrail(
                    GuardrailTrigger::ToolName {
                        name: "drop_table".to_string(),
                    },
                    GuardrailAction::Block,
                )
            });
        })
        .await;

        let run = h.scheduler.run(&h.agent_id, "clean up", None).await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert!(h.tools.names().is_empty());
        assert_eq!(run.metrics.tool_calls_count, 0);
        let records = h.store.list_tool_calls(&run.id).await.unwrap();
        assert_eq!(records[0].error.as_deref(), Some("Destructive SQL is not allowed"));
        assert!(h.llm.request(1).messages.last().unwrap().content.contains("Destructive SQL"));
    }

    #[tokio::test]
    async fn test_failed_tool_result_is_merged_as_error() {
        let llm = ScriptedLlm::new(vec![
            tool_request("call_1", "broken", serde_json::json!({})),
            reply("The backend is down."),
        ]);
        let h = harness(llm, |_| {}).await;
        let run = h.scheduler.run(&h.agent_id, "try it", None).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        let records = h.store.list_tool_calls(&run.id).await.unwrap();
        assert!(records[0].error.as_deref().unwrap().contains("backend unavailable"));
    }

    #[tokio::test]
    async fn test_require_approval_suspends_then_resume_executes() {
        let llm = ScriptedLlm::new(vec![
            tool_request("call_7", "delete_account", serde_json::json!({"account": 42})),
            reply("Account 42 deleted."),
        ]);
        let h = harness(llm, |a| {
            a.policies.guardrails.push(guardrail(
                GuardrailTrigger::ToolName {
                    name: "delete_account".to_string(),
                },
                GuardrailAction::RequireApproval,
            ));
        })
        .await;

        let run = h.scheduler.run(&h.agent_id, "delete account 42", None).await.unwrap();
        assert_eq!(run.status, RunStatus::WaitingApproval);
        assert!(run.completed_at.is_none());
        assert!(h.tools.names().is_empty());
        let pending = run.pending_approval().unwrap();
        assert_eq!(pending.tool_call_id, "call_7");

        let state = h.store.load_state(&run.id).await.unwrap().unwrap();
        assert_eq!(state.next_node, RunNode::Tools);
        assert_eq!(state.pending_tool_calls[0].id, "call_7");

        let mut approval = Approval::pending(
            run.id,
            "call_7",
            "delete_account",
            serde_json::json!({}),
            None,
            None,
        );
        approval.status = ApprovalStatus::Approved;
        let resumed = h.scheduler.resume(&run.id, &approval).await.unwrap();

        assert_eq!(resumed.status, RunStatus::Completed);
        assert_eq!(resumed.output.as_deref(), Some("Account 42 deleted."));
        assert_eq!(h.tools.names(), vec!["delete_account"]);
        assert_eq!(resumed.metadata[META_APPROVAL_ID], serde_json::json!(approval.id));
        assert_eq!(resumed.metadata[META_APPROVED_ACTION], "delete_account");
        assert!(resumed.pending_approval().is_none());
        let records = h.store.list_tool_calls(&run.id).await.unwrap();
        assert!(records[0].approved);
    }

    #[tokio::test]
    async fn test_resume_requires_waiting_run_and_approved_status() {
        let h = harness(ScriptedLlm::new(vec![reply("done")]), |_| {}).await;
        let run = h.scheduler.run(&h.agent_id, "hi", None).await.unwrap();

        let mut approval = Approval::pending(run.id, "c", "x", serde_json::json!({}), None, None);
        let err = h.scheduler.resume(&run.id, &approval).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        approval.status = ApprovalStatus::Approved;
        let err = h.scheduler.resume(&run.id, &approval).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    fn gate_delete(a: &mut AgentDefinition) {
        a.policies.guardrails.push(guardrail(
            GuardrailTrigger::ToolName {
                name: "delete_account".to_string(),
            },
            GuardrailAction::RequireApproval,
        ));
    }

    fn approved(run_id: Uuid, call_id: &str, context: serde_json::Value) -> Approval {
        let mut approval = Approval::pending(run_id, call_id, "delete_account", context, None, None);
        approval.status = ApprovalStatus::Approved;
        approval
    }

    #[tokio::test]
    async fn test_approval_covers_only_the_suspended_call() {
        let llm = ScriptedLlm::new(vec![
            tool_request("call_1", "delete_account", serde_json::json!({"account": 1})),
            tool_request("call_1", "delete_account", serde_json::json!({"account": 2})),
            reply("Both deleted."),
        ]);
        let h = harness(llm, gate_delete).await;
        let run = h.scheduler.run(&h.agent_id, "delete both", None).await.unwrap();

        let first = approved(run.id, "call_1", serde_json::json!({"input": {"account": 1}}));
        let resumed = h.scheduler.resume(&run.id, &first).await.unwrap();
        assert_eq!(resumed.status, RunStatus::WaitingApproval);
        assert_eq!(h.tools.names(), vec!["delete_account"]);
        let pending = resumed.pending_approval().unwrap();
        assert_eq!(pending.tool_call_id, "call_1");
        assert_eq!(pending.input["account"], 2);

        let second = approved(run.id, "call_1", serde_json::json!({"input": {"account": 2}}));
        let done = h.scheduler.resume(&run.id, &second).await.unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        let records = h.store.list_tool_calls(&run.id).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].input["account"], 2);
        assert!(records.iter().all(|r| r.approved));
    }

    #[tokio::test]
    async fn test_resume_rejects_wrong_call_and_reused_approval() {
        let llm = ScriptedLlm::new(vec![
            tool_request("call_1", "delete_account", serde_json::json!({"account": 1})),
            tool_request("call_1", "delete_account", serde_json::json!({"account": 1})),
            reply("Done."),
        ]);
        let h = harness(llm, gate_delete).await;
        let run = h.scheduler.run(&h.agent_id, "delete twice", None).await.unwrap();

        let err = h
            .scheduler
            .resume(&run.id, &approved(run.id, "call_9", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        let wrong_input = approved(run.id, "call_1", serde_json::json!({"input": {"account": 3}}));
        let err = h.scheduler.resume(&run.id, &wrong_input).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert!(h.tools.names().is_empty());

        let approval = approved(run.id, "call_1", serde_json::json!({}));
        let resumed = h.scheduler.resume(&run.id, &approval).await.unwrap();
        assert_eq!(resumed.status, RunStatus::WaitingApproval);

        let err = h.scheduler.resume(&run.id, &approval).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert_eq!(h.tools.names().len(), 1);
        let state = h.store.load_state(&run.id).await.unwrap().unwrap();
        assert_eq!(state.status, RunStatus::WaitingApproval);
        assert!(state.approval_grants().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_resumes_run_tools_once() {
        let llm = ScriptedLlm::new(vec![
            tool_request("call_1", "delete_account", serde_json::json!({})),
            reply("Deleted."),
        ]);
        let h = harness(llm, gate_delete).await;
        let run = h.scheduler.run(&h.agent_id, "delete", None).await.unwrap();

        let a = approved(run.id, "call_1", serde_json::json!({}));
        let b = approved(run.id, "call_1", serde_json::json!({}));
        let (first, second) = tokio::join!(
            h.scheduler.resume(&run.id, &a),
            h.scheduler.resume(&run.id, &b),
        );
        assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(h.tools.names(), vec!["delete_account"]);
    }

    #[tokio::test]
    async fn test_fail_run_is_terminal() {
        let llm = ScriptedLlm::new(vec![tool_request("c1", "refund", serde_json::json!({}))]);
        let h = harness(llm, |a| {
            a.policies.guardrails.push(guardrail(
                GuardrailTrigger::ToolName {
                    name: "refund".to_string(),
                },
                GuardrailAction::RequireApproval,
            ));
        })
        .await;
        let run = h.scheduler.run(&h.agent_id, "refund me", None).await.unwrap();

        let failed = h
            .scheduler
            .fail_run(&run.id, "Rejected: no".to_string(), "Rejected: no".to_string())
            .await
            .unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert!(h.scheduler.fail_run(&run.id, String::new(), String::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_agent_and_role_are_errors() {
        let h = harness(ScriptedLlm::default(), |a| a.role_type = "astronaut".to_string()).await;

        let err = h.scheduler.run(&Uuid::now_v7(), "hi", None).await.unwrap_err();
        assert!(matches!(err, EngineError::AgentNotFound(_)));

        let err = h.scheduler.run(&h.agent_id, "hi", None).await.unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_events_published_in_order() {
        let h = harness(ScriptedLlm::new(vec![reply("ok")]), |_| {}).await;
        let mut rx = h.scheduler.events().subscribe();

        h.scheduler.run(&h.agent_id, "hi", None).await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), RunEvent::RunStarted { .. }));
        assert!(matches!(rx.recv().await.unwrap(), RunEvent::LlmTurnCompleted { .. }));
        assert!(matches!(rx.recv().await.unwrap(), RunEvent::RunCompleted { .. }));
    }
}
