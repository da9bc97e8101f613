//! The pattern-gated pipeline orchestrator.
//!
//! Ten ordered stages per processed input:
//! intake -> clarify -> plan -> select -> execute -> review -> memory ->
//! pattern -> meso -> goals.
//!
//! Failure policy per stage band:
//! - stages 1-5 fail the run; stages 6-10 are then skipped except a
//!   best-effort memory write recording the error
//! - stage 6 (review) can only downgrade quality, never fail the run
//! - stages 7-10 errors are logged and swallowed
//!
//! The orchestrator is the only component writing short-term memory, the
//! pattern tracker, and long-term memory during normal processing (the
//! reflection engine writes long-term on its own during stage 9).

pub mod goals;
pub mod plan;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use overhuman_llm::{ChatMessage, CompletionRequest, ModelRouter, ModelTier, Provider};
use overhuman_store::{LongTermMemory, PatternTracker, SharedKnowledgeBase};
use overhuman_types::input::NormalizedInput;
use overhuman_types::memory::{LongTermEntry, Role, ShortTermEntry, SkbEntry, SkbKind};
use overhuman_types::result::RunResult;
use overhuman_types::{OverhumanError, Result};

use crate::reflection::{MacroInput, ReflectionEngine, RunSummary};
use crate::short_term::ShortTermMemory;
use crate::skills::SkillRegistry;
use goals::GoalTracker;
use plan::{Plan, parse_plan};

/// Goal text used for heartbeat self-maintenance runs.
pub const MAINTENANCE_GOAL: &str = "review recent activity and perform self-maintenance";

/// Quality assigned when the review call itself fails.
const REVIEW_FAILURE_QUALITY: f64 = 0.3;

/// Idempotency cache bound; the cache is cleared once it grows past this.
const RESULT_CACHE_CAP: usize = 1024;

/// Pipeline tuning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Agent name used in SKB entries.
    pub agent_name: String,
    /// Observations needed before the automation trigger fires.
    pub automation_threshold: u64,
    /// Overall per-request deadline in seconds.
    pub request_deadline_secs: u64,
    /// Advisory per-call budget hint handed to the router; 0 disables it.
    pub llm_budget_usd: f64,
    /// Model used when the router has no catalog.
    pub default_model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            agent_name: "overhuman".into(),
            automation_threshold: 3,
            request_deadline_secs: 600,
            llm_budget_usd: 0.0,
            default_model: String::new(),
        }
    }
}

/// Out-of-band request to synthesize a code skill for a hot pattern.
///
/// Consumed by the external skill synthesizer; linking the produced skill
/// back via `PatternTracker::link` removes the fingerprint from future
/// automatable sets.
#[derive(Debug, Clone)]
pub struct AutomationRequest {
    /// The hot pattern's fingerprint.
    pub fingerprint: String,
    /// Latest observed description of the task shape.
    pub description: String,
    /// The goal text that tripped the threshold.
    pub goal: String,
}

#[derive(Default)]
struct RunStats {
    total_runs: u64,
    quality_sum: f64,
    cost_sum: f64,
}

/// Outcome of stages 1-5, consumed by the bookkeeping stages.
struct Execution {
    goal: String,
    task_type: &'static str,
    fingerprint: String,
    result_text: String,
    used_skill: bool,
    cost_usd: f64,
    micro_notes: Vec<String>,
}

/// The staged orchestrator. One instance per daemon; requests are
/// processed to completion one at a time by the consumer task.
pub struct Pipeline {
    provider: Arc<dyn Provider>,
    router: ModelRouter,
    short_term: Arc<ShortTermMemory>,
    long_term: LongTermMemory,
    patterns: PatternTracker,
    skb: SharedKnowledgeBase,
    skills: Arc<SkillRegistry>,
    reflection: Arc<ReflectionEngine>,
    goals: GoalTracker,
    config: PipelineConfig,
    automation_tx: mpsc::UnboundedSender<AutomationRequest>,
    automation_rx: Mutex<Option<mpsc::UnboundedReceiver<AutomationRequest>>>,
    results: DashMap<String, RunResult>,
    stats: Mutex<RunStats>,
}

impl Pipeline {
    /// Wire up the orchestrator. Construction order follows the daemon:
    /// stores first, then provider and reflection, then this.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn Provider>,
        router: ModelRouter,
        short_term: Arc<ShortTermMemory>,
        long_term: LongTermMemory,
        patterns: PatternTracker,
        skb: SharedKnowledgeBase,
        skills: Arc<SkillRegistry>,
        reflection: Arc<ReflectionEngine>,
        config: PipelineConfig,
    ) -> Self {
        let (automation_tx, automation_rx) = mpsc::unbounded_channel();
        Self {
            provider,
            router,
            short_term,
            long_term,
            patterns,
            skb,
            skills,
            reflection,
            goals: GoalTracker::new(),
            config,
            automation_tx,
            automation_rx: Mutex::new(Some(automation_rx)),
            results: DashMap::new(),
            stats: Mutex::new(RunStats::default()),
        }
    }

    /// Take the automation-request receiver. Yields `None` after the
    /// first call.
    pub fn automation_rx(&self) -> Option<mpsc::UnboundedReceiver<AutomationRequest>> {
        self.automation_rx.lock().take()
    }

    /// The goal tracker (read by status commands and macro assembly).
    pub fn goals(&self) -> &GoalTracker {
        &self.goals
    }

    /// Process one input end to end.
    ///
    /// Never returns an error: failures become a `RunResult` with
    /// `success=false` and a populated reason. Duplicate input ids within
    /// the cache window return the prior result unchanged.
    pub async fn process(&self, input: &NormalizedInput, cancel: &CancellationToken) -> RunResult {
        if let Some(prior) = self.results.get(&input.id) {
            debug!(task_id = %input.id, "duplicate input; returning cached result");
            return prior.clone();
        }

        let started = Instant::now();
        let deadline = Duration::from_secs(self.config.request_deadline_secs);
        let mut result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.record_failure(input, "cancelled");
                RunResult::failure(&input.id, "cancelled")
            }
            run = tokio::time::timeout(deadline, self.run_stages(input)) => match run {
                Ok(result) => result,
                Err(_) => {
                    self.record_failure(input, "deadline exceeded");
                    RunResult::failure(&input.id, "timeout")
                }
            }
        };
        result.elapsed_ms = started.elapsed().as_millis() as u64;

        {
            let mut stats = self.stats.lock();
            stats.total_runs += 1;
            stats.quality_sum += result.quality;
            stats.cost_sum += result.cost_usd;
        }

        if self.results.len() >= RESULT_CACHE_CAP {
            self.results.clear();
        }
        self.results.insert(input.id.clone(), result.clone());

        info!(
            task_id = %input.id,
            success = result.success,
            quality = result.quality,
            cost_usd = result.cost_usd,
            elapsed_ms = result.elapsed_ms,
            automation = result.automation_triggered,
            "run complete"
        );
        result
    }

    async fn run_stages(&self, input: &NormalizedInput) -> RunResult {
        let mut result = RunResult {
            task_id: input.id.clone(),
            success: false,
            cost_usd: 0.0,
            elapsed_ms: 0,
            quality: 0.0,
            result: String::new(),
            fingerprint: String::new(),
            automation_triggered: false,
            reason: None,
        };

        // Stages 1-5 fail the run; record the error and bail.
        let execution = match self.front_stages(input, &mut result).await {
            Ok(execution) => execution,
            Err(e) => {
                let reason = e.to_string();
                warn!(task_id = %input.id, error = %reason, "run failed");
                self.record_failure(input, &reason);
                result.reason = Some(reason);
                return result;
            }
        };
        result.fingerprint = execution.fingerprint.clone();
        result.cost_usd += execution.cost_usd;
        result.result = execution.result_text.clone();
        result.success = true;

        // Stage 6: mandatory review; can only downgrade quality.
        let (quality, review_notes) = self.review(&execution, &mut result).await;
        result.quality = quality;

        // Stage 7: memory writes (best effort).
        if let Err(e) = self.write_memory(input, &execution, &result) {
            warn!(task_id = %input.id, error = %e, "memory write failed");
        }

        // Stage 8: pattern record + automation trigger (best effort).
        match self.record_pattern(&execution, quality) {
            Ok(triggered) => result.automation_triggered = triggered,
            Err(e) => warn!(task_id = %input.id, error = %e, "pattern record failed"),
        }

        // Stage 9: meso reflection, macro when eligible (best effort).
        self.reflect(input, &execution, &result, &review_notes).await;

        // Stage 10: goal update (infallible).
        self.goals.complete_one();

        result
    }

    /// Stages 1-5: intake, clarify, plan, select, execute.
    async fn front_stages(
        &self,
        input: &NormalizedInput,
        result: &mut RunResult,
    ) -> Result<Execution> {
        // Stage 1: intake normalization.
        let payload = input.payload.trim();
        if payload.is_empty() {
            return Err(OverhumanError::invalid_input("empty goal"));
        }
        let is_heartbeat = input.is_heartbeat();
        let mut goal = if is_heartbeat {
            MAINTENANCE_GOAL.to_string()
        } else {
            payload.to_string()
        };
        let (task_type, tier) = classify(&goal, is_heartbeat);
        debug!(task_id = %input.id, task_type, ?tier, "intake complete");

        let mut cost_usd = 0.0;
        let mut micro_notes = Vec::new();

        // Stage 2: clarification. Heartbeats bypass it; ordinary inputs
        // only pay for it when the goal is too thin to act on.
        if !is_heartbeat && needs_clarification(&goal) {
            let request = CompletionRequest::new(
                self.model_for(ModelTier::Simple),
                vec![ChatMessage::user(format!(
                    "Restate this request as one concrete, actionable goal. \
                     Reply with the goal only.\n\nRequest: {goal}"
                ))],
                128,
            );
            let response = self.provider.complete(&request).await.map_err(OverhumanError::from)?;
            cost_usd += response.cost_usd;
            let clarified = response.content.trim().to_string();
            if !clarified.is_empty() {
                goal = clarified;
            }
            self.micro("clarify", &goal, &goal, &mut cost_usd, &mut micro_notes)
                .await;
        }

        let fingerprint = PatternTracker::fingerprint(&goal, task_type);
        result.fingerprint = fingerprint.clone();

        // Stage 3: planning (dag decomposition). Heartbeats use the fixed
        // maintenance plan; trivial goals skip the model.
        let plan = if is_heartbeat {
            Plan::maintenance()
        } else if tier == ModelTier::Simple {
            Plan::single(goal.clone())
        } else {
            let request = CompletionRequest::new(
                self.model_for(ModelTier::Moderate),
                vec![ChatMessage::user(format!(
                    "Break this goal into a short numbered step plan (3 steps or fewer \
                     when possible). Mark non-chain dependencies as `[after N]`.\n\nGoal: {goal}"
                ))],
                256,
            );
            let response = self.provider.complete(&request).await.map_err(OverhumanError::from)?;
            cost_usd += response.cost_usd;
            let parsed = parse_plan(&response.content);
            self.micro("plan", &goal, &response.content, &mut cost_usd, &mut micro_notes)
                .await;
            if parsed.is_empty() {
                Plan::single(goal.clone())
            } else {
                parsed
            }
        };

        // Stage 4: agent/model selection.
        let model = self.model_for(tier);
        debug!(task_id = %input.id, model = %model, "model selected");

        // Stage 5: execution. A linked skill is preferred; a raising skill
        // falls back to the LLM and is flagged for review.
        let mut used_skill = false;
        let mut result_text = None;
        if let Some(pattern) = self.patterns.get(&fingerprint)?
            && let Some(skill_id) = pattern.skill_id.as_deref()
        {
            match self.skills.get(skill_id) {
                Some(skill) => match skill.execute(&goal, payload) {
                    Ok(text) => {
                        debug!(task_id = %input.id, skill = %skill_id, "skill execution");
                        used_skill = true;
                        result_text = Some(text);
                    }
                    Err(e) => {
                        warn!(skill = %skill_id, error = %e, "skill raised; falling back to llm");
                        self.flag_skill_for_review(skill_id, &fingerprint, &e.to_string());
                    }
                },
                None => {
                    warn!(skill = %skill_id, "linked skill not registered; using llm");
                }
            }
        }
        let result_text = match result_text {
            Some(text) => text,
            None => {
                let response = self
                    .provider
                    .complete(&self.execute_request(&goal, &plan, &model, is_heartbeat).await)
                    .await
                    .map_err(OverhumanError::from)?;
                cost_usd += response.cost_usd;
                response.content
            }
        };
        self.micro("execute", &goal, &result_text, &mut cost_usd, &mut micro_notes)
            .await;

        Ok(Execution {
            goal,
            task_type,
            fingerprint,
            result_text,
            used_skill,
            cost_usd,
            micro_notes,
        })
    }

    /// Build the execution request: soul principles, relevant memories,
    /// and recent exchanges as context.
    async fn execute_request(
        &self,
        goal: &str,
        plan: &Plan,
        model: &str,
        is_heartbeat: bool,
    ) -> CompletionRequest {
        let mut system = String::new();
        if is_heartbeat {
            system.push_str(
                "You are performing scheduled self-maintenance for a personal \
                 assistant daemon. Report findings; no user is waiting.\n",
            );
        } else {
            system.push_str("You are a personal assistant executing one task.\n");
        }
        match self.long_term.search(goal, 3) {
            Ok(memories) if !memories.is_empty() => {
                system.push_str("\nRelevant memory:\n");
                for m in memories {
                    system.push_str("- ");
                    system.push_str(&m.summary);
                    system.push('\n');
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "memory lookup failed during context assembly"),
        }

        let mut messages = vec![ChatMessage::system(system)];
        for entry in self.short_term.recent(6) {
            let role = match entry.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            messages.push(ChatMessage::new(role, entry.content));
        }
        messages.push(ChatMessage::user(format!(
            "Goal: {goal}\n\nPlan:\n{}\n\nCarry out the goal and reply with the result only.",
            plan.render()
        )));
        CompletionRequest::new(model, messages, 1024)
    }

    /// Stage 6: review. Parses `SCORE:` from the reviewer; a failed call
    /// downgrades quality instead of failing the run.
    async fn review(&self, execution: &Execution, result: &mut RunResult) -> (f64, String) {
        let request = CompletionRequest::new(
            self.model_for(ModelTier::Simple),
            vec![ChatMessage::user(format!(
                "Review this result against its goal.\nGoal: {}\nResult:\n{}\n\n\
                 Answer only in these lines:\nSCORE: <0..1>\nNOTES: <one line>",
                execution.goal, execution.result_text
            ))],
            128,
        );
        let (mut quality, mut notes) = match self.provider.complete(&request).await {
            Ok(response) => {
                result.cost_usd += response.cost_usd;
                let fields = crate::reflection::grammar::Fields::parse(&response.content);
                (
                    fields.score("SCORE", 0.5),
                    fields.optional("NOTES").unwrap_or_default(),
                )
            }
            Err(e) => {
                warn!(error = %e, "review call failed; downgrading quality");
                (REVIEW_FAILURE_QUALITY, format!("review failed: {e}"))
            }
        };

        let mut micro_cost = 0.0;
        let mut micro_notes = execution.micro_notes.clone();
        self.micro("review", &execution.goal, &notes, &mut micro_cost, &mut micro_notes)
            .await;
        result.cost_usd += micro_cost;
        if !micro_notes.is_empty() {
            if !notes.is_empty() {
                notes.push_str("; ");
            }
            notes.push_str(&micro_notes.join("; "));
            quality = quality.min(0.8);
        }
        (quality, notes)
    }

    /// Stage 7: short-term user/assistant turns plus a long-term summary.
    fn write_memory(
        &self,
        input: &NormalizedInput,
        execution: &Execution,
        result: &RunResult,
    ) -> Result<()> {
        self.short_term.push(
            ShortTermEntry::new(Role::User, input.payload.clone())
                .with_meta("task_id", &input.id)
                .with_meta("channel", &input.meta.channel),
        );
        self.short_term.push(
            ShortTermEntry::new(Role::Assistant, execution.result_text.clone())
                .with_meta("task_id", &input.id),
        );

        let summary = format!(
            "{}: {} -> {}",
            execution.task_type,
            execution.goal,
            truncate(&execution.result_text, 240),
        );
        let mut tags = vec![
            "run".to_string(),
            execution.task_type.to_string(),
            if result.success { "success".into() } else { "failure".into() },
        ];
        if execution.used_skill {
            tags.push("skill".into());
        }
        self.long_term.insert(&LongTermEntry::new(
            format!("{}_run", input.id),
            summary,
            tags,
            input.id.clone(),
        ))
    }

    /// Stage 8: record the observation; fire the automation trigger when
    /// the count crosses the threshold with no skill linked.
    fn record_pattern(&self, execution: &Execution, quality: f64) -> Result<bool> {
        let entry = self.patterns.record(
            &execution.fingerprint,
            &truncate(&execution.goal, 160),
            quality,
        )?;
        let triggered =
            entry.count >= self.config.automation_threshold && entry.skill_id.is_none();
        if triggered {
            info!(
                fingerprint = %&execution.fingerprint[..12],
                count = entry.count,
                "automation threshold reached"
            );
            let _ = self.automation_tx.send(AutomationRequest {
                fingerprint: execution.fingerprint.clone(),
                description: entry.description.clone(),
                goal: execution.goal.clone(),
            });
        }
        Ok(triggered)
    }

    /// Stage 9: meso reflection, then macro when eligible.
    async fn reflect(
        &self,
        input: &NormalizedInput,
        execution: &Execution,
        result: &RunResult,
        review_notes: &str,
    ) {
        let summary = RunSummary {
            task_id: input.id.clone(),
            goal: execution.goal.clone(),
            quality: result.quality,
            review_notes: review_notes.to_string(),
            cost_usd: result.cost_usd,
            elapsed_ms: result.elapsed_ms,
            fingerprint: execution.fingerprint.clone(),
        };
        match self.reflection.meso(&summary).await {
            Ok(insights) => {
                if let Some(goal) = insights.soul_suggestion {
                    self.goals.add(format!("soul: {goal}"));
                }
                if let Some(goal) = insights.skill_suggestion {
                    self.goals.add(format!("skill: {goal}"));
                }
            }
            Err(e) => warn!(task_id = %input.id, error = %e, "meso reflection failed"),
        }

        if self.reflection.macro_eligible() {
            let macro_input = self.assemble_macro_input();
            match self.reflection.run_macro(&macro_input).await {
                Ok(analysis) => {
                    for goal in analysis.new_goals {
                        self.goals.add(goal);
                    }
                }
                Err(e) => warn!(error = %e, "macro reflection failed"),
            }
        }
    }

    fn assemble_macro_input(&self) -> MacroInput {
        let (total_runs, avg_quality, avg_cost_usd) = {
            let stats = self.stats.lock();
            let n = stats.total_runs.max(1) as f64;
            (stats.total_runs, stats.quality_sum / n, stats.cost_sum / n)
        };
        let top_fingerprints = self
            .patterns
            .automatable(1)
            .unwrap_or_default()
            .into_iter()
            .take(5)
            .map(|p| (p.fingerprint, p.count))
            .collect();
        let recent_meso = self
            .long_term
            .search("meso", 5)
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.summary)
            .collect();
        MacroInput {
            total_runs,
            avg_quality,
            avg_cost_usd,
            skill_count: self.skills.len(),
            goals_pending: self.goals.pending(),
            goals_completed: self.goals.completed(),
            top_fingerprints,
            recent_meso,
        }
    }

    /// Best-effort long-term record of a failed or aborted run.
    fn record_failure(&self, input: &NormalizedInput, reason: &str) {
        let entry = LongTermEntry::new(
            format!("{}_error", input.id),
            format!("failed {}: {}", input.source, reason),
            vec!["run".into(), "failure".into()],
            input.id.clone(),
        );
        if let Err(e) = self.long_term.insert(&entry) {
            warn!(task_id = %input.id, error = %e, "failure record write failed");
        }
    }

    fn flag_skill_for_review(&self, skill_id: &str, fingerprint: &str, error: &str) {
        let entry = SkbEntry::new(
            format!("skill_review_{skill_id}"),
            SkbKind::Skill,
            self.config.agent_name.clone(),
            format!("skill {skill_id} raised on {fingerprint}: {error}"),
            vec!["skill-fallback".into()],
            0.0,
        );
        if let Err(e) = self.skb.insert(&entry) {
            warn!(skill = %skill_id, error = %e, "skill review flag write failed");
        }
    }

    async fn micro(
        &self,
        stage: &str,
        goal: &str,
        output: &str,
        cost: &mut f64,
        notes: &mut Vec<String>,
    ) {
        match self.reflection.micro(stage, goal, output).await {
            Ok(verdict) => {
                *cost += verdict.cost_usd;
                if !verdict.ok
                    && let Some(issue) = verdict.issue
                {
                    notes.push(format!("{stage}: {issue}"));
                }
            }
            Err(e) => warn!(stage, error = %e, "micro reflection failed"),
        }
    }

    fn model_for(&self, tier: ModelTier) -> String {
        self.router
            .select(tier, self.config.llm_budget_usd)
            .unwrap_or_else(|| self.config.default_model.clone())
    }
}

/// Classify a goal into a task type and complexity tier.
///
/// Keyword-driven, cheap, and deterministic; the LLM never sees this
/// decision, only its consequences (model choice and plan depth).
fn classify(goal: &str, is_heartbeat: bool) -> (&'static str, ModelTier) {
    if is_heartbeat {
        return ("maintenance", ModelTier::Simple);
    }
    let lower = goal.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has(&["summarize", "summary", "tldr"]) {
        ("summarize", ModelTier::Simple)
    } else if has(&["translate", "translation"]) {
        ("translate", ModelTier::Simple)
    } else if has(&["code", "implement", "debug", "refactor", "compile"]) {
        ("code", ModelTier::Complex)
    } else if has(&["design", "architect", "strategy", "analyze", "analysis"]) {
        ("analyze", ModelTier::Complex)
    } else if has(&["search", "find", "look up", "research"]) {
        ("search", ModelTier::Moderate)
    } else if has(&["write", "draft", "compose", "email"]) {
        ("write", ModelTier::Moderate)
    } else {
        ("general", ModelTier::Moderate)
    }
}

/// A goal too thin to act on gets one clarification pass.
fn needs_clarification(goal: &str) -> bool {
    goal.split_whitespace().count() < 2
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
