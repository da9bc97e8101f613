//! The multi-level reflection engine.
//!
//! Four nested evaluation loops, ordered by scope:
//!
//! - **micro** -- per pipeline stage, a cheap ok/confidence verdict
//! - **meso** -- per completed run, insights stored to long-term memory
//! - **macro** -- every N runs, aggregate strategy analysis
//! - **mega** -- rare, manual: reflection on the reflection process itself
//!
//! Every level prompts the LLM and parses the fixed line-prefix grammar in
//! [`grammar`]; callers receive closed-field records, never prose.

pub mod grammar;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use overhuman_llm::{ChatMessage, CompletionRequest, ModelRouter, ModelTier, Provider};
use overhuman_store::LongTermMemory;
use overhuman_types::Result;
use overhuman_types::memory::LongTermEntry;

use grammar::Fields;

/// Stage names micro-reflection watches by default.
pub const DEFAULT_MICRO_STAGES: [&str; 3] = ["clarify", "execute", "review"];

/// How much stage output micro-reflection gets to see.
const MICRO_OUTPUT_CAP: usize = 500;

/// Tuning for the reflection engine.
#[derive(Debug, Clone)]
pub struct ReflectionConfig {
    /// Stages micro-reflection evaluates. Stages outside the set get the
    /// free pass verdict without an LLM call.
    pub micro_stages: HashSet<String>,

    /// Meso runs accumulated before macro becomes eligible.
    pub macro_threshold: u64,

    /// Model used when the router has no catalog (bare endpoints).
    pub fallback_model: String,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            micro_stages: DEFAULT_MICRO_STAGES.iter().map(|s| s.to_string()).collect(),
            macro_threshold: 10,
            fallback_model: String::new(),
        }
    }
}

// ── Verdict types ───────────────────────────────────────────────────────

/// Per-stage verdict from micro reflection.
#[derive(Debug, Clone)]
pub struct MicroVerdict {
    /// Whether the stage output looks sound.
    pub ok: bool,
    /// Model confidence in [0, 1].
    pub confidence: f64,
    /// What looked wrong, when anything did.
    pub issue: Option<String>,
    /// How to do better next time.
    pub suggestion: Option<String>,
    /// Cost of the verdict in USD; zero for disabled stages.
    pub cost_usd: f64,
}

impl MicroVerdict {
    /// The free pass returned for disabled stages.
    fn pass() -> Self {
        Self {
            ok: true,
            confidence: 1.0,
            issue: None,
            suggestion: None,
            cost_usd: 0.0,
        }
    }
}

/// Per-run insights from meso reflection.
#[derive(Debug, Clone)]
pub struct MesoInsights {
    /// What worked this run.
    pub went_well: Vec<String>,
    /// What to improve.
    pub improvements: Vec<String>,
    /// Suggested edit to the identity document, if any.
    pub soul_suggestion: Option<String>,
    /// Suggested skill to synthesize, if any.
    pub skill_suggestion: Option<String>,
    /// Cost of the reflection in USD.
    pub cost_usd: f64,
}

/// Summary of one completed run, fed to meso reflection.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Task id of the run.
    pub task_id: String,
    /// The goal that was executed.
    pub goal: String,
    /// Review-assigned quality in [0, 1].
    pub quality: f64,
    /// Free-text notes from the review stage.
    pub review_notes: String,
    /// Total run cost in USD.
    pub cost_usd: f64,
    /// Wall-clock milliseconds.
    pub elapsed_ms: u64,
    /// The run's pattern fingerprint; empty for failed intakes.
    pub fingerprint: String,
}

/// Aggregate input for macro reflection.
#[derive(Debug, Clone, Default)]
pub struct MacroInput {
    /// Total runs processed since start.
    pub total_runs: u64,
    /// Mean quality across those runs.
    pub avg_quality: f64,
    /// Mean cost across those runs in USD.
    pub avg_cost_usd: f64,
    /// Registered deterministic skills.
    pub skill_count: usize,
    /// Goals still pending.
    pub goals_pending: Vec<String>,
    /// Goals completed.
    pub goals_completed: u64,
    /// Most-observed fingerprints with their counts.
    pub top_fingerprints: Vec<(String, u64)>,
    /// Recent meso summaries, newest first.
    pub recent_meso: Vec<String>,
}

/// Strategy-level output from macro reflection.
#[derive(Debug, Clone)]
pub struct MacroAnalysis {
    /// Behavioral strategy changes to adopt.
    pub strategy_changes: Vec<String>,
    /// Proposed identity-document updates.
    pub soul_updates: Vec<String>,
    /// New goals to pursue.
    pub new_goals: Vec<String>,
    /// Task shapes worth turning into code.
    pub skills_to_generate: Vec<String>,
    /// Threshold adjustments to consider.
    pub threshold_changes: Vec<String>,
    /// Cost of the analysis in USD.
    pub cost_usd: f64,
}

/// Effectiveness statistics fed to mega reflection.
#[derive(Debug, Clone, Default)]
pub struct MegaStats {
    /// Meso reflections run so far.
    pub total_meso: u64,
    /// Macro reflections run so far.
    pub total_macro: u64,
    /// How many produced insights were actually acted on.
    pub insights_acted_on: u64,
    /// Quality trend tag (e.g. "rising", "flat", "falling").
    pub quality_trend: String,
    /// Cost trend tag.
    pub cost_trend: String,
}

/// Reflection-on-reflection output from mega.
#[derive(Debug, Clone)]
pub struct MegaAssessment {
    /// One-line effectiveness assessment.
    pub effectiveness: String,
    /// Adjustments to the meso loop.
    pub meso_adjustments: Vec<String>,
    /// Adjustments to the macro loop.
    pub macro_adjustments: Vec<String>,
    /// Threshold adjustments.
    pub threshold_changes: Vec<String>,
    /// Changes to the reflection process itself.
    pub process_changes: Vec<String>,
    /// Cost of the assessment in USD.
    pub cost_usd: f64,
}

#[derive(Debug, Default)]
struct Counters {
    runs_since_macro: u64,
    total_meso: u64,
    total_macro: u64,
}

// ── Engine ──────────────────────────────────────────────────────────────

/// The four-level reflection engine.
pub struct ReflectionEngine {
    provider: Arc<dyn Provider>,
    router: ModelRouter,
    long_term: LongTermMemory,
    config: ReflectionConfig,
    counters: Mutex<Counters>,
}

impl ReflectionEngine {
    /// Build an engine over a provider, its router, and long-term memory.
    pub fn new(
        provider: Arc<dyn Provider>,
        router: ModelRouter,
        long_term: LongTermMemory,
        config: ReflectionConfig,
    ) -> Self {
        Self {
            provider,
            router,
            long_term,
            config,
            counters: Mutex::new(Counters::default()),
        }
    }

    fn model_for(&self, tier: ModelTier) -> String {
        self.router
            .select(tier, 0.0)
            .unwrap_or_else(|| self.config.fallback_model.clone())
    }

    /// Micro: evaluate one stage's output.
    ///
    /// Disabled stages return `ok=true, confidence=1.0, cost=0` without an
    /// LLM call.
    pub async fn micro(&self, stage: &str, goal: &str, output: &str) -> Result<MicroVerdict> {
        if !self.config.micro_stages.contains(stage) {
            return Ok(MicroVerdict::pass());
        }

        let capped: String = output.chars().take(MICRO_OUTPUT_CAP).collect();
        let prompt = format!(
            "You are auditing one step of an assistant pipeline.\n\
             Stage: {stage}\nGoal: {goal}\nStage output:\n{capped}\n\n\
             Answer only in these lines:\n\
             OK: YES|NO\nCONFIDENCE: <0..1>\nISSUE: <text|NONE>\nSUGGESTION: <text|NONE>"
        );
        let request = CompletionRequest::new(
            self.model_for(ModelTier::Simple),
            vec![ChatMessage::user(prompt)],
            128,
        );
        let response = self.provider.complete(&request).await?;
        let fields = Fields::parse(&response.content);
        let verdict = MicroVerdict {
            ok: fields.flag("OK", true),
            confidence: fields.score("CONFIDENCE", 0.5),
            issue: fields.optional("ISSUE"),
            suggestion: fields.optional("SUGGESTION"),
            cost_usd: response.cost_usd,
        };
        debug!(stage, ok = verdict.ok, confidence = verdict.confidence, "micro verdict");
        Ok(verdict)
    }

    /// Meso: reflect on one completed run.
    ///
    /// Stores a summary record in long-term memory under `{task_id}_meso`
    /// and advances the runs-since-macro counter.
    pub async fn meso(&self, summary: &RunSummary) -> Result<MesoInsights> {
        let prompt = format!(
            "Reflect on this completed run.\n\
             Goal: {}\nQuality: {:.2}\nReview notes: {}\nCost: ${:.4}\n\
             Elapsed: {}ms\nFingerprint: {}\n\n\
             Answer only in these lines:\n\
             WENT_WELL: a, b, c\nIMPROVEMENTS: a, b\n\
             SOUL_SUGGESTION: <text|NONE>\nSKILL_SUGGESTION: <text|NONE>",
            summary.goal,
            summary.quality,
            summary.review_notes,
            summary.cost_usd,
            summary.elapsed_ms,
            summary.fingerprint,
        );
        let request = CompletionRequest::new(
            self.model_for(ModelTier::Simple),
            vec![ChatMessage::user(prompt)],
            512,
        );
        let response = self.provider.complete(&request).await?;
        let fields = Fields::parse(&response.content);
        let insights = MesoInsights {
            went_well: fields.list("WENT_WELL"),
            improvements: fields.list("IMPROVEMENTS"),
            soul_suggestion: fields.optional("SOUL_SUGGESTION"),
            skill_suggestion: fields.optional("SKILL_SUGGESTION"),
            cost_usd: response.cost_usd,
        };

        let mut tags = vec!["reflection".to_string(), "meso".to_string()];
        if !summary.fingerprint.is_empty() {
            tags.push(summary.fingerprint.clone());
        }
        let record = format!(
            "run {} quality {:.2}: went well: {}; improve: {}",
            summary.task_id,
            summary.quality,
            insights.went_well.join(", "),
            insights.improvements.join(", "),
        );
        self.long_term.insert(&LongTermEntry::new(
            format!("{}_meso", summary.task_id),
            record,
            tags,
            summary.task_id.clone(),
        ))?;

        {
            let mut counters = self.counters.lock();
            counters.runs_since_macro += 1;
            counters.total_meso += 1;
        }
        debug!(task_id = %summary.task_id, "meso reflection stored");
        Ok(insights)
    }

    /// True when enough meso runs have accumulated for a macro pass.
    pub fn macro_eligible(&self) -> bool {
        self.counters.lock().runs_since_macro >= self.config.macro_threshold
    }

    /// Runs accumulated since the last macro pass.
    pub fn runs_since_macro(&self) -> u64 {
        self.counters.lock().runs_since_macro
    }

    /// Macro: aggregate strategy analysis over recent runs.
    ///
    /// Stores its record tagged `["reflection","macro"]` and resets the
    /// runs-since-macro counter.
    pub async fn run_macro(&self, input: &MacroInput) -> Result<MacroAnalysis> {
        let fingerprints = input
            .top_fingerprints
            .iter()
            .map(|(fp, n)| format!("{} x{}", &fp[..fp.len().min(12)], n))
            .collect::<Vec<_>>()
            .join(", ");
        let prompt = format!(
            "Review this agent's recent performance and adjust strategy.\n\
             Total runs: {}\nAvg quality: {:.2}\nAvg cost: ${:.4}\n\
             Skills: {}\nGoals pending: {}\nGoals completed: {}\n\
             Top patterns: {}\nRecent reflections:\n{}\n\n\
             Answer only in these lines:\n\
             STRATEGY_CHANGES: a, b | NONE\nSOUL_UPDATES: a, b | NONE\n\
             NEW_GOALS: a, b | NONE\nSKILLS_TO_GENERATE: a, b | NONE\n\
             THRESHOLD_CHANGES: a, b | NONE",
            input.total_runs,
            input.avg_quality,
            input.avg_cost_usd,
            input.skill_count,
            input.goals_pending.join("; "),
            input.goals_completed,
            fingerprints,
            input.recent_meso.join("\n"),
        );
        let request = CompletionRequest::new(
            self.model_for(ModelTier::Moderate),
            vec![ChatMessage::user(prompt)],
            1024,
        );
        let response = self.provider.complete(&request).await?;
        let fields = Fields::parse(&response.content);
        let analysis = MacroAnalysis {
            strategy_changes: fields.list("STRATEGY_CHANGES"),
            soul_updates: fields.list("SOUL_UPDATES"),
            new_goals: fields.list("NEW_GOALS"),
            skills_to_generate: fields.list("SKILLS_TO_GENERATE"),
            threshold_changes: fields.list("THRESHOLD_CHANGES"),
            cost_usd: response.cost_usd,
        };

        let record = format!(
            "macro over {} runs (avg quality {:.2}): strategy: {}; new goals: {}; skills: {}",
            input.total_runs,
            input.avg_quality,
            analysis.strategy_changes.join(", "),
            analysis.new_goals.join(", "),
            analysis.skills_to_generate.join(", "),
        );
        self.long_term.insert(&LongTermEntry::new(
            format!("macro_{}", Uuid::new_v4()),
            record,
            vec!["reflection".into(), "macro".into()],
            String::new(),
        ))?;

        {
            let mut counters = self.counters.lock();
            counters.runs_since_macro = 0;
            counters.total_macro += 1;
        }
        info!(total_runs = input.total_runs, "macro reflection stored");
        Ok(analysis)
    }

    /// Mega: reflect on the reflection process itself. Invoked rarely and
    /// manually.
    pub async fn run_mega(&self, stats: &MegaStats) -> Result<MegaAssessment> {
        let prompt = format!(
            "Assess whether this agent's reflection loops are earning their cost.\n\
             Meso runs: {}\nMacro runs: {}\nInsights acted on: {}\n\
             Quality trend: {}\nCost trend: {}\n\n\
             Answer only in these lines:\n\
             EFFECTIVENESS: <one line>\nMESO_ADJUSTMENTS: a, b | NONE\n\
             MACRO_ADJUSTMENTS: a, b | NONE\nTHRESHOLD_CHANGES: a, b | NONE\n\
             PROCESS_CHANGES: a, b | NONE",
            stats.total_meso,
            stats.total_macro,
            stats.insights_acted_on,
            stats.quality_trend,
            stats.cost_trend,
        );
        let request = CompletionRequest::new(
            self.model_for(ModelTier::Complex),
            vec![ChatMessage::user(prompt)],
            1024,
        );
        let response = self.provider.complete(&request).await?;
        let fields = Fields::parse(&response.content);
        let assessment = MegaAssessment {
            effectiveness: fields
                .optional("EFFECTIVENESS")
                .unwrap_or_else(|| "no assessment produced".into()),
            meso_adjustments: fields.list("MESO_ADJUSTMENTS"),
            macro_adjustments: fields.list("MACRO_ADJUSTMENTS"),
            threshold_changes: fields.list("THRESHOLD_CHANGES"),
            process_changes: fields.list("PROCESS_CHANGES"),
            cost_usd: response.cost_usd,
        };

        self.long_term.insert(&LongTermEntry::new(
            format!("mega_{}", Uuid::new_v4()),
            format!("mega: {}", assessment.effectiveness),
            vec!["reflection".into(), "mega".into()],
            String::new(),
        ))?;
        info!("mega reflection stored");
        Ok(assessment)
    }

    /// Lifetime meso/macro counts, for [`MegaStats`] assembly.
    pub fn totals(&self) -> (u64, u64) {
        let counters = self.counters.lock();
        (counters.total_meso, counters.total_macro)
    }
}
