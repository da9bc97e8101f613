//! Daemon wiring.
//!
//! Owns the single bounded input queue, constructs every component in
//! leaves-first order (store -> memory/pattern/skb/soul -> provider and
//! router -> reflection -> pipeline -> adapters), and drives the consumer
//! loop that feeds the orchestrator one request at a time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use overhuman_channels::{
    AdapterRegistry, ChannelAdapter, FileWatchAdapter, StdinAdapter,
};
use overhuman_core::reflection::{ReflectionConfig, ReflectionEngine};
use overhuman_core::{Pipeline, PipelineConfig, ShortTermMemory, SkillRegistry, SoulManager};
use overhuman_llm::{ModelRouter, build_provider};
use overhuman_services::api::{self, ApiState};
use overhuman_services::webhook::{self, WebhookState};
use overhuman_services::{HeartbeatService, ResponseRegistry, SYNC_REPLY_CHANNEL};
use overhuman_store::{LongTermMemory, PatternTracker, SharedKnowledgeBase, Store};
use overhuman_types::config::{Config, DataDir};
use overhuman_types::input::NormalizedInput;
use overhuman_types::memory::{SkbEntry, SkbKind};

use crate::pidfile::PidGuard;

/// Shutdown grace window for adapter tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything the daemon holds for its lifetime.
pub struct Runtime {
    /// Resolved configuration.
    pub config: Config,
    /// The shared store handle (closed on shutdown).
    pub store: Store,
    /// Long-term memory, also used directly by status commands.
    pub long_term: LongTermMemory,
    /// The pattern tracker.
    pub patterns: PatternTracker,
    /// The shared knowledge base.
    pub skb: SharedKnowledgeBase,
    /// The identity document manager.
    pub soul: Arc<SoulManager>,
    /// The skill registry.
    pub skills: Arc<SkillRegistry>,
    /// The orchestrator.
    pub pipeline: Arc<Pipeline>,
}

impl Runtime {
    /// Construct every component, leaves first.
    pub async fn build(config: Config, data_dir: &DataDir) -> anyhow::Result<Self> {
        data_dir.ensure().context("creating data directory")?;

        let store = Store::open(&data_dir.db_path()).context("opening store")?;
        let long_term = LongTermMemory::new(store.clone());
        let patterns = PatternTracker::new(store.clone());
        let skb = SharedKnowledgeBase::new(store.clone());

        let soul = Arc::new(SoulManager::new(data_dir));
        if soul.read().await.is_err() {
            soul.init().await.context("initializing soul")?;
            info!("soul initialized from default template");
        }

        let provider = build_provider(
            &config.provider,
            &config.api_key,
            &config.base_url,
            &config.model,
        );
        let router = ModelRouter::from_provider(provider.as_ref());

        let reflection = Arc::new(ReflectionEngine::new(
            Arc::clone(&provider),
            router.clone(),
            long_term.clone(),
            ReflectionConfig {
                macro_threshold: config.daemon.macro_threshold,
                fallback_model: config.model.clone(),
                ..Default::default()
            },
        ));

        let skills = Arc::new(SkillRegistry::new());
        let short_term = Arc::new(ShortTermMemory::new(config.daemon.short_term_capacity));
        let pipeline = Arc::new(Pipeline::new(
            provider,
            router,
            short_term,
            long_term.clone(),
            patterns.clone(),
            skb.clone(),
            Arc::clone(&skills),
            reflection,
            PipelineConfig {
                agent_name: config.name.clone(),
                automation_threshold: config.daemon.automation_threshold,
                default_model: config.model.clone(),
                ..Default::default()
            },
        ));

        Ok(Self {
            config,
            store,
            long_term,
            patterns,
            skb,
            soul,
            skills,
            pipeline,
        })
    }
}

/// Run the daemon until interrupted.
pub async fn run(config: Config, data_dir: DataDir, with_stdin: bool) -> anyhow::Result<()> {
    let _pid = PidGuard::acquire(data_dir.pid_path())?;
    let runtime = Runtime::build(config, &data_dir).await?;
    let cancel = CancellationToken::new();

    let (queue_tx, mut queue_rx) =
        mpsc::channel::<NormalizedInput>(runtime.config.daemon.queue_capacity.max(1));
    let responses = Arc::new(ResponseRegistry::new());

    // Adapters.
    let mut adapters = AdapterRegistry::new();
    if with_stdin {
        adapters.register(Arc::new(StdinAdapter::new()));
    }
    if let Some(watch) = runtime.config.watch.clone() {
        adapters.register(Arc::new(FileWatchAdapter::new(watch)));
    }
    let adapter_handles = adapters.start_all(&cancel, &queue_tx);

    // HTTP surfaces: ingestion API plus the webhook receiver on one
    // listener.
    let api_router = api::api_routes(ApiState::new(queue_tx.clone(), Arc::clone(&responses)));
    let webhook_router = webhook::webhook_routes(
        webhook::DEFAULT_PATH,
        WebhookState {
            queue: queue_tx.clone(),
            source_url: format!("http://{}{}", runtime.config.api_addr, webhook::DEFAULT_PATH),
        },
    );
    let http = Router::new().merge(api_router).merge(webhook_router);
    let http_cancel = cancel.clone();
    let api_addr = runtime.config.api_addr.clone();
    let http_task = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(&api_addr).await?;
        info!(addr = %api_addr, "http surfaces listening");
        axum::serve(listener, http)
            .with_graceful_shutdown(async move { http_cancel.cancelled().await })
            .await
    });

    // Heartbeat ticker.
    let heartbeat = HeartbeatService::new(runtime.config.daemon.heartbeat_minutes, queue_tx.clone());
    let heartbeat_cancel = cancel.clone();
    let heartbeat_task = tokio::spawn(async move { heartbeat.start(heartbeat_cancel).await });

    // Automation requests: record each candidate into the SKB where the
    // external synthesizer picks them up.
    if let Some(mut automation_rx) = runtime.pipeline.automation_rx() {
        let skb = runtime.skb.clone();
        let agent = runtime.config.name.clone();
        let automation_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    _ = automation_cancel.cancelled() => break,
                    request = automation_rx.recv() => match request {
                        Some(request) => request,
                        None => break,
                    }
                };
                info!(
                    fingerprint = %&request.fingerprint[..12],
                    "automation candidate ready for synthesis"
                );
                let entry = SkbEntry::new(
                    format!("automation_{}", request.fingerprint),
                    SkbKind::Pattern,
                    agent.clone(),
                    format!("automate: {} ({})", request.description, request.goal),
                    vec!["automation-candidate".into()],
                    0.5,
                );
                if let Err(e) = skb.insert(&entry) {
                    warn!(error = %e, "automation candidate write failed");
                }
            }
        });
    }

    // Drop the daemon's own sender so the consumer ends once adapters do.
    drop(queue_tx);

    info!(name = %runtime.config.name, "daemon running");

    // Consumer loop: one request at a time, in arrival order.
    loop {
        let input = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            input = queue_rx.recv() => match input {
                Some(input) => input,
                None => break,
            }
        };
        debug!(input_id = %input.id, source = %input.source, "dequeued");
        let result = runtime.pipeline.process(&input, &cancel).await;
        deliver_reply(&adapters, &responses, &input, &result).await;
    }

    // Shutdown: cancel the ambient context, give adapters the grace
    // window, close the store.
    cancel.cancel();
    AdapterRegistry::stop_all(adapter_handles, SHUTDOWN_GRACE).await;
    let _ = heartbeat_task.await;
    let _ = http_task.await;
    runtime.store.close()?;
    info!("daemon stopped");
    Ok(())
}

/// Route the final result back through whatever holds the correlation id.
async fn deliver_reply(
    adapters: &AdapterRegistry,
    responses: &ResponseRegistry,
    input: &NormalizedInput,
    result: &overhuman_types::result::RunResult,
) {
    // Replies need both a correlation id and a reply channel.
    let Some(correlation_id) = input.correlation_id.as_deref() else {
        return;
    };
    let outcome = if result.success {
        Ok(result.result.clone())
    } else {
        Err(result
            .reason
            .clone()
            .unwrap_or_else(|| "unknown failure".into()))
    };
    match input.reply_to.as_deref() {
        Some(SYNC_REPLY_CHANNEL) => {
            if !responses.deliver(correlation_id, outcome) {
                debug!(correlation_id, "sync caller no longer waiting");
            }
        }
        Some(adapter_name) => match adapters.get(adapter_name) {
            Some(adapter) => {
                let text = match outcome {
                    Ok(text) => text,
                    Err(reason) => format!("error: {reason}"),
                };
                if let Err(e) = adapter.send(correlation_id, &text).await {
                    warn!(adapter = adapter_name, error = %e, "reply delivery failed");
                }
            }
            None => {
                warn!(adapter = adapter_name, "reply channel unknown; result dropped");
            }
        },
        None => {}
    }
}
