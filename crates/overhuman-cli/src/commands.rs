//! One-shot subcommands: `once`, `status`, `init`.

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use overhuman_core::SoulManager;
use overhuman_store::{PatternTracker, SharedKnowledgeBase, Store};
use overhuman_types::config::{Config, DataDir};
use overhuman_types::input::NormalizedInput;

use crate::daemon::Runtime;

/// Process a single payload through a freshly wired pipeline and print
/// the result. No daemon, no adapters, no pid guard.
pub async fn once(config: Config, data_dir: DataDir, payload: String) -> anyhow::Result<()> {
    let runtime = Runtime::build(config, &data_dir).await?;
    let cancel = CancellationToken::new();

    let input = NormalizedInput::text(payload, "cli");
    let result = runtime.pipeline.process(&input, &cancel).await;

    if result.success {
        println!("{}", result.result);
    } else {
        eprintln!(
            "failed: {}",
            result.reason.as_deref().unwrap_or("unknown failure")
        );
    }
    eprintln!(
        "quality {:.2} | cost ${:.4} | {}ms{}",
        result.quality,
        result.cost_usd,
        result.elapsed_ms,
        if result.automation_triggered {
            " | automation triggered"
        } else {
            ""
        }
    );

    runtime.store.close()?;
    if result.success { Ok(()) } else { anyhow::bail!("run failed") }
}

/// Print configuration and store diagnostics.
pub async fn status(config: Config, data_dir: DataDir) -> anyhow::Result<()> {
    println!("name:       {}", config.name);
    println!("provider:   {}", config.provider);
    println!("model:      {}", config.model);
    println!("api:        {}", config.api_addr);
    println!("data dir:   {}", data_dir.root().display());
    println!(
        "api key:    {}",
        if config.api_key.is_empty() { "unset" } else { "configured" }
    );

    if data_dir.db_path().exists() {
        let store = Store::open(&data_dir.db_path()).context("opening store")?;
        let patterns = PatternTracker::new(store.clone());
        let skb = SharedKnowledgeBase::new(store.clone());
        let automatable = patterns.automatable(config.daemon.automation_threshold)?;
        println!("skb items:  {}", skb.count()?);
        println!("automatable patterns (threshold {}):", config.daemon.automation_threshold);
        if automatable.is_empty() {
            println!("  none");
        }
        for entry in automatable {
            println!(
                "  {}  x{}  q{:.2}  {}",
                &entry.fingerprint[..12],
                entry.count,
                entry.avg_quality,
                entry.description
            );
        }
        store.close()?;
    } else {
        println!("store:      not created yet");
    }

    let soul = SoulManager::new(&data_dir);
    match soul.versions().await {
        Ok(versions) if !versions.is_empty() => {
            println!("soul:       v{}", versions.last().unwrap());
        }
        _ => println!("soul:       not initialized"),
    }
    Ok(())
}

/// Create the data directory, write the default config, and initialize
/// the identity document.
pub async fn init(data_dir: DataDir) -> anyhow::Result<()> {
    data_dir.ensure()?;

    let config_path = data_dir.config_path();
    if config_path.exists() {
        println!("config exists: {}", config_path.display());
    } else {
        Config::default().save(&config_path)?;
        println!("wrote {}", config_path.display());
    }

    let soul = SoulManager::new(&data_dir);
    match soul.init().await {
        Ok(()) => println!("soul initialized"),
        Err(overhuman_types::OverhumanError::Conflict { .. }) => {
            println!("soul already initialized");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
