//! # Auto-Reply Demo Entry Point
//!
//! Loads rules from a JSON file into an in-memory store and resolves messages
//! read from stdin, one per line:
//!
//! ```text
//! <group_id> <message text>
//! !disable <group_id> <rule_id>
//! !enable <group_id> <rule_id>
//! !remove <group_id> <rule_id>
//! ```
//!
//! Usage: `autoreply-demo <rules.json> [config.json]`. Without a config file,
//! settings come from `RULE_*` environment variables. Engine logs go to
//! stderr; `RUST_LOG` overrides the default `autoreply=info` filter.

use autoreply::{
    Engine, EngineConfig, GroupId, InvalidationService, MaintenanceConfig, MaintenanceScheduler,
    MemoryRuleStore, RuleChange, RuleId,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autoreply=info"));

    // `init` also installs the `log` -> tracing bridge for the engine's records
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    println!("=================================================");
    println!("  Keyword Auto-Reply Engine - Demo Console       ");
    println!("=================================================");
    println!();

    let mut args = std::env::args().skip(1);
    let rules_path = args
        .next()
        .ok_or("usage: autoreply-demo <rules.json> [config.json]")?;

    let config = match args.next() {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::from_env()?,
    };

    let rules_json = std::fs::read_to_string(&rules_path)
        .map_err(|e| format!("Failed to read {}: {}", rules_path, e))?;
    let store = Arc::new(MemoryRuleStore::from_json_str(&rules_json)?);

    println!("Loaded {} rules for {} groups", store.rule_count(), store.group_ids().len());
    println!("  - Cache TTL: {}s", config.cache_ttl_secs);
    println!("  - Default cooldown: {}s", config.default_cooldown_secs);
    println!("  - Fuzzy threshold: {:.2}", config.fuzzy_threshold);
    println!();

    let engine = Arc::new(Engine::new(store.clone(), config)?);
    let invalidations = InvalidationService::new(Arc::clone(&engine));

    let scheduler = Arc::new(MaintenanceScheduler::new(
        Arc::clone(&engine),
        MaintenanceConfig::default(),
    ));
    tokio::spawn(scheduler.start());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('!') {
            match admin_command(&store, command) {
                Ok(change) => {
                    invalidations.apply(&change);
                    println!("ok: {:?}", change);
                }
                Err(e) => println!("error: {}", e),
            }
            continue;
        }

        let Some((group, text)) = line.split_once(' ') else {
            println!("error: expected '<group_id> <message>'");
            continue;
        };
        let group_id = match group.parse::<GroupId>() {
            Ok(id) => id,
            Err(e) => {
                println!("error: bad group id {:?}: {}", group, e);
                continue;
            }
        };

        match engine.resolve_now(group_id, text).await {
            Ok(result) if result.fired => println!(
                "reply (rule #{}): {}",
                result.rule_id.unwrap_or_default(),
                result.reply_text.unwrap_or_default()
            ),
            Ok(_) => println!("(no reply)"),
            Err(e) => println!("(no reply: {})", e),
        }
    }

    let stats = engine.stats();
    println!();
    println!("Engine Statistics:");
    println!("  - Resolutions: {}", stats.metrics.resolutions);
    println!("  - Fired: {}", stats.metrics.fired);
    println!("  - Cooldown blocked: {}", stats.metrics.cooldown_blocked);
    println!("  - Cache hit rate: {:.1}%", stats.metrics.cache_hit_rate() * 100.0);

    Ok(())
}

fn admin_command(store: &MemoryRuleStore, command: &str) -> Result<RuleChange, String> {
    let parts: Vec<&str> = command.split_whitespace().collect();
    let [verb, group, rule] = parts.as_slice() else {
        return Err("expected '!<enable|disable|remove> <group_id> <rule_id>'".to_string());
    };
    let group_id = group
        .parse::<GroupId>()
        .map_err(|e| format!("bad group id: {}", e))?;
    let rule_id = rule
        .parse::<RuleId>()
        .map_err(|e| format!("bad rule id: {}", e))?;

    let change = match *verb {
        "enable" => store.set_enabled(group_id, rule_id, true),
        "disable" => store.set_enabled(group_id, rule_id, false),
        "remove" => store.remove(group_id, rule_id),
        other => return Err(format!("unknown command {:?}", other)),
    };
    change.ok_or_else(|| format!("rule {} not found in group {}", rule_id, group_id))
}
