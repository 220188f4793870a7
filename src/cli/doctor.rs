//! CLI `doctor` command: print what the gateway would start with.

use std::path::Path;

use anyhow::{Context, Result};

use crate::auth::AuthManager;
use crate::config::GatewayConfig;
use crate::db;
use crate::validator::ollama::OllamaClient;
use crate::validator::{load_policy, DENY_ALL_POLICY};

use super::format_bytes;

pub async fn doctor(config: &GatewayConfig, config_path: &Path) -> Result<()> {
    println!("Chronicle Health Report");
    println!("=======================");
    println!();
    println!(
        "Config:            {}{}",
        config_path.display(),
        if config_path.exists() { "" } else { " (not found, defaults)" }
    );
    println!(
        "Listen:            {}:{}",
        config.server.host, config.server.port
    );
    println!("Tool timeout:      {}s", config.server.tool_timeout_secs);
    println!();

    let keys_path = config.resolved_keys_file();
    let auth = AuthManager::load(&keys_path)?;
    println!("Keys:              {}", keys_path.display());
    println!(
        "  Master key:      {}",
        if auth.has_master_key() { "present" } else { "absent" }
    );
    println!("  Instance keys:   {}", auth.instance_key_count());
    if !auth.has_master_key() && auth.instance_key_count() == 0 {
        println!("  WARNING: no keys configured; every tools/call will be rejected.");
    }
    println!();

    if config.is_multi_instance() {
        println!("Mode:              multi-instance");
        for instance in &config.instances {
            let key = if instance.api_key.is_some() || auth.instance_key(&instance.name).is_some() {
                "key"
            } else {
                "no key"
            };
            println!("  {:<16} {} ({key})", instance.name, instance.base_url);
        }
    } else {
        println!("Mode:              single-instance ({})", config.server.instance_name);
    }
    println!();

    let db_path = config.resolved_db_path();
    if db_path.exists() {
        let size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
        let conn = db::open_database(&db_path).context("failed to open capture index")?;
        let report = db::check_database_health(&conn).context("failed to run health check")?;
        println!("Database:          {}", db_path.display());
        println!("  File size:       {}", format_bytes(size));
        println!("  Schema version:  {}", report.schema_version);
        println!("  Captures:        {}", report.capture_count);
        if report.integrity_ok {
            println!("  Integrity:       PASSED");
        } else {
            println!("  Integrity:       FAILED ({})", report.integrity_details);
        }
    } else {
        println!("Database:          not found at {}", db_path.display());
        println!("  It is created on first `chronicle serve`.");
    }
    println!();

    let validator = &config.validator;
    println!(
        "Validator:         {}",
        if validator.enabled { "enabled" } else { "disabled" }
    );
    println!("  Model:           {}", validator.model);
    let policy = load_policy(&config.resolved_policy_file());
    println!(
        "  Policy:          {}",
        if policy == DENY_ALL_POLICY {
            "missing (deny all)".to_string()
        } else {
            format!("{} bytes", policy.len())
        }
    );
    let ollama = OllamaClient::new(validator)?;
    match ollama.ping().await {
        Ok(()) => println!("  Ollama:          reachable at {}", ollama.host()),
        Err(e) => println!("  Ollama:          {} ({e})", ollama.host()),
    }

    Ok(())
}
