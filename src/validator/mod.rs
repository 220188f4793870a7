//! Policy gate for tool calls.
//!
//! Every call ends in ALLOW or DENY. Decision order, first match wins:
//!
//! 1. safe (read-only) tools are allowed without caching
//! 2. a disabled or degraded gate allows everything
//! 3. a cached verdict for the same tool and arguments is reused
//! 4. heuristics deny malformed or adversarial arguments
//! 5. heuristic-only tools are allowed once heuristics pass
//! 6. everything else is adjudicated by a local LLM against the security policy
//!
//! LLM failures are asymmetric. A timeout or error response denies. An unreachable
//! Ollama allows and moves the gate from [`GateMode::Enforcing`] to
//! [`GateMode::Degraded`]. That transition is one-way and holds until restart.
//!
//! Verdicts are cached by tool name and canonical arguments only. The calling
//! instance is not part of the key, so in multi-instance mode a verdict reached
//! for `alice` is reused for the same call against `bob`.

pub mod cache;
pub mod heuristics;
pub mod ollama;

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use serde_json::Value;

use crate::config::ValidatorConfig;
use crate::tools::{ToolName, ToolRisk};
use cache::VerdictCache;
use ollama::{build_prompt, AdjudicationError, OllamaClient};

/// Policy used when the policy file cannot be read.
pub const DENY_ALL_POLICY: &str =
    "DENY ALL REQUESTS. No security policy is configured, so no tool call may be allowed.";

/// Machine-readable reason attached to every verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    SafeTool,
    ValidationDisabled,
    Cached,
    WildcardOrEmptyQuery,
    QueryTooShort,
    ExcessiveResultLimit,
    SqlInjectionPattern,
    PromptInjectionPattern,
    HeuristicPassed,
    AiApproved,
    /// The model's raw reply when it did not answer ALLOW.
    AiDenied(String),
    TimeoutDefaultDeny,
    OllamaError,
    OllamaUnavailablePassthrough,
}

impl Reason {
    /// Stable code for logs and client-facing denials. Never contains model text.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SafeTool => "safe_tool",
            Self::ValidationDisabled => "validation_disabled",
            Self::Cached => "cached",
            Self::WildcardOrEmptyQuery => "wildcard_or_empty_query",
            Self::QueryTooShort => "query_too_short",
            Self::ExcessiveResultLimit => "excessive_result_limit",
            Self::SqlInjectionPattern => "sql_injection_pattern",
            Self::PromptInjectionPattern => "prompt_injection_pattern",
            Self::HeuristicPassed => "heuristic_passed",
            Self::AiApproved => "ai_approved",
            Self::AiDenied(_) => "ai_denied",
            Self::TimeoutDefaultDeny => "timeout_default_deny",
            Self::OllamaError => "ollama_error",
            Self::OllamaUnavailablePassthrough => "ollama_unavailable_passthrough",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AiDenied(text) => f.write_str(text),
            other => f.write_str(other.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: Reason,
}

impl Verdict {
    fn allow(reason: Reason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn deny(reason: Reason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Full decision pipeline.
    Enforcing,
    /// Ollama was unreachable once; validation is skipped until restart.
    Degraded,
    /// Turned off in configuration.
    Disabled,
}

impl GateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enforcing => "enforcing",
            Self::Degraded => "degraded",
            Self::Disabled => "disabled",
        }
    }
}

pub struct PolicyGate {
    enabled: bool,
    degraded: AtomicBool,
    policy: String,
    cache: VerdictCache,
    ollama: OllamaClient,
    llm_calls: AtomicU64,
}

impl PolicyGate {
    pub fn new(config: &ValidatorConfig, policy: String) -> anyhow::Result<Self> {
        Ok(Self {
            enabled: config.enabled,
            degraded: AtomicBool::new(false),
            policy,
            cache: VerdictCache::new(config.cache_ttl()),
            ollama: OllamaClient::new(config)?,
            llm_calls: AtomicU64::new(0),
        })
    }

    /// Build from config, reading the policy file once.
    pub fn from_config(config: &ValidatorConfig, policy_path: &Path) -> anyhow::Result<Self> {
        Self::new(config, load_policy(policy_path))
    }

    pub fn mode(&self) -> GateMode {
        if !self.enabled {
            GateMode::Disabled
        } else if self.degraded.load(Ordering::Acquire) {
            GateMode::Degraded
        } else {
            GateMode::Enforcing
        }
    }

    /// Number of adjudication requests sent to Ollama so far.
    pub fn llm_calls(&self) -> u64 {
        self.llm_calls.load(Ordering::Relaxed)
    }

    pub fn cached_verdicts(&self) -> usize {
        self.cache.len()
    }

    pub async fn validate(&self, tool_name: &str, arguments: &Value, instance: &str) -> Verdict {
        let verdict = self.decide(tool_name, arguments, instance).await;
        tracing::info!(
            tool = tool_name,
            instance,
            allowed = verdict.allowed,
            reason = verdict.reason.code(),
            "policy verdict"
        );
        verdict
    }

    async fn decide(&self, tool_name: &str, arguments: &Value, instance: &str) -> Verdict {
        let risk = tool_name
            .parse::<ToolName>()
            .map(|tool| tool.risk())
            .unwrap_or(ToolRisk::Adjudicated);

        if risk == ToolRisk::Safe {
            return Verdict::allow(Reason::SafeTool);
        }

        if self.mode() != GateMode::Enforcing {
            return Verdict::allow(Reason::ValidationDisabled);
        }

        let key = VerdictCache::key(tool_name, arguments);
        if let Some(allowed) = self.cache.get_at(&key, Instant::now()) {
            return Verdict {
                allowed,
                reason: Reason::Cached,
            };
        }

        let verdict = if let Some(reason) = heuristics::check(tool_name, arguments) {
            Verdict::deny(reason)
        } else if risk == ToolRisk::HeuristicOnly {
            Verdict::allow(Reason::HeuristicPassed)
        } else {
            self.adjudicate(tool_name, arguments, instance).await
        };

        self.cache.insert_at(key, verdict.allowed, Instant::now());
        verdict
    }

    async fn adjudicate(&self, tool_name: &str, arguments: &Value, instance: &str) -> Verdict {
        let prompt = build_prompt(&self.policy, instance, tool_name, arguments);
        self.llm_calls.fetch_add(1, Ordering::Relaxed);

        match self.ollama.generate(&prompt).await {
            Ok(text) if text.to_uppercase().contains("ALLOW") => Verdict::allow(Reason::AiApproved),
            Ok(text) => Verdict::deny(Reason::AiDenied(text)),
            Err(AdjudicationError::Timeout) => {
                tracing::warn!(tool = tool_name, "validator timed out, denying");
                Verdict::deny(Reason::TimeoutDefaultDeny)
            }
            Err(AdjudicationError::Unreachable(detail)) => {
                if !self.degraded.swap(true, Ordering::AcqRel) {
                    tracing::error!(
                        host = self.ollama.host(),
                        error = %detail,
                        "validator unreachable; policy gate degraded until restart"
                    );
                }
                Verdict::allow(Reason::OllamaUnavailablePassthrough)
            }
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "validator error, denying");
                Verdict::deny(Reason::OllamaError)
            }
        }
    }
}

/// Read the security policy; an unreadable or empty file yields [`DENY_ALL_POLICY`].
pub fn load_policy(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => {
            tracing::info!(path = %path.display(), bytes = text.len(), "security policy loaded");
            text
        }
        Ok(_) => {
            tracing::warn!(path = %path.display(), "security policy is empty, defaulting to deny all");
            DENY_ALL_POLICY.to_string()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "security policy unreadable, defaulting to deny all");
            DENY_ALL_POLICY.to_string()
        }
    }
}
