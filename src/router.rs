//! Fan-out over several instances' tool catalogs.
//!
//! Each instance's tools are republished as `<instance>-<tool>` with the description
//! prefixed `[INSTANCE]`. A call is routed by splitting its name on the first `-`.
//! The `local` instance is served in-process; every other instance is a peer gateway
//! reached over `GET /tools/list` and `POST /tools/call`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::AuthManager;
use crate::config::InstanceConfig;
use crate::protocol::ToolDescriptor;
use crate::tools::{LocalToolServer, ToolSource, ToolTarget};

/// A configured tenant with its resolved outbound key.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Instance {
    /// Resolve the outbound key from config, falling back to the key inventory.
    pub fn from_config(config: &InstanceConfig, auth: &AuthManager) -> Self {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| auth.instance_key(&config.name).map(str::to_string));
        Self {
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn is_local(&self) -> bool {
        self.base_url == crate::config::LOCAL_INSTANCE_URL
    }
}

#[derive(Debug, Deserialize)]
struct RemoteToolList {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

pub struct MultiInstanceRouter {
    instances: Vec<Instance>,
    local: Option<Arc<LocalToolServer>>,
    http: reqwest::Client,
}

impl MultiInstanceRouter {
    pub fn new(
        instances: Vec<Instance>,
        local: Option<Arc<LocalToolServer>>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            instances,
            local,
            http,
        }
    }

    pub fn instance_names(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.name.as_str()).collect()
    }

    fn find(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    async fn fetch_catalog(&self, instance: &Instance) -> anyhow::Result<Vec<ToolDescriptor>> {
        if instance.is_local() {
            let local = self
                .local
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("no local tool server configured"))?;
            return Ok(local.list_tools().await);
        }

        let mut request = self.http.get(format!("{}/tools/list", instance.base_url));
        if let Some(key) = &instance.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?.error_for_status()?;
        let list: RemoteToolList = response.json().await?;
        Ok(list.tools)
    }

    async fn call_remote(&self, instance: &Instance, tool: &str, arguments: Value) -> Value {
        let mut request = self
            .http
            .post(format!("{}/tools/call", instance.base_url))
            .json(&json!({ "tool": tool, "arguments": arguments }));
        if let Some(key) = &instance.api_key {
            request = request.bearer_auth(key);
        }

        let body = match request.send().await {
            Ok(response) => response.json::<Value>().await,
            Err(e) => Err(e),
        };

        match body {
            Ok(mut value) => {
                if let Value::Object(map) = &mut value {
                    map.insert("_source_user".into(), json!(instance.name));
                    map.insert("_source_url".into(), json!(instance.base_url));
                }
                value
            }
            Err(e) => {
                tracing::warn!(instance = %instance.name, tool, error = %e, "remote tool call failed");
                json!({ "error": e.to_string(), "user": instance.name, "tool": tool })
            }
        }
    }
}

#[async_trait]
impl ToolSource for MultiInstanceRouter {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let catalogs = join_all(self.instances.iter().map(|instance| async move {
            (instance, self.fetch_catalog(instance).await)
        }))
        .await;

        let mut tools = Vec::new();
        for (instance, catalog) in catalogs {
            match catalog {
                Ok(catalog) => {
                    let label = instance.name.to_uppercase();
                    tools.extend(catalog.into_iter().map(|tool| ToolDescriptor {
                        name: format!("{}-{}", instance.name, tool.name),
                        description: format!("[{label}] {}", tool.description),
                        input_schema: tool.input_schema,
                    }));
                }
                Err(e) => {
                    tracing::warn!(instance = %instance.name, error = %e, "skipping instance catalog");
                }
            }
        }
        tools
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        let target = self.resolve(name);
        let Some(instance) = self.find(&target.instance) else {
            let valid = self.instance_names();
            return json!({
                "error": format!(
                    "Unknown instance '{}'. Valid instances: {}",
                    target.instance,
                    valid.join(", ")
                ),
                "valid_instances": valid,
                "tool": name,
            });
        };

        if instance.is_local() {
            return match &self.local {
                Some(local) => local.call_tool(&target.tool, arguments).await,
                None => json!({ "error": "no local tool server configured", "user": instance.name, "tool": target.tool }),
            };
        }

        self.call_remote(instance, &target.tool, arguments).await
    }

    fn resolve(&self, name: &str) -> ToolTarget {
        let (instance, tool) = name.split_once('-').unwrap_or((name, ""));
        ToolTarget {
            instance: instance.to_string(),
            tool: tool.to_string(),
        }
    }
}
