//! Multi-tenant tool-calling gateway for a personal capture history.
//!
//! Chronicle speaks [MCP](https://modelcontextprotocol.io/) JSON-RPC over HTTP and puts
//! every `tools/call` through a fixed pipeline before anything touches data:
//!
//! | Stage | Module | Rejects with |
//! |-------|--------|--------------|
//! | Authenticate | [`auth`] | `Unauthorized` |
//! | Rate limit | [`rate_limit`] | retry-after hint |
//! | Validate | [`validator`] | policy reason code |
//! | Dispatch | [`tools`] / [`router`] | `isError` result |
//!
//! # Architecture
//!
//! - **Storage**: SQLite with an FTS5 index over screen and audio captures
//! - **Validation**: heuristics first, then a local LLM (Ollama) against a free-text policy
//! - **Tenancy**: one gateway can front several instances, local or remote peers
//! - **Transport**: Streamable HTTP (`POST /mcp`) with a legacy SSE endpoint
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`db`]: SQLite initialization, schema, migrations, and health checks
//! - [`history`]: queries over the capture index
//! - [`protocol`]: JSON-RPC envelopes and MCP result shapes
//! - [`server`]: the axum application and the call pipeline

pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod history;
pub mod protocol;
pub mod rate_limit;
pub mod router;
pub mod server;
pub mod tools;
pub mod validator;
