//! # gate-mcp
//!
//! MCP tool surface for the governance gateway: the nine `gate_`-prefixed
//! tools, the session/audit-backed dispatcher state behind them, and the
//! HMAC-SHA256 bootstrap proof that authorizes a workspace's first plan.
//!
//! Every other crate in this workspace ([`gate_session`], [`gate_audit`],
//! [`gate_policy`]) is a library with no transport opinion; this crate is
//! where they're wired together and exposed over the Model Context
//! Protocol via [`rmcp`].

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod server;

pub use config::GatewayConfig;
pub use error::{BootstrapError, GatewayError};
pub use server::{AtlasGateServer, GatewayState};
