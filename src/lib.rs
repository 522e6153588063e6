//! MCP server for QuickBuild.
//!
//! Exposes build configurations, latest build status, build triggering,
//! grid agents and per-build SCM changes as MCP tools and resources over
//! JSON-RPC 2.0 stdio, translating each call into QuickBuild REST requests.

pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod protocol;
pub mod server;

pub mod schema;
