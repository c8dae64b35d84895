//! MCP front end for Salesforce implementation tracking.
//!
//! - [`gateway::Gateway`]: the five guarded operations.
//! - [`server::ImpltrackMcpServer`]: exposes them as MCP tools.
//! - [`bootstrap`]: startup wiring from config to a ready gateway.

pub mod bootstrap;
pub mod format;
pub mod gateway;
pub mod server;

pub use bootstrap::{Application, BootstrapError};
pub use gateway::{CreateImplementation, Gateway, LogHours};
pub use server::ImpltrackMcpServer;
