//! Test environment resolver for an OpenShift-hosted registry platform
//!
//! Turns a declarative description of platform services into reachable
//! endpoints, credentials and authenticated test identities. Endpoints are
//! public routes where the cluster exposes them and local port-forward
//! tunnels otherwise; credentials come from cluster secrets; identities are
//! provisioned in Keycloak on first use.
//!
//! The entry point is [`environment::Environment`].

pub mod auth;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod endpoint;
pub mod environment;
pub mod facade;
pub mod materialize;
pub mod memo;
pub mod model;
pub mod readiness;
pub mod secrets;
pub mod shaping;
pub mod tunnel;
pub mod users;

pub use cli::Cli;
pub use environment::{Environment, EnvironmentParts};
pub use platform_qa_common::{Error, Result};
