//! djinn - pluggable on-chain agent framework
//!
//! This library wires language-model-driven agents to blockchain networks
//! through composable plugins, tools, and multi-provider handlers, with a
//! human-in-the-loop review step in front of irreversible actions.

pub mod agent;
pub mod config;
pub mod error;
pub mod handler;
pub mod network;
pub mod plugin;
pub mod plugins;
pub mod service;
pub mod services;
pub mod tool;
pub mod wallet;

pub use error::{Error, Result};
