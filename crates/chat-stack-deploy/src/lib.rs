//! chat-stack-deploy - deployment planner for the WebSocket chat system
//!
//! This crate declares the chat system's cloud resources as a flat graph of
//! nodes and precedence edges, computes creation and teardown orders for an
//! external apply/destroy executor, and provides the one-shot SQS cleanup
//! step that runs during teardown.

pub mod aws;
pub mod config;
pub mod graph;
pub mod plan;
pub mod stack;
