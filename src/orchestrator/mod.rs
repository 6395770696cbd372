//! Session orchestration modules.
//!
//! Covers the session store and dependency graph, the scheduler control
//! loop, terminal-state waiting, output collection, and the caller-facing
//! session manager.

pub mod dependency_graph;
pub mod output;
pub mod scheduler;
pub mod session_manager;
pub mod session_store;
pub mod waiter;
