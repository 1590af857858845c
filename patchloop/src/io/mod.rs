//! Side-effecting operations: filesystem, process execution, persistence.

pub mod backup_store;
pub mod collaborators;
pub mod config;
pub mod iteration_log;
pub mod layout;
pub mod patcher;
pub mod planner;
pub mod process;
pub mod state_store;
pub mod validator;
