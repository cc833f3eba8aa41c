//! Sandbox module containing all execution-related components.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod environment;
pub mod executor;
pub mod history;
pub mod io;
pub mod lexer;
pub mod limits;
pub mod policy;
pub mod wrapper;
