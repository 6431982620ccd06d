//! Application services: unit of work, cache-aside repository, hooks and
//! the workflows built on them.

pub mod counters;
pub mod entity_manager;
pub mod error;
pub mod filter;
pub mod hooks;
pub mod repos;
pub mod repository;
pub mod scope;
pub mod workflows;
