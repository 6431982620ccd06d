//! Persistence, cache-aside and extension-hook core of the docvault
//! document collection service.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod extensions;
pub mod infra;
