use std::error::Error as StdError;

use thiserror::Error;

use crate::application::filter::FilterError;
use crate::application::hooks::HookError;
use crate::application::repos::RepoError;
use crate::application::workflows::WorkflowError;
use crate::cache::CacheError;
use crate::{domain::error::DomainError, infra::error::InfraError};

/// Flattened error chain for reporting at the process edge.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Short name of the layer the error came from.
    pub fn origin(&self) -> &'static str {
        match self {
            AppError::Domain(_) => "domain",
            AppError::Infra(_) => "infra",
            AppError::Repo(_) => "repository",
            AppError::Cache(_) => "cache",
            AppError::Filter(_) => "filter",
            AppError::Hook(_) => "hooks",
            AppError::Workflow(_) => "workflow",
            AppError::NotFound | AppError::Validation(_) | AppError::Unexpected(_) => "application",
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error(self.origin(), self)
    }
}
