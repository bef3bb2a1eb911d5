//! Structured error types for the engine.
//!
//! Parser and query failures surface to the caller; filesystem and analyzer
//! failures are recovered locally and reported on the indexer update stream
//! so the live index stays available.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for opening and mutating workspaces.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no pubspec.yaml found under '{0}'")]
    MissingPackageManifest(PathBuf),

    #[error(
        "missing resolved package config at '{0}'. Run `dart pub get` to generate .dart_tool/package_config.json"
    )]
    MissingResolvedConfig(PathBuf),

    #[error("analyzer failed to resolve '{path}': {message}")]
    AnalyzerResolution { path: String, message: String },

    #[error("adapter error for '{path}': {message}")]
    Adapter { path: String, message: String },

    #[error("failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("workspace root '{0}' does not exist")]
    RootNotFound(PathBuf),

    #[error("failed to persist index to '{path}': {message}")]
    Persistence { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Query DSL failure, carrying the offending token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("action '{0}' requires a target")]
    MissingTarget(String),

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),

    #[error("invalid flag '{0}'")]
    InvalidFlag(String),

    #[error("empty query")]
    Empty,
}

impl QueryError {
    /// The token that made the parse fail, for the structured error result.
    pub fn offending_token(&self) -> &str {
        match self {
            Self::UnknownAction(t)
            | Self::MissingTarget(t)
            | Self::UnknownFilter(t)
            | Self::InvalidFlag(t) => t,
            Self::Empty => "",
        }
    }
}
