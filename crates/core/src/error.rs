//! Configuration-time errors of the annotation engine
//!
//! Runtime problems (unparsable imports, clipping failures, missing presets)
//! are recovered from and reported through logs or warning events instead.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no 'polygon' object factory is registered; the engine cannot operate without it")]
    MissingPolygonFactory,

    #[error("object factory '{0}' is already registered")]
    DuplicateFactory(String),

    #[error("object factory '{id}' is invalid: {reason}")]
    InvalidFactory { id: String, reason: String },

    #[error("annotation mode '{0}' is already registered")]
    DuplicateMode(String),

    #[error("unknown annotation mode '{0}'")]
    UnknownMode(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type EngineResult<T> = Result<T, EngineError>;
