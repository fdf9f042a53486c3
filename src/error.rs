use thiserror::Error;

/// Stage-level failures. Anything recoverable per entity is resolved with a
/// default before it gets here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("raw record store unavailable while reading {collection}: {source:#}")]
    RawStoreUnavailable {
        collection: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("feature store unavailable during {operation}: {source:#}")]
    FeatureStoreUnavailable {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("feature schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("training failed: {0:#}")]
    Training(#[source] anyhow::Error),
}

impl PipelineError {
    pub fn raw(collection: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| PipelineError::RawStoreUnavailable { collection, source }
    }

    pub fn store(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| PipelineError::FeatureStoreUnavailable { operation, source }
    }
}
