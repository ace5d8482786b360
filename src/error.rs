use thiserror::Error;

/// Failures surfaced by the aggregation engine, click resolution and the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtlasError {
    /// Unknown dataset or boundary identifier, rejected before any query runs.
    #[error("unknown dataset or boundary layer {0:?}")]
    InvalidDataset(String),
    /// Backing store missing a layer or failing to answer.
    #[error("data source error: {0}")]
    DataSource(String),
    /// Click resolution failed for a reason other than "nothing matched".
    #[error("geometry query failed: {0}")]
    GeometryQuery(String),
    /// A dataset load is in flight; the session accepts no other mutation until it settles.
    #[error("a layer is still loading")]
    Busy,
}

pub type AtlasResult<T> = Result<T, AtlasError>;
