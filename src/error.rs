use thiserror::Error;

/// Result alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by model validation, preprocessing and cut-set generation.
///
/// Input problems ([`InvalidModel`](Error::InvalidModel),
/// [`InvalidSettings`](Error::InvalidSettings)) are raised at the boundary,
/// before any graph mutation. [`UnsupportedFeature`](Error::UnsupportedFeature)
/// marks inputs this engine refuses by design rather than by mistake.
/// [`Internal`](Error::Internal) is an invariant violation and always a bug.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),
}
