use crate::store::StoreError;

/// Core error type for the feed service.
///
/// Adapter crates map their transport-specific failures into this type (or
/// wrap it in `anyhow`) so replies and HTTP statuses are derived consistently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CHANNEL;

    #[test]
    fn not_found_is_detected_through_store_variant() {
        let err: Error = StoreError::not_found(CHANNEL, "-1001").into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "channel not found: -1001");
        assert!(!Error::External("chat not found".to_string()).is_not_found());
    }
}
