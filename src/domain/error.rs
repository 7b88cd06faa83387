// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Typed failures that the orchestrator distinguishes.
// Everything else travels as a plain anyhow::Error with context.
//
//   Configuration  → bad flag values or unsupported combinations,
//                    raised before any fold starts
//   DataIntegrity  → label tables and image lists that disagree
//   ResumeMismatch → a completed fold whose log cannot be read back
//   Resource       → the compute device gave up mid-epoch
//
// All variants are wrapped into anyhow::Error by `?`, so callers
// recover them with `err.downcast_ref::<TrainError>()`.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TrainError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("cannot resume fold {fold}: {detail}")]
    ResumeMismatch { fold: usize, detail: String },

    #[error("device resource error: {0}")]
    Resource(String),
}

impl TrainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    pub fn resume(fold: usize, detail: impl Into<String>) -> Self {
        Self::ResumeMismatch { fold, detail: detail.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_survives_anyhow_round_trip() {
        let err: anyhow::Error = TrainError::resume(3, "missing column 'val_loss'").into();
        let typed = err.downcast_ref::<TrainError>().cloned();
        assert_eq!(
            typed,
            Some(TrainError::ResumeMismatch { fold: 3, detail: "missing column 'val_loss'".into() })
        );
        assert!(err.to_string().contains("fold 3"));
    }
}
