use crate::export::ExportFormat;

pub type FxResult<T> = Result<T, FxError>;

#[derive(thiserror::Error, Debug)]
pub enum FxError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Frame not ready yet; retried by the scheduler and never surfaced to the user.
    #[error("source error: {0}")]
    Source(String),

    /// Fault inside a single effect pass (size mismatch, non-finite math).
    #[error("effect error: {0}")]
    Effect(String),

    #[error("export to {format} failed: {reason}{}", fallback_hint(.fallback))]
    Export {
        format: ExportFormat,
        reason: String,
        fallback: Option<ExportFormat>,
    },

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn fallback_hint(fallback: &Option<ExportFormat>) -> String {
    match fallback {
        Some(f) => format!(" (try {f} instead)"),
        None => String::new(),
    }
}

impl FxError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn source_not_ready(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn effect(msg: impl Into<String>) -> Self {
        Self::Effect(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    pub fn export(
        format: ExportFormat,
        reason: impl Into<String>,
        fallback: Option<ExportFormat>,
    ) -> Self {
        Self::Export {
            format,
            reason: reason.into(),
            fallback,
        }
    }

    /// Suggested format to retry with, for export failures.
    pub fn fallback_format(&self) -> Option<ExportFormat> {
        match self {
            Self::Export { fallback, .. } => *fallback,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            FxError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(FxError::source_not_ready("x").to_string().contains("source error:"));
        assert!(FxError::effect("x").to_string().contains("effect error:"));
        assert!(
            FxError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn export_error_names_fallback() {
        let err = FxError::export(
            ExportFormat::WebM,
            "ffmpeg not found",
            Some(ExportFormat::PngSequence),
        );
        let msg = err.to_string();
        assert!(msg.contains("webm"));
        assert!(msg.contains("png-sequence"));
        assert_eq!(err.fallback_format(), Some(ExportFormat::PngSequence));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = FxError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
