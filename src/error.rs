//! Central error types for Visor.

use thiserror::Error;
use visor_capture::CaptureError;
use visor_targets::CatalogError;

/// Main error type for Visor operations.
#[derive(Error, Debug)]
pub enum VisorError {
    /// Screen recording permission is missing
    #[error("Screen capture permission denied")]
    Permission,

    /// Capture configuration cannot drive a stream
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Capture stream failed mid-session
    #[error("Capture stream failed: {0}")]
    CaptureStream(String),

    /// Frame could not be bound to a texture
    #[error("Frame bridge error: {0}")]
    Bridge(String),

    /// Shader source failed to compile or validate
    #[error("Shader '{label}' failed to compile: {message}")]
    Compile { label: String, message: String },

    /// Shareable content enumeration failed
    #[error("Catalog enumeration failed: {0}")]
    CatalogEnumeration(String),

    /// GPU adapter, device or surface error (wgpu)
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Overlay window management error
    #[error("Window error: {0}")]
    Window(String),

    /// Config file could not be read
    #[error("Config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Config file is not valid JSON for the expected shape
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl From<CaptureError> for VisorError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Configuration(msg) => VisorError::Configuration(msg),
            CaptureError::PermissionDenied => VisorError::Permission,
            CaptureError::Stream(msg) | CaptureError::Spawn(msg) => VisorError::CaptureStream(msg),
        }
    }
}

impl From<CatalogError> for VisorError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::PermissionDenied => VisorError::Permission,
            CatalogError::Enumeration(msg) => VisorError::CatalogEnumeration(msg),
        }
    }
}

/// Type alias for Results using VisorError.
pub type VisorResult<T> = Result<T, VisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VisorError::Compile {
            label: "invert.wgsl".to_string(),
            message: "unknown identifier `colr`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Shader 'invert.wgsl' failed to compile: unknown identifier `colr`"
        );
    }

    #[test]
    fn test_unreadable_config_is_io_error() {
        let err: VisorError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "visor.json").into();
        assert!(matches!(err, VisorError::ConfigIo(_)));
        assert!(err.to_string().starts_with("Config I/O error"));
    }

    #[test]
    fn test_malformed_config_is_parse_error() {
        let err: VisorError = serde_json::from_str::<serde_json::Value>(r#"{"cropOffset": }"#)
            .unwrap_err()
            .into();
        assert!(matches!(err, VisorError::ConfigParse(_)));
    }

    #[test]
    fn test_from_capture_error() {
        let err: VisorError = CaptureError::Configuration("no target".to_string()).into();
        assert!(matches!(err, VisorError::Configuration(_)));

        let err: VisorError = CaptureError::PermissionDenied.into();
        assert!(matches!(err, VisorError::Permission));

        let err: VisorError = CaptureError::Stream("display gone".to_string()).into();
        assert!(err.to_string().contains("display gone"));
    }

    #[test]
    fn test_from_catalog_error() {
        let err: VisorError = CatalogError::PermissionDenied.into();
        assert!(matches!(err, VisorError::Permission));

        let err: VisorError = CatalogError::Enumeration("timeout".to_string()).into();
        assert!(matches!(err, VisorError::CatalogEnumeration(_)));
    }

    #[test]
    fn test_stream_and_spawn_failures_share_a_variant() {
        let err: VisorError = CaptureError::Spawn("thread limit".to_string()).into();
        assert!(matches!(err, VisorError::CaptureStream(ref msg) if msg == "thread limit"));
    }

    #[test]
    fn test_enumeration_failure_keeps_reason() {
        let err: VisorError = CatalogError::Enumeration("window server busy".to_string()).into();
        assert_eq!(err.to_string(), "Catalog enumeration failed: window server busy");
    }
}
