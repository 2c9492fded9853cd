//! Error types for Plugkit
//!
//! 모든 에러를 중앙에서 관리

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Plugkit 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 매니페스트 관련
    // ========================================================================
    #[error("{0} does not contain a valid manifest")]
    ManifestInvalid(String),

    #[error("plugin {0} has no activation points")]
    NoActivationPoints(String),

    // ========================================================================
    // 설치 관련
    // ========================================================================
    #[error("Failed to resolve {specifier}: {message}")]
    ResolutionFailed { specifier: String, message: String },

    #[error("Filesystem error at {path}: {message}")]
    Filesystem { path: String, message: String },

    // ========================================================================
    // 활성화 관련
    // ========================================================================
    #[error("Activation point {point} of plugin {plugin} failed: {message}")]
    ActivationCallback {
        plugin: String,
        point: String,
        message: String,
    },

    // ========================================================================
    // Bridge 관련
    // ========================================================================
    #[error("Bridge error: {0}")]
    Bridge(String),

    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Cancelled")]
    Cancelled,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 프로세스 경계를 넘길 때 사용하는 에러 분류 코드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ManifestInvalid,
    NoActivationPoints,
    ResolutionFailed,
    Filesystem,
    ActivationCallback,
    Bridge,
    Config,
    Cancelled,
    NotFound,
    InvalidInput,
    Io,
    Json,
    Http,
    Internal,
}

/// 직렬화된 에러 (bridge wire format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
    /// 에러 대상 (specifier, plugin 이름, 경로 등)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl Error {
    /// 에러 분류 코드
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ManifestInvalid(_) => ErrorKind::ManifestInvalid,
            Error::NoActivationPoints(_) => ErrorKind::NoActivationPoints,
            Error::ResolutionFailed { .. } => ErrorKind::ResolutionFailed,
            Error::Filesystem { .. } => ErrorKind::Filesystem,
            Error::ActivationCallback { .. } => ErrorKind::ActivationCallback,
            Error::Bridge(_) => ErrorKind::Bridge,
            Error::Config(_) => ErrorKind::Config,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
            Error::Http(_) => ErrorKind::Http,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::ManifestInvalid(_)
                | Error::NoActivationPoints(_)
                | Error::ResolutionFailed { .. }
                | Error::NotFound(_)
                | Error::InvalidInput(_)
                | Error::Cancelled
        )
    }

    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ResolutionFailed { .. } | Error::Http(_))
    }

    /// 패키지 해석 실패 생성 헬퍼
    pub fn resolution(specifier: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ResolutionFailed {
            specifier: specifier.into(),
            message: message.into(),
        }
    }

    /// 파일시스템 에러 생성 헬퍼
    pub fn filesystem(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        Error::Filesystem {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// 활성화 콜백 에러 생성 헬퍼
    pub fn activation(
        plugin: impl Into<String>,
        point: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::ActivationCallback {
            plugin: plugin.into(),
            point: point.into(),
            message: message.into(),
        }
    }

    /// wire format으로 변환
    pub fn to_wire(&self) -> WireError {
        let (message, subject) = match self {
            Error::ManifestInvalid(s) | Error::NoActivationPoints(s) => {
                (s.clone(), Some(s.clone()))
            }
            Error::ResolutionFailed { specifier, message } => {
                (message.clone(), Some(specifier.clone()))
            }
            Error::Filesystem { path, message } => (message.clone(), Some(path.clone())),
            Error::ActivationCallback {
                plugin,
                point,
                message,
            } => (message.clone(), Some(format!("{}#{}", plugin, point))),
            Error::Bridge(m)
            | Error::Config(m)
            | Error::NotFound(m)
            | Error::InvalidInput(m)
            | Error::Http(m)
            | Error::Internal(m) => (m.clone(), None),
            Error::Cancelled => (String::new(), None),
            Error::Io(e) => (e.to_string(), None),
            Error::Json(e) => (e.to_string(), None),
        };

        WireError {
            kind: self.kind(),
            message,
            subject,
        }
    }

    /// wire format에서 복원
    ///
    /// `Io`/`Json`은 원본 타입을 복원할 수 없으므로 `Internal`로 접힌다.
    pub fn from_wire(wire: WireError) -> Self {
        let subject = wire.subject.unwrap_or_default();
        match wire.kind {
            ErrorKind::ManifestInvalid => Error::ManifestInvalid(subject),
            ErrorKind::NoActivationPoints => Error::NoActivationPoints(subject),
            ErrorKind::ResolutionFailed => Error::ResolutionFailed {
                specifier: subject,
                message: wire.message,
            },
            ErrorKind::Filesystem => Error::Filesystem {
                path: subject,
                message: wire.message,
            },
            ErrorKind::ActivationCallback => {
                let (plugin, point) = match subject.split_once('#') {
                    Some((plugin, point)) => (plugin.to_string(), point.to_string()),
                    None => (subject, String::new()),
                };
                Error::ActivationCallback {
                    plugin,
                    point,
                    message: wire.message,
                }
            }
            ErrorKind::Bridge => Error::Bridge(wire.message),
            ErrorKind::Config => Error::Config(wire.message),
            ErrorKind::Cancelled => Error::Cancelled,
            ErrorKind::NotFound => Error::NotFound(wire.message),
            ErrorKind::InvalidInput => Error::InvalidInput(wire.message),
            ErrorKind::Http => Error::Http(wire.message),
            ErrorKind::Io | ErrorKind::Json | ErrorKind::Internal => Error::Internal(wire.message),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
