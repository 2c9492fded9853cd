//! # plugkit-foundation
//!
//! Foundation layer for Plugkit:
//! - Error: 에러 분류 (매니페스트, 해석, 파일시스템, 활성화) 및 wire 변환
//! - Config: 런타임 설정 (RuntimeConfig)
//! - Storage: JsonStore (범용 JSON 파일 저장소)

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, ErrorKind, Result, WireError};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    RuntimeConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_HOOK_TIMEOUT_SECS, DEFAULT_REGISTRY_URL,
    ENV_PLUGINS_PATH, ENV_REGISTRY_URL, RUNTIME_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::JsonStore;
