//! Config - 통합 설정 관리
//!
//! - `runtime.rs` - RuntimeConfig (플러그인 경로, 레지스트리, 타임아웃)

mod runtime;

pub use runtime::{
    RuntimeConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_HOOK_TIMEOUT_SECS, DEFAULT_REGISTRY_URL,
    ENV_PLUGINS_PATH, ENV_REGISTRY_URL, RUNTIME_CONFIG_FILE,
};
