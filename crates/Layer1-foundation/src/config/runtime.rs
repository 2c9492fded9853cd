//! Runtime Config - 플러그인 런타임 설정
//!
//! 글로벌 설정과 프로젝트 설정을 병합하고 환경 변수로 덮어쓴다.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// 설정 파일명
pub const RUNTIME_CONFIG_FILE: &str = "config.json";

/// 기본 패키지 레지스트리
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// activation point 프로세스 기본 타임아웃 (초)
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 30;

/// 호스트 시그널 브로드캐스트 채널 기본 용량
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// 플러그인 경로 환경 변수
pub const ENV_PLUGINS_PATH: &str = "PLUGKIT_PLUGINS_PATH";

/// 레지스트리 URL 환경 변수
pub const ENV_REGISTRY_URL: &str = "PLUGKIT_REGISTRY_URL";

// ============================================================================
// RuntimeConfig
// ============================================================================

/// 플러그인 런타임 설정
///
/// 파일에는 지정된 값만 저장되고, 나머지는 접근자에서 기본값으로 채운다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// 플러그인 설치 디렉토리
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_path: Option<PathBuf>,

    /// npm 호환 레지스트리 URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,

    /// activation point 실행 타임아웃 (초)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_timeout_secs: Option<u64>,

    /// 설치 전 확인 여부
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_install: Option<bool>,

    /// 시그널 채널 용량
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_capacity: Option<usize>,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 + 환경 변수 병합 로드
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)? {
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(project_config) =
                project.load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)?
            {
                config.merge(project_config);
            }
        }

        // 3. 환경 변수
        config.apply_env(|key| std::env::var(key).ok());

        debug!("Runtime config loaded: {:?}", config);
        Ok(config)
    }

    /// 지정한 저장소에서만 로드
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        Ok(store
            .load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)?
            .unwrap_or_default())
    }

    /// 글로벌 설정 저장
    pub fn save_global(&self) -> Result<()> {
        let store = JsonStore::global()?;
        store.save(RUNTIME_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: RuntimeConfig) {
        if other.plugins_path.is_some() {
            self.plugins_path = other.plugins_path;
        }
        if other.registry_url.is_some() {
            self.registry_url = other.registry_url;
        }
        if other.hook_timeout_secs.is_some() {
            self.hook_timeout_secs = other.hook_timeout_secs;
        }
        if other.confirm_install.is_some() {
            self.confirm_install = other.confirm_install;
        }
        if other.channel_capacity.is_some() {
            self.channel_capacity = other.channel_capacity;
        }
    }

    /// 환경 변수 적용
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_PLUGINS_PATH).filter(|v| !v.is_empty()) {
            self.plugins_path = Some(PathBuf::from(path));
        }
        if let Some(url) = lookup(ENV_REGISTRY_URL).filter(|v| !v.is_empty()) {
            self.registry_url = Some(url);
        }
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    /// 플러그인 디렉토리 (<data_dir>/plugkit/plugins)
    pub fn plugins_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.plugins_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("plugkit").join("plugins"))
            .ok_or_else(|| Error::Config("Cannot find data directory".to_string()))
    }

    pub fn registry_url(&self) -> &str {
        self.registry_url.as_deref().unwrap_or(DEFAULT_REGISTRY_URL)
    }

    pub fn hook_timeout_secs(&self) -> u64 {
        self.hook_timeout_secs.unwrap_or(DEFAULT_HOOK_TIMEOUT_SECS)
    }

    pub fn confirm_install(&self) -> bool {
        self.confirm_install.unwrap_or(true)
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_plugins_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.plugins_path = Some(path.into());
        self
    }

    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = Some(url.into());
        self
    }

    pub fn with_hook_timeout_secs(mut self, secs: u64) -> Self {
        self.hook_timeout_secs = Some(secs);
        self
    }
}
