//! Module Loader - `plugin://` locator를 실행 가능한 모듈로 해석
//!
//! 실행 컨텍스트는 파일시스템을 직접 보지 않고 bridge에서 받은 locator만 loader에
//! 넘깁니다. 로딩 방식은 호스트가 주입합니다.
//!
//! - `StaticModuleLoader`: 호스트 프로세스 안에 컴파일된 모듈
//! - `ProcessModuleLoader`: 엔트리를 실행 파일로 보고 activation point마다 실행

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use plugkit_foundation::{Error, Result, DEFAULT_HOOK_TIMEOUT_SECS};

use super::activation::{ActivationContext, ActivationHook};
use super::entity::PluginUrl;
use super::extension::Extension;

/// 프로세스 플러그인에 전달되는 환경 변수
pub const ENV_PLUGIN: &str = "PLUGKIT_PLUGIN";
pub const ENV_ACTIVATION_POINT: &str = "PLUGKIT_ACTIVATION_POINT";

// ============================================================================
// PluginModule / ModuleLoader
// ============================================================================

/// 로드된 플러그인 모듈 - activation point 이름으로 hook을 조회할 수 있는 값
#[async_trait]
pub trait PluginModule: Send + Sync {
    /// 해당 point의 hook 제공 여부 (없으면 no-op으로 취급)
    fn provides(&self, point: &str) -> bool;

    /// hook 실행
    async fn activate(&self, point: &str, ctx: &ActivationContext) -> Result<()>;
}

/// 모듈 loader
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// locator 해석 (모듈이 아무것도 내보내지 않으면 None)
    async fn load(&self, url: &PluginUrl) -> Result<Option<Arc<dyn PluginModule>>>;
}

// ============================================================================
// HookModule - point별 hook 묶음
// ============================================================================

/// point 이름 → hook 매핑 모듈
#[derive(Default, Clone)]
pub struct HookModule {
    hooks: HashMap<String, Arc<dyn ActivationHook>>,
}

impl HookModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, point: impl Into<String>, hook: impl ActivationHook + 'static) -> Self {
        self.hooks.insert(point.into(), Arc::new(hook));
        self
    }
}

#[async_trait]
impl PluginModule for HookModule {
    fn provides(&self, point: &str) -> bool {
        self.hooks.contains_key(point)
    }

    async fn activate(&self, point: &str, ctx: &ActivationContext) -> Result<()> {
        match self.hooks.get(point) {
            Some(hook) => hook.activate(ctx).await,
            None => Ok(()),
        }
    }
}

// ============================================================================
// StaticModuleLoader
// ============================================================================

type ModuleFactory = Arc<dyn Fn() -> Arc<dyn PluginModule> + Send + Sync>;

/// 플러그인 이름별 모듈 팩토리
///
/// 로드할 때마다 팩토리를 호출해 새 인스턴스를 만든다.
#[derive(Default, Clone)]
pub struct StaticModuleLoader {
    factories: HashMap<String, ModuleFactory>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module<F, M>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> M + Send + Sync + 'static,
        M: PluginModule + 'static,
    {
        self.factories
            .insert(name.into(), Arc::new(move || Arc::new(factory()) as Arc<dyn PluginModule>));
        self
    }
}

#[async_trait]
impl ModuleLoader for StaticModuleLoader {
    async fn load(&self, url: &PluginUrl) -> Result<Option<Arc<dyn PluginModule>>> {
        match self.factories.get(&url.name) {
            Some(factory) => Ok(Some(factory())),
            None => {
                debug!("No in-process module for {}", url);
                Ok(None)
            }
        }
    }
}

// ============================================================================
// ProcessModuleLoader
// ============================================================================

/// 엔트리를 실행 파일로 실행하는 loader
///
/// `<entry> <point>`를 플러그인 디렉토리에서 실행한다. 종료 코드가 0이 아니면
/// activation 실패로 보고, stdout의 `{"register": {...}}` 줄은 확장 등록으로 처리한다.
pub struct ProcessModuleLoader {
    plugins_path: PathBuf,
    timeout: Duration,
}

impl ProcessModuleLoader {
    pub fn new(plugins_path: impl Into<PathBuf>) -> Self {
        Self {
            plugins_path: plugins_path.into(),
            timeout: Duration::from_secs(DEFAULT_HOOK_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// locator를 플러그인 디렉토리 안의 경로로 변환 (밖으로 나가면 거부)
    pub fn entry_path(&self, url: &PluginUrl) -> Result<(PathBuf, PathBuf)> {
        let escape = || Error::InvalidInput(format!("{} points outside the plugins directory", url));

        let root = url
            .name
            .split('/')
            .fold(self.plugins_path.clone(), |path, segment| path.join(segment));
        let entry = root.join(&url.main);

        let plugins = self
            .plugins_path
            .canonicalize()
            .map_err(|e| Error::filesystem(&self.plugins_path, e))?;
        let root = root.canonicalize().map_err(|e| Error::filesystem(&root, e))?;
        let entry = entry.canonicalize().map_err(|e| Error::filesystem(&entry, e))?;

        if !root.starts_with(&plugins) || !entry.starts_with(&root) {
            return Err(escape());
        }
        Ok((root, entry))
    }
}

#[async_trait]
impl ModuleLoader for ProcessModuleLoader {
    async fn load(&self, url: &PluginUrl) -> Result<Option<Arc<dyn PluginModule>>> {
        let (root, entry) = self.entry_path(url)?;
        if !entry.is_file() {
            return Err(Error::NotFound(format!("Entry {} is not a file", entry.display())));
        }

        Ok(Some(Arc::new(ProcessModule {
            plugin: url.name.clone(),
            root,
            entry,
            timeout: self.timeout,
        })))
    }
}

/// 실행 파일 모듈
struct ProcessModule {
    plugin: String,
    root: PathBuf,
    entry: PathBuf,
    timeout: Duration,
}

/// stdout 등록 메시지
#[derive(Debug, Deserialize)]
struct RegisterLine {
    register: RegisterRequest,
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    point: String,
    name: String,
    #[serde(default)]
    response: Value,
    #[serde(default)]
    priority: i32,
}

impl ProcessModule {
    fn command(&self, point: &str) -> Command {
        let mut cmd = Command::new(&self.entry);
        cmd.arg(point)
            .current_dir(&self.root)
            .env(ENV_PLUGIN, &self.plugin)
            .env(ENV_ACTIVATION_POINT, point)
            .kill_on_drop(true);
        cmd
    }

    fn apply_output(&self, stdout: &str, ctx: &ActivationContext) {
        for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match serde_json::from_str::<RegisterLine>(line) {
                Ok(RegisterLine { register }) => {
                    ctx.register_extension(
                        &register.point,
                        Extension::new(register.name, register.response)
                            .with_priority(register.priority),
                    );
                }
                Err(_) => debug!("[{}] {}", self.plugin, line),
            }
        }
    }
}

#[async_trait]
impl PluginModule for ProcessModule {
    fn provides(&self, _point: &str) -> bool {
        // 실행 파일은 스스로 판단하므로 선언된 모든 point에 연결
        true
    }

    async fn activate(&self, point: &str, ctx: &ActivationContext) -> Result<()> {
        info!("Running {} for {}", self.entry.display(), point);

        let output = tokio::time::timeout(self.timeout, self.command(point).output())
            .await
            .map_err(|_| {
                Error::activation(
                    &self.plugin,
                    point,
                    format!("timed out after {}s", self.timeout.as_secs()),
                )
            })?
            .map_err(|e| Error::activation(&self.plugin, point, format!("failed to start: {}", e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            warn!("[{}] {}", self.plugin, stderr.trim());
        }

        if !output.status.success() {
            return Err(Error::activation(
                &self.plugin,
                point,
                format!("exited with {}", output.status),
            ));
        }

        self.apply_output(&String::from_utf8_lossy(&output.stdout), ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::activation::FnHook;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_static_loader() {
        let loader = StaticModuleLoader::new().with_module("demo", || {
            HookModule::new().on("init", FnHook::new(|_: &ActivationContext| Ok(())))
        });

        let module = loader
            .load(&PluginUrl::new("demo", "index.js"))
            .await
            .unwrap()
            .unwrap();
        assert!(module.provides("init"));
        assert!(!module.provides("ui"));

        assert!(loader
            .load(&PluginUrl::new("other", "index.js"))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_entry_path_rejects_escape() {
        let temp = TempDir::new().unwrap();
        let plugins = temp.path().join("plugins");
        std::fs::create_dir_all(plugins.join("demo")).unwrap();
        std::fs::write(plugins.join("demo").join("run.sh"), "").unwrap();
        std::fs::write(temp.path().join("outside.sh"), "").unwrap();

        let loader = ProcessModuleLoader::new(&plugins);
        assert!(loader.entry_path(&PluginUrl::new("demo", "run.sh")).is_ok());

        let err = loader
            .entry_path(&PluginUrl::new("demo", "../../outside.sh"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_register_line() {
        let line: RegisterLine = serde_json::from_str(
            r#"{"register": {"point": "menu", "name": "item", "response": {"label": "Hi"}}}"#,
        )
        .unwrap();
        assert_eq!(line.register.point, "menu");
        assert_eq!(line.register.priority, 0);
    }
}
