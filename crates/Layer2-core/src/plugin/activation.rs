//! Activation Manager - 실행 컨텍스트의 activation point 레지스트리
//!
//! 실행 컨텍스트마다 하나씩 두고, 컨텍스트가 시작될 때 `register_active`로 다시
//! 구성합니다. 플러그인 상태 전이:
//!
//! ```text
//! (없음) ──register──▶ Registered ──trigger──▶ Activated
//!                          ▲                      │
//!                          └──register── Deactivated ◀──deactivate──┘
//! ```
//!
//! 제거(uninstall)는 상태를 완전히 지웁니다.

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use plugkit_foundation::{Error, Result};

use super::bridge::PluginBridge;
use super::entity::Plugin;
use super::events::{HostSignal, LifecycleEvent};
use super::extension::{Extension, ExtensionRegistry, ExtensionResponse};
use super::loader::{ModuleLoader, PluginModule};

// ============================================================================
// ActivationContext / ActivationHook
// ============================================================================

/// hook에 전달되는 컨텍스트
pub struct ActivationContext {
    plugin: Plugin,
    point: String,
    extensions: Arc<ExtensionRegistry>,
}

impl ActivationContext {
    pub fn new(plugin: Plugin, point: impl Into<String>, extensions: Arc<ExtensionRegistry>) -> Self {
        Self {
            plugin,
            point: point.into(),
            extensions,
        }
    }

    pub fn plugin(&self) -> &Plugin {
        &self.plugin
    }

    pub fn point(&self) -> &str {
        &self.point
    }

    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    /// 플러그인 소유로 확장 등록 (비활성화 시 함께 제거됨)
    pub fn register_extension(&self, point: &str, extension: Extension) {
        self.extensions
            .register_extension(point, extension.with_owner(&self.plugin.name));
    }

    /// 이름/응답/priority로 확장 등록
    pub fn register(
        &self,
        point: &str,
        name: impl Into<String>,
        response: impl Into<ExtensionResponse>,
        priority: i32,
    ) {
        self.register_extension(point, Extension::new(name, response).with_priority(priority));
    }
}

/// activation hook
#[async_trait]
pub trait ActivationHook: Send + Sync {
    async fn activate(&self, ctx: &ActivationContext) -> Result<()>;
}

/// 동기 클로저 hook
pub struct FnHook<F>(pub F);

impl<F> FnHook<F>
where
    F: Fn(&ActivationContext) -> Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> ActivationHook for FnHook<F>
where
    F: Fn(&ActivationContext) -> Result<()> + Send + Sync,
{
    async fn activate(&self, ctx: &ActivationContext) -> Result<()> {
        (self.0)(ctx)
    }
}

/// 모듈의 point 하나를 hook으로 연결
struct ModuleHook {
    module: Arc<dyn PluginModule>,
    point: String,
}

#[async_trait]
impl ActivationHook for ModuleHook {
    async fn activate(&self, ctx: &ActivationContext) -> Result<()> {
        self.module.activate(&self.point, ctx).await
    }
}

// ============================================================================
// 상태 / 결과
// ============================================================================

/// 플러그인별 activation 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    /// hook이 연결되었지만 아직 실행되지 않음
    Registered,
    /// hook이 한 번 이상 실행됨
    Activated,
    /// 비활성화되어 hook이 제거됨
    Deactivated,
}

/// trigger 결과
#[derive(Debug, Default)]
pub struct TriggerReport {
    pub point: String,
    /// 실행된 hook 수
    pub invoked: usize,
    /// hook별 실패 (`ActivationCallback`)
    pub errors: Vec<Error>,
}

impl TriggerReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Clone)]
struct Activation {
    plugin: Plugin,
    hook: Arc<dyn ActivationHook>,
    live: Arc<AtomicBool>,
}

// ============================================================================
// ActivationManager
// ============================================================================

/// activation 관리자
pub struct ActivationManager {
    bridge: PluginBridge,
    loader: Arc<dyn ModuleLoader>,
    extensions: Arc<ExtensionRegistry>,
    registry: RwLock<HashMap<String, Vec<Activation>>>,
    states: RwLock<HashMap<String, ActivationState>>,
    hook_timeout: Option<Duration>,
}

impl ActivationManager {
    pub fn new(bridge: PluginBridge, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            bridge,
            loader,
            extensions: Arc::new(ExtensionRegistry::new()),
            registry: RwLock::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
            hook_timeout: None,
        }
    }

    /// 기존 확장 레지스트리 공유
    pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = extensions;
        self
    }

    /// hook 하나의 실행 시간 제한
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = Some(timeout);
        self
    }

    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    pub fn bridge(&self) -> &PluginBridge {
        &self.bridge
    }

    // ========================================================================
    // 등록
    // ========================================================================

    /// point에 hook 직접 연결
    pub fn register(&self, plugin: &Plugin, point: &str, hook: Arc<dyn ActivationHook>) {
        debug!("Registering {} on {}", plugin.name, point);
        self.registry
            .write()
            .entry(point.to_string())
            .or_default()
            .push(Activation {
                plugin: plugin.clone(),
                hook,
                live: Arc::new(AtomicBool::new(true)),
            });

        let mut states = self.states.write();
        let state = states
            .entry(plugin.name.clone())
            .or_insert(ActivationState::Registered);
        if *state == ActivationState::Deactivated {
            *state = ActivationState::Registered;
        }
    }

    /// 플러그인 모듈을 로드해 선언된 point에 연결
    ///
    /// 모듈에 없는 point는 no-op으로 넘어간다. 연결된 hook 수를 반환.
    pub async fn register_plugin(&self, plugin: &Plugin) -> Result<usize> {
        if !plugin.active {
            debug!("Skipping inactive plugin {}", plugin.name);
            return Ok(0);
        }

        // 다시 등록하면 이전 hook을 먼저 정리
        if self.is_registered(&plugin.name) {
            self.detach(&plugin.name);
        }

        let url = plugin.locator()?;
        let Some(module) = self.loader.load(&url).await? else {
            warn!("{} exports nothing to activate", url);
            self.states
                .write()
                .insert(plugin.name.clone(), ActivationState::Registered);
            return Ok(0);
        };

        let mut wired = 0;
        for point in &plugin.activation_points {
            if module.provides(point) {
                let hook = Arc::new(ModuleHook {
                    module: module.clone(),
                    point: point.clone(),
                });
                self.register(plugin, point, hook);
                wired += 1;
            } else {
                debug!("{} declares {} but does not implement it", plugin.name, point);
            }
        }

        self.states
            .write()
            .insert(plugin.name.clone(), ActivationState::Registered);

        info!("Registered plugin {} ({} hooks)", plugin.name, wired);
        Ok(wired)
    }

    /// 활성화된 플러그인 전체 등록
    ///
    /// 플러그인 하나의 로드 실패는 기록만 하고 나머지를 계속한다.
    pub async fn register_active(&self) -> Result<Vec<Plugin>> {
        let active = self.bridge.get_active().await?;
        let mut registered = Vec::with_capacity(active.len());

        for plugin in active {
            match self.register_plugin(&plugin).await {
                Ok(_) => registered.push(plugin),
                Err(e) => warn!("Failed to register {}: {}", plugin.name, e),
            }
        }

        info!("Registered {} active plugins", registered.len());
        Ok(registered)
    }

    // ========================================================================
    // trigger
    // ========================================================================

    /// activation point 실행
    ///
    /// 모든 hook을 실행하고 실패는 hook별로 모은다. 이 함수는 실패하지 않는다.
    pub async fn trigger(&self, point: &str) -> TriggerReport {
        let activations: Vec<Activation> = self
            .registry
            .read()
            .get(point)
            .cloned()
            .unwrap_or_default();

        debug!("Triggering {} ({} hooks)", point, activations.len());

        let outcomes = join_all(
            activations
                .into_iter()
                .map(|activation| self.invoke(point, activation)),
        )
        .await;

        let mut report = TriggerReport {
            point: point.to_string(),
            ..Default::default()
        };
        for outcome in outcomes.into_iter().flatten() {
            report.invoked += 1;
            if let Err(e) = outcome {
                report.errors.push(e);
            }
        }

        if !report.is_ok() {
            error!("{} of {} hooks failed on {}", report.errors.len(), report.invoked, point);
        }
        report
    }

    /// hook 하나 실행 (비활성화된 hook은 None)
    async fn invoke(&self, point: &str, activation: Activation) -> Option<Result<()>> {
        if !activation.live.load(Ordering::SeqCst) {
            return None;
        }

        let live = activation.live.clone();
        let name = activation.plugin.name.clone();
        let ctx = ActivationContext::new(activation.plugin, point, self.extensions.clone());
        let call = AssertUnwindSafe(activation.hook.activate(&ctx)).catch_unwind();

        let outcome = match self.hook_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Some(Err(Error::activation(
                        &name,
                        point,
                        format!("timed out after {}s", limit.as_secs()),
                    )))
                }
            },
            None => call.await,
        };

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ Error::ActivationCallback { .. })) => Err(e),
            Ok(Err(e)) => Err(Error::activation(&name, point, e.to_string())),
            Err(_) => Err(Error::activation(&name, point, "hook panicked")),
        };

        match &result {
            // 실행 중에 비활성화되었으면 상태를 되살리지 않음
            Ok(()) if live.load(Ordering::SeqCst) => {
                self.states.write().insert(name, ActivationState::Activated);
            }
            Ok(()) => {}
            Err(e) => warn!("{}", e),
        }
        Some(result)
    }

    // ========================================================================
    // 비활성화 / 재구성
    // ========================================================================

    /// hook과 확장을 모두 떼어냄 (반환 후에는 어떤 hook도 실행되지 않음)
    fn detach(&self, name: &str) -> usize {
        let mut removed = 0;
        {
            let mut registry = self.registry.write();
            for activations in registry.values_mut() {
                activations.retain(|a| {
                    if a.plugin.name == name {
                        a.live.store(false, Ordering::SeqCst);
                        removed += 1;
                        false
                    } else {
                        true
                    }
                });
            }
            registry.retain(|_, list| !list.is_empty());
        }

        self.extensions.unregister_owner(name);
        removed
    }

    /// 플러그인 비활성화
    pub fn deactivate(&self, name: &str) {
        let removed = self.detach(name);
        if let Some(state) = self.states.write().get_mut(name) {
            *state = ActivationState::Deactivated;
        }
        info!("Deactivated plugin {} ({} hooks removed)", name, removed);
    }

    /// 플러그인 완전 제거 (uninstall)
    pub fn unregister_plugin(&self, name: &str) {
        self.detach(name);
        self.states.write().remove(name);
        debug!("Unregistered plugin {}", name);
    }

    /// 활성 상태 변경
    ///
    /// 비활성화는 호스트 호출 전에 로컬에서 먼저 적용한다. 호스트가 거부하면
    /// 이전 등록을 복구한다.
    pub async fn toggle_active(&self, name: &str, active: bool) -> Result<Plugin> {
        let was_registered = self.is_registered(name);

        if !active {
            self.deactivate(name);
        }

        let plugin = match self.bridge.toggle_active(name, active).await {
            Ok(plugin) => plugin,
            Err(e) => {
                if !active && was_registered {
                    if let Ok(Some(current)) = self.bridge.get(name).await {
                        if let Err(restore) = self.register_plugin(&current).await {
                            warn!("Failed to restore {}: {}", name, restore);
                        }
                    }
                }
                return Err(e);
            }
        };

        if active && !self.is_registered(name) {
            self.register_plugin(&plugin).await?;
        }
        Ok(plugin)
    }

    /// 전부 떼어내고 활성 플러그인으로 다시 구성
    pub async fn reload(&self) -> Result<Vec<Plugin>> {
        let names: Vec<String> = self.states.read().keys().cloned().collect();
        for name in &names {
            self.detach(name);
        }
        self.states.write().clear();

        info!("Reloading plugins");
        self.register_active().await
    }

    /// 호스트 시그널 처리
    pub async fn handle_signal(&self, signal: HostSignal) {
        match signal {
            HostSignal::Reload { .. } => {
                if let Err(e) = self.reload().await {
                    error!("Reload failed: {}", e);
                }
            }
            HostSignal::Lifecycle(event) => {
                let name = event.plugin.name.as_str();
                match event.kind {
                    LifecycleEvent::Deactivated => {
                        if self.is_registered(name) {
                            self.deactivate(name);
                        }
                    }
                    LifecycleEvent::Uninstalled => self.unregister_plugin(name),
                    LifecycleEvent::Activated => {
                        if !self.is_registered(name) {
                            if let Err(e) = self.register_plugin(&event.plugin).await {
                                warn!("Failed to register {}: {}", name, e);
                            }
                        }
                    }
                    LifecycleEvent::Installed | LifecycleEvent::Updated => {}
                }
            }
        }
    }

    /// 시그널 수신 루프 시작 (transport가 시그널을 지원하지 않으면 None)
    pub fn watch(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let mut signals = self.bridge.signals()?;
        let manager = Arc::clone(self);

        Some(tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(signal) => manager.handle_signal(signal).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Missed {} host signals, reloading", skipped);
                        manager
                            .handle_signal(HostSignal::Reload { names: Vec::new() })
                            .await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn state(&self, name: &str) -> Option<ActivationState> {
        self.states.read().get(name).copied()
    }

    /// hook이 연결되어 있거나 등록 상태인지
    pub fn is_registered(&self, name: &str) -> bool {
        matches!(
            self.state(name),
            Some(ActivationState::Registered | ActivationState::Activated)
        )
    }

    /// point에 연결된 플러그인 이름 (등록 순서)
    pub fn hooks(&self, point: &str) -> Vec<String> {
        self.registry
            .read()
            .get(point)
            .map(|list| list.iter().map(|a| a.plugin.name.clone()).collect())
            .unwrap_or_default()
    }

    /// 연결된 point 이름
    pub fn points(&self) -> Vec<String> {
        let mut points: Vec<String> = self.registry.read().keys().cloned().collect();
        points.sort();
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::host::PluginHost;
    use crate::plugin::loader::{HookModule, StaticModuleLoader};
    use crate::plugin::resolver::{MemoryPackage, MemoryResolver};
    use crate::plugin::store::PluginStore;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn package(name: &str, points: &[&str]) -> MemoryPackage {
        MemoryPackage::new(json!({
            "name": name,
            "version": "1.0.0",
            "main": "index.js",
            "activationPoints": points
        }))
    }

    async fn setup(loader: StaticModuleLoader) -> (ActivationManager, Arc<PluginHost>, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(PluginStore::open(temp.path().join("plugins")).await.unwrap());
        let resolver = MemoryResolver::new()
            .with_package("a", package("a", &["init"]))
            .with_package("b", package("b", &["init", "ui"]));
        let host = Arc::new(PluginHost::new(store, Arc::new(resolver)));
        host.install(vec!["a".into(), "b".into()]).await;

        let manager = ActivationManager::new(PluginBridge::local(host.clone()), Arc::new(loader));
        (manager, host, temp)
    }

    fn counting(
        counter: Arc<AtomicUsize>,
    ) -> FnHook<impl Fn(&ActivationContext) -> Result<()> + Send + Sync> {
        FnHook::new(move |_: &ActivationContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_register_active_and_trigger() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (a, b) = (calls.clone(), calls.clone());
        let loader = StaticModuleLoader::new()
            .with_module("a", move || HookModule::new().on("init", counting(a.clone())))
            // b는 ui를 구현하지 않음 (no-op)
            .with_module("b", move || HookModule::new().on("init", counting(b.clone())));

        let (manager, _host, _temp) = setup(loader).await;
        let registered = manager.register_active().await.unwrap();
        assert_eq!(registered.len(), 2);
        assert_eq!(manager.hooks("init"), vec!["a", "b"]);
        assert!(manager.hooks("ui").is_empty());

        let report = manager.trigger("init").await;
        assert!(report.is_ok());
        assert_eq!(report.invoked, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.state("a"), Some(ActivationState::Activated));
    }

    #[tokio::test]
    async fn test_trigger_isolates_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let b = calls.clone();
        let loader = StaticModuleLoader::new()
            .with_module("a", || {
                HookModule::new().on(
                    "init",
                    FnHook::new(|_: &ActivationContext| Err(Error::Internal("broken".into()))),
                )
            })
            .with_module("b", move || HookModule::new().on("init", counting(b.clone())));

        let (manager, _host, _temp) = setup(loader).await;
        manager.register_active().await.unwrap();

        let report = manager.trigger("init").await;
        assert_eq!(report.invoked, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            &report.errors[0],
            Error::ActivationCallback { plugin, .. } if plugin == "a"
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_hook_is_reported() {
        let loader = StaticModuleLoader::new().with_module("a", || {
            HookModule::new().on("init", FnHook::new(|_: &ActivationContext| panic!("boom")))
        });

        let (manager, _host, _temp) = setup(loader).await;
        manager.register_active().await.unwrap();

        let report = manager.trigger("init").await;
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_deactivate_is_immediate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let a = calls.clone();
        let loader = StaticModuleLoader::new().with_module("a", move || {
            HookModule::new().on(
                "init",
                FnHook::new({
                    let a = a.clone();
                    move |ctx: &ActivationContext| {
                        a.fetch_add(1, Ordering::SeqCst);
                        ctx.register("menu", "a-item", json!("A"), 0);
                        Ok(())
                    }
                }),
            )
        });

        let (manager, host, _temp) = setup(loader).await;
        manager.register_active().await.unwrap();
        manager.trigger("init").await;
        assert_eq!(manager.extensions().get("menu").unwrap().len(), 1);

        let plugin = manager.toggle_active("a", false).await.unwrap();
        assert!(!plugin.active);
        assert!(!host.get("a").await.unwrap().active);
        assert_eq!(manager.state("a"), Some(ActivationState::Deactivated));
        assert!(manager.extensions().get("menu").unwrap().is_empty());

        manager.trigger("init").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // 다시 활성화
        manager.toggle_active("a", true).await.unwrap();
        assert_eq!(manager.state("a"), Some(ActivationState::Registered));
        manager.trigger("init").await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_uninstall_signal_removes_plugin() {
        let loader = StaticModuleLoader::new()
            .with_module("a", || HookModule::new().on("init", FnHook::new(|_: &ActivationContext| Ok(()))));

        let (manager, host, _temp) = setup(loader).await;
        let manager = Arc::new(manager);
        manager.register_active().await.unwrap();

        let plugin = host.get("a").await.unwrap();
        manager
            .handle_signal(HostSignal::Lifecycle(crate::plugin::events::PluginEvent::new(
                LifecycleEvent::Uninstalled,
                plugin,
            )))
            .await;

        assert_eq!(manager.state("a"), None);
        assert!(manager.hooks("init").iter().all(|name| name != "a"));
    }

    #[tokio::test]
    async fn test_reload_rebuilds_registry() {
        let loader = StaticModuleLoader::new()
            .with_module("a", || HookModule::new().on("init", FnHook::new(|_: &ActivationContext| Ok(()))));

        let (manager, host, _temp) = setup(loader).await;
        manager.register_active().await.unwrap();
        assert_eq!(manager.hooks("init"), vec!["a"]);

        host.toggle_active("a", false).await.unwrap();
        manager.reload().await.unwrap();
        assert!(manager.hooks("init").is_empty());
        assert_eq!(manager.state("a"), None);
    }

    #[tokio::test]
    async fn test_hook_timeout() {
        struct Slow;

        #[async_trait]
        impl ActivationHook for Slow {
            async fn activate(&self, _ctx: &ActivationContext) -> Result<()> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        }

        let loader = StaticModuleLoader::new().with_module("a", || HookModule::new().on("init", Slow));
        let (manager, _host, _temp) = setup(loader).await;
        let manager = manager.with_hook_timeout(Duration::from_millis(20));
        manager.register_active().await.unwrap();

        let report = manager.trigger("init").await;
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].to_string().contains("timed out"));
    }
}
