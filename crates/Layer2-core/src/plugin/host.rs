//! Plugin Host - 특권 프로세스 측 런타임
//!
//! 저장소, 설치기, 구독 버스, 이름별 락을 소유하고 install / update / uninstall /
//! toggle_active를 제공합니다. 호스트 시작 시 한 번 만들고 종료 시 `shutdown`합니다.
//! 실행 컨텍스트는 이 타입을 직접 쓰지 않고 bridge를 통해 접근합니다.

use async_trait::async_trait;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use plugkit_foundation::{Error, Result, RuntimeConfig};

use super::entity::{Plugin, Specifier};
use super::events::{HostSignal, LifecycleEvent, PluginEvent, SubscriptionBus, SubscriptionId};
use super::installer::{sibling, PluginInstaller};
use super::lock::NameLocks;
use super::manifest::{is_newer, peek_version};
use super::outcome::{
    InstallOutcome, InstallResult, UninstallItem, UninstallReport, UpdateItem, UpdateReport,
    UpdateStatus,
};
use super::resolver::PackageResolver;
use super::store::PluginStore;

/// 원격 매니페스트에 버전이 없을 때의 표시
pub const UNVERSIONED: &str = "latest";

// ============================================================================
// ConfirmInstall - 설치 확인 게이트
// ============================================================================

/// 설치 확인 게이트 (false면 배치 전체 취소)
#[async_trait]
pub trait ConfirmInstall: Send + Sync {
    async fn confirm(&self, specifiers: &[String]) -> bool;
}

/// 클로저 기반 확인 게이트
pub struct ConfirmFn<F>(pub F);

#[async_trait]
impl<F> ConfirmInstall for ConfirmFn<F>
where
    F: Fn(&[String]) -> bool + Send + Sync,
{
    async fn confirm(&self, specifiers: &[String]) -> bool {
        (self.0)(specifiers)
    }
}

// ============================================================================
// PluginHost
// ============================================================================

/// 특권 프로세스 플러그인 호스트
pub struct PluginHost {
    store: Arc<PluginStore>,
    installer: PluginInstaller,
    resolver: Arc<dyn PackageResolver>,
    bus: Arc<SubscriptionBus>,
    locks: Arc<NameLocks>,
    confirm: Option<Arc<dyn ConfirmInstall>>,
}

impl PluginHost {
    /// 설정의 pluginsPath에서 저장소를 열어 호스트 생성
    pub async fn open(config: &RuntimeConfig, resolver: Arc<dyn PackageResolver>) -> Result<Self> {
        let plugins_path = config.plugins_path()?;
        fs::create_dir_all(&plugins_path)
            .await
            .map_err(|e| Error::filesystem(&plugins_path, e))?;

        let store = Arc::new(PluginStore::open(&plugins_path).await?);
        let bus = Arc::new(SubscriptionBus::with_capacity(config.channel_capacity()));

        info!("Plugin host ready at {}", plugins_path.display());
        Ok(Self::with_parts(store, resolver, bus))
    }

    /// 이미 로드된 저장소로 생성
    pub fn new(store: Arc<PluginStore>, resolver: Arc<dyn PackageResolver>) -> Self {
        Self::with_parts(store, resolver, Arc::new(SubscriptionBus::new()))
    }

    fn with_parts(
        store: Arc<PluginStore>,
        resolver: Arc<dyn PackageResolver>,
        bus: Arc<SubscriptionBus>,
    ) -> Self {
        let locks = Arc::new(NameLocks::new());
        let installer =
            PluginInstaller::new(store.clone(), resolver.clone(), bus.clone(), locks.clone());

        Self {
            store,
            installer,
            resolver,
            bus,
            locks,
            confirm: None,
        }
    }

    /// 설치 확인 게이트 주입
    pub fn with_confirm(mut self, confirm: impl ConfirmInstall + 'static) -> Self {
        self.confirm = Some(Arc::new(confirm));
        self
    }

    pub fn plugins_path(&self) -> &Path {
        self.store.base_dir()
    }

    pub fn store(&self) -> &Arc<PluginStore> {
        &self.store
    }

    // ========================================================================
    // install
    // ========================================================================

    /// specifier 배치 설치
    ///
    /// 확인 게이트가 거부하면 파일시스템 변경 없이 `Cancelled`.
    /// 항목끼리는 동시에 진행되고 실패는 항목별로 격리된다.
    pub async fn install(&self, specifiers: Vec<Specifier>) -> InstallOutcome {
        let requests: Vec<_> = specifiers.into_iter().map(Specifier::into_parts).collect();

        if let Some(confirm) = &self.confirm {
            let names: Vec<String> = requests.iter().map(|(s, _)| s.clone()).collect();
            if !confirm.confirm(&names).await {
                info!("Install of {} plugin(s) cancelled", names.len());
                return InstallOutcome::Cancelled;
            }
        }

        let results = join_all(requests.into_iter().map(|(specifier, options)| async move {
            let result = self.installer.install(&specifier, options).await;
            if let Err(e) = &result {
                warn!("Failed to install {}: {}", specifier, e);
            }
            InstallResult { specifier, result }
        }))
        .await;

        InstallOutcome::Completed(results)
    }

    // ========================================================================
    // update
    // ========================================================================

    /// 업데이트 확인 (읽기 전용)
    ///
    /// 새 버전 문자열을 반환하고, 최신이면 None.
    pub async fn is_update_available(&self, name: &str) -> Result<Option<String>> {
        let plugin = self.require(name).await?;
        Ok(self
            .check_update(&plugin)
            .await?
            .map(|remote| remote.unwrap_or_else(|| UNVERSIONED.to_string())))
    }

    /// 저장된 origin의 최신 매니페스트와 비교
    ///
    /// `Some(None)`은 원격 매니페스트에 버전이 없는 경우 (항상 다시 받음).
    async fn check_update(&self, plugin: &Plugin) -> Result<Option<Option<String>>> {
        let remote = self
            .resolver
            .manifest(&plugin.origin, &plugin.install_options.latest())
            .await
            .map_err(|e| match e {
                e @ Error::ResolutionFailed { .. } => e,
                e => Error::resolution(&plugin.origin, e.to_string()),
            })?;

        let Some(remote) = remote else {
            debug!("{} has no remote manifest", plugin.name);
            return Ok(None);
        };

        let remote_version = peek_version(&remote);
        let newer = match remote_version.as_deref() {
            None => true,
            Some(version) => is_newer(plugin.version.as_deref(), Some(version)),
        };
        if !newer {
            debug!("{} is up to date", plugin.name);
            return Ok(None);
        }

        Ok(Some(remote_version))
    }

    /// 이름 배치 업데이트
    ///
    /// 최신인 항목은 저장소 기록도 알림도 없이 그대로 반환된다.
    /// `reload`이면 배치가 끝난 뒤 실제로 바뀐 이름에 대해 한 번만 reload를 보낸다.
    pub async fn update(&self, names: Vec<String>, reload: bool) -> UpdateReport {
        let items = join_all(names.into_iter().map(|name| async move {
            let result = self.update_one(&name).await;
            if let Err(e) = &result {
                warn!("Failed to update {}: {}", name, e);
            }
            UpdateItem { name, result }
        }))
        .await;

        let report = UpdateReport { items };
        let updated: Vec<String> = report.updated().into_iter().map(String::from).collect();
        if reload && !updated.is_empty() {
            self.bus.broadcast_reload(updated);
        }
        report
    }

    async fn update_one(&self, name: &str) -> Result<UpdateStatus> {
        let _guard = self.locks.acquire(name).await;
        let current = self.require(name).await?;

        match self.check_update(&current).await? {
            None => Ok(UpdateStatus::UpToDate(current)),
            Some(version) => {
                let plugin = self.installer.update(&current, version.as_deref()).await?;
                Ok(UpdateStatus::Updated(plugin))
            }
        }
    }

    // ========================================================================
    // uninstall
    // ========================================================================

    /// 이름 배치 제거
    ///
    /// 설치되지 않은 이름은 성공(no-op). 파일 삭제에 실패한 이름은 저장소 항목이 남는다.
    pub async fn uninstall(&self, names: Vec<String>, reload: bool) -> UninstallReport {
        let items = join_all(names.into_iter().map(|name| async move {
            let result = self.uninstall_one(&name).await;
            if let Err(e) = &result {
                warn!("Failed to uninstall {}: {}", name, e);
            }
            UninstallItem { name, result }
        }))
        .await;

        let report = UninstallReport { items };
        let removed: Vec<String> = report.removed().into_iter().map(String::from).collect();
        if reload && !removed.is_empty() {
            self.bus.broadcast_reload(removed);
        }
        report
    }

    async fn uninstall_one(&self, name: &str) -> Result<bool> {
        let _guard = self.locks.acquire(name).await;

        let Some(record) = self.store.get_record(name).await else {
            debug!("{} is not installed", name);
            return Ok(false);
        };

        let path = record.path.clone();
        if fs::try_exists(&path).await.unwrap_or(false) {
            // 먼저 옮겨두면 삭제 실패 시 되돌릴 수 있다
            let trash = sibling(&path, "trash")?;
            fs::rename(&path, &trash)
                .await
                .map_err(|e| Error::filesystem(&path, e))?;

            if let Err(e) = fs::remove_dir_all(&trash).await {
                if let Err(restore) = fs::rename(&trash, &path).await {
                    warn!("Failed to restore {}: {}", path.display(), restore);
                }
                return Err(Error::filesystem(&path, e));
            }

            // 비어 있는 scope 디렉토리 정리
            if let Some(parent) = path.parent() {
                if parent != self.store.base_dir() {
                    let _ = fs::remove_dir(parent).await;
                }
            }
        }

        self.store.remove(name).await?;
        info!("Uninstalled plugin: {}", name);

        self.bus.notify(LifecycleEvent::Uninstalled, &record.plugin);
        self.bus.drop_plugin(name);
        Ok(true)
    }

    // ========================================================================
    // toggle_active
    // ========================================================================

    /// 활성 상태 변경
    ///
    /// activation point가 없는 플러그인은 활성화할 수 없다.
    pub async fn toggle_active(&self, name: &str, active: bool) -> Result<Plugin> {
        let _guard = self.locks.acquire(name).await;
        let current = self.require(name).await?;

        if active && current.activation_points.is_empty() {
            return Err(Error::NoActivationPoints(name.to_string()));
        }

        let plugin = self
            .store
            .set_active(name, active)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Plugin not installed: {}", name)))?;

        let kind = if active {
            LifecycleEvent::Activated
        } else {
            LifecycleEvent::Deactivated
        };
        self.bus.notify(kind, &plugin);
        Ok(plugin)
    }

    // ========================================================================
    // 조회 / 구독
    // ========================================================================

    pub async fn get_active(&self) -> Vec<Plugin> {
        self.store.get_active().await
    }

    pub async fn get(&self, name: &str) -> Option<Plugin> {
        self.store.get(name).await
    }

    pub async fn list(&self) -> Vec<Plugin> {
        self.store.list().await
    }

    async fn require(&self, name: &str) -> Result<Plugin> {
        self.store
            .get(name)
            .await
            .ok_or_else(|| Error::NotFound(format!("Plugin not installed: {}", name)))
    }

    /// 이름에 생명주기 콜백 등록
    pub fn subscribe<F>(&self, name: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&PluginEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(name, callback)
    }

    pub fn unsubscribe(&self, name: &str, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(name, id)
    }

    /// 실행 컨텍스트용 시그널 수신자
    pub fn signals(&self) -> broadcast::Receiver<HostSignal> {
        self.bus.signals()
    }

    /// 종료 - 저장소를 마지막으로 기록하고 락을 정리
    pub async fn shutdown(&self) -> Result<()> {
        self.store.persist().await?;
        self.locks.prune();
        info!("Plugin host stopped");
        Ok(())
    }
}
