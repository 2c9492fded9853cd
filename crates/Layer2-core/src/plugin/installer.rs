//! Plugin Installer - 해석, 검증, 스테이징, 기록
//!
//! 하나의 specifier를 설치하는 단계:
//! 1. resolver로 매니페스트와 파일 집합 해석
//! 2. 매니페스트 검증
//! 3. 형제 임시 디렉토리에 스테이징 후 rename으로 교체
//! 4. 저장소 기록 (디스크 반영 후 반환)
//! 5. 구독 버스 알림

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use plugkit_foundation::{Error, Result};

use super::entity::{InstallOptions, Plugin, PluginUrl};
use super::events::{LifecycleEvent, SubscriptionBus};
use super::lock::NameLocks;
use super::manifest::{inspect, peek_name, ValidatedManifest};
use super::resolver::{copy_dir_recursive, PackageResolver, ResolvedPackage};
use super::store::PluginStore;

// ============================================================================
// PluginInstaller - 플러그인 설치기
// ============================================================================

/// 플러그인 설치기
pub struct PluginInstaller {
    /// 플러그인 저장소
    store: Arc<PluginStore>,

    /// 패키지 resolver
    resolver: Arc<dyn PackageResolver>,

    /// 구독 버스
    bus: Arc<SubscriptionBus>,

    /// 이름별 락
    locks: Arc<NameLocks>,
}

impl PluginInstaller {
    /// 새 설치기 생성
    pub fn new(
        store: Arc<PluginStore>,
        resolver: Arc<dyn PackageResolver>,
        bus: Arc<SubscriptionBus>,
        locks: Arc<NameLocks>,
    ) -> Self {
        Self {
            store,
            resolver,
            bus,
            locks,
        }
    }

    // ========================================================================
    // 설치
    // ========================================================================

    /// specifier 하나 설치
    ///
    /// 해석은 락 밖에서 진행하고, 매니페스트 이름이 확정되면 그 이름의 락을 잡는다.
    pub async fn install(&self, specifier: &str, options: InstallOptions) -> Result<Plugin> {
        info!("Installing plugin: {}", specifier);

        let package = self.resolve(specifier, &options).await?;

        let result = {
            let _guard = match peek_name(package.manifest.as_deref()) {
                Some(name) => Some(self.locks.acquire(&name).await),
                None => None,
            };
            self.commit(specifier, options, &package, None).await
        };

        package.cleanup().await;
        result
    }

    /// 설치된 플러그인 업데이트
    ///
    /// 호출자가 `current.name`의 락을 잡고 있어야 한다. 저장된 origin과 설치 옵션을 그대로
    /// 재사용하고, `version`이 있으면 그 버전으로 고정해서 해석한다.
    pub async fn update(&self, current: &Plugin, version: Option<&str>) -> Result<Plugin> {
        info!(
            "Updating plugin: {} (v{} -> v{})",
            current.name,
            current.version.as_deref().unwrap_or("?"),
            version.unwrap_or("latest")
        );

        let mut options = current.install_options.clone();
        if let Some(version) = version {
            options.version = Some(version.to_string());
        }

        let package = self.resolve(&current.origin, &options).await?;
        let result = self
            .commit(
                &current.origin,
                current.install_options.clone(),
                &package,
                Some(current),
            )
            .await;

        package.cleanup().await;
        result
    }

    async fn resolve(&self, specifier: &str, options: &InstallOptions) -> Result<ResolvedPackage> {
        self.resolver
            .resolve(specifier, options)
            .await
            .map_err(|e| match e {
                e @ Error::ResolutionFailed { .. } => e,
                e => Error::resolution(specifier, e.to_string()),
            })
    }

    // ========================================================================
    // 검증 + 기록
    // ========================================================================

    async fn commit(
        &self,
        origin: &str,
        install_options: InstallOptions,
        package: &ResolvedPackage,
        current: Option<&Plugin>,
    ) -> Result<Plugin> {
        let manifest = match inspect(package.manifest.as_deref(), origin) {
            Ok(manifest) => manifest,
            Err(e) => {
                let name = current
                    .map(|p| p.name.clone())
                    .or_else(|| peek_name(package.manifest.as_deref()));
                if let Some(name) = name {
                    self.deactivate_existing(&name).await?;
                }
                return Err(e);
            }
        };

        if let Some(current) = current {
            if current.name != manifest.name {
                warn!(
                    "{} now resolves to {}, keeping {} inactive",
                    origin, manifest.name, current.name
                );
                self.deactivate_existing(&current.name).await?;
                return Err(Error::ManifestInvalid(origin.to_string()));
            }
        }

        let existing = self.store.get(&manifest.name).await;

        if manifest.activation_points.is_empty() {
            let name = manifest.name.clone();
            if existing.is_some() {
                // 기존 파일과 항목은 그대로 두고 비활성화만
                self.deactivate_existing(&name).await?;
            } else {
                // 등록은 하되 활성화하지 않음
                let plugin = self
                    .write(origin, install_options, manifest, &package.root, false)
                    .await?;
                self.bus.notify(LifecycleEvent::Installed, &plugin);
            }
            warn!("Plugin {} declares no activation points", name);
            return Err(Error::NoActivationPoints(name));
        }

        // 업데이트는 사용자가 정한 활성 상태를 유지
        let active = match (current, &existing) {
            (Some(_), Some(previous)) => previous.active,
            _ => true,
        };

        let plugin = self
            .write(origin, install_options, manifest, &package.root, active)
            .await?;

        let kind = if existing.is_some() {
            LifecycleEvent::Updated
        } else {
            LifecycleEvent::Installed
        };
        info!(
            "Plugin {} {} (v{})",
            plugin.name,
            kind,
            plugin.version.as_deref().unwrap_or("?")
        );
        self.bus.notify(kind, &plugin);

        Ok(plugin)
    }

    /// 파일 교체 + 저장소 기록
    async fn write(
        &self,
        origin: &str,
        install_options: InstallOptions,
        manifest: ValidatedManifest,
        root: &Path,
        active: bool,
    ) -> Result<Plugin> {
        let target = self.store.plugin_dir(&manifest.name);
        let swap = swap_in(root, &target).await?;

        let plugin = Plugin {
            url: PluginUrl::new(&manifest.name, &manifest.main).to_string(),
            name: manifest.name,
            origin: origin.to_string(),
            version: manifest.version,
            activation_points: manifest.activation_points,
            active,
            install_options,
            description: manifest.description,
        };

        match self.store.upsert(plugin.clone(), &target).await {
            Ok(_) => {
                swap.finish().await;
                Ok(plugin)
            }
            Err(e) => {
                // 기록에 실패하면 디렉토리도 이전 상태로
                swap.rollback().await;
                Err(e)
            }
        }
    }

    /// 기존 항목을 비활성화 (항목이 없으면 무시)
    async fn deactivate_existing(&self, name: &str) -> Result<()> {
        if let Some(plugin) = self.store.set_active(name, false).await? {
            self.bus.notify(LifecycleEvent::Deactivated, &plugin);
        }
        Ok(())
    }
}

// ============================================================================
// 디렉토리 교체
// ============================================================================

/// `target`과 같은 부모 아래 숨김 디렉토리 경로
pub(crate) fn sibling(target: &Path, prefix: &str) -> Result<PathBuf> {
    let parent = target
        .parent()
        .ok_or_else(|| Error::filesystem(target, "install path has no parent"))?;
    let leaf = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::filesystem(target, "install path has no file name"))?;

    Ok(parent.join(format!(".{}-{}-{}", prefix, leaf, uuid::Uuid::new_v4())))
}

/// 교체된 설치 디렉토리 (이전 디렉토리는 trash에 보관)
struct Swap {
    target: PathBuf,
    trash: Option<PathBuf>,
}

impl Swap {
    /// 이전 디렉토리 삭제
    async fn finish(self) {
        if let Some(trash) = self.trash {
            if let Err(e) = fs::remove_dir_all(&trash).await {
                warn!("Failed to remove {}: {}", trash.display(), e);
            }
        }
    }

    /// 새 디렉토리를 지우고 이전 디렉토리 복구
    async fn rollback(self) {
        if let Err(e) = fs::remove_dir_all(&self.target).await {
            warn!("Failed to remove {}: {}", self.target.display(), e);
            return;
        }
        if let Some(trash) = self.trash {
            if let Err(e) = fs::rename(&trash, &self.target).await {
                warn!("Failed to restore {}: {}", self.target.display(), e);
            }
        }
    }
}

/// 스테이징 후 rename으로 설치 디렉토리 교체
///
/// 읽는 쪽은 이전 디렉토리 또는 새 디렉토리 중 하나만 본다.
async fn swap_in(source: &Path, target: &Path) -> Result<Swap> {
    let staging = sibling(target, "staging")?;
    if let Some(parent) = staging.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::filesystem(parent, e))?;
    }

    debug!("Staging {} -> {}", source.display(), staging.display());
    if let Err(e) = copy_dir_recursive(source, &staging).await {
        let _ = fs::remove_dir_all(&staging).await;
        return Err(e);
    }

    let trash = if fs::try_exists(target).await.unwrap_or(false) {
        let trash = sibling(target, "trash")?;
        if let Err(e) = fs::rename(target, &trash).await {
            let _ = fs::remove_dir_all(&staging).await;
            return Err(Error::filesystem(target, e));
        }
        Some(trash)
    } else {
        None
    };

    if let Err(e) = fs::rename(&staging, target).await {
        // 이전 디렉토리 복구
        if let Some(trash) = &trash {
            let _ = fs::rename(trash, target).await;
        }
        let _ = fs::remove_dir_all(&staging).await;
        return Err(Error::filesystem(target, e));
    }

    Ok(Swap {
        target: target.to_path_buf(),
        trash,
    })
}

// ============================================================================
// 테스트
// ============================================================================
