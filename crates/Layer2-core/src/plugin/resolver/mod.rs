//! Package Resolver - specifier를 매니페스트와 파일 집합으로 해석
//!
//! 설치기는 resolver를 주입받아 사용하며, 패키지를 가져오는 방식(로컬, 레지스트리,
//! 메모리)은 resolver 구현에 맡깁니다.

mod archive;
mod local;
mod memory;
mod registry;

pub(crate) use archive::copy_dir_recursive;
pub use local::LocalResolver;
pub use memory::{MemoryPackage, MemoryResolver};
pub use registry::RegistryResolver;

use async_trait::async_trait;
use plugkit_foundation::{Error, Result, RuntimeConfig};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::entity::InstallOptions;
use super::manifest::MANIFEST_FILE;
use super::source::PluginSource;

// ============================================================================
// ResolvedPackage - 해석된 패키지
// ============================================================================

/// 해석된 패키지 - 매니페스트 바이트와 파일이 있는 디렉토리
#[derive(Debug)]
pub struct ResolvedPackage {
    /// `package.json` 원본 (없으면 None)
    pub manifest: Option<Vec<u8>>,

    /// 패키지 파일 루트
    pub root: PathBuf,

    /// resolver가 만든 임시 디렉토리 (설치 후 삭제)
    scratch: Option<PathBuf>,
}

impl ResolvedPackage {
    /// 기존 디렉토리를 그대로 사용 (삭제하지 않음)
    pub fn from_dir(manifest: Option<Vec<u8>>, root: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            root: root.into(),
            scratch: None,
        }
    }

    /// resolver 소유 임시 디렉토리 사용 (cleanup 시 삭제)
    pub fn scratch(manifest: Option<Vec<u8>>, root: impl Into<PathBuf>, scratch: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            root: root.into(),
            scratch: Some(scratch.into()),
        }
    }

    /// 임시 디렉토리 정리
    pub async fn cleanup(self) {
        if let Some(dir) = self.scratch {
            if let Err(e) = fs::remove_dir_all(&dir).await {
                warn!("Failed to remove scratch dir {}: {}", dir.display(), e);
            }
        }
    }
}

/// 디렉토리에서 매니페스트 읽기 (없으면 None)
pub async fn read_manifest(root: &Path) -> Result<Option<Vec<u8>>> {
    let path = root.join(MANIFEST_FILE);
    match fs::read(&path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No {} in {}", MANIFEST_FILE, root.display());
            Ok(None)
        }
        Err(e) => Err(Error::filesystem(&path, e)),
    }
}

/// resolver 임시 디렉토리 생성
pub(crate) async fn scratch_dir(specifier: &str) -> Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("plugkit_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::resolution(specifier, format!("cannot create scratch dir: {}", e)))?;
    Ok(dir)
}

// ============================================================================
// PackageResolver - 외부 협력자
// ============================================================================

/// 패키지 resolver
#[async_trait]
pub trait PackageResolver: Send + Sync {
    /// specifier를 매니페스트와 파일 집합으로 해석
    async fn resolve(&self, specifier: &str, options: &InstallOptions) -> Result<ResolvedPackage>;

    /// 매니페스트만 조회 (업데이트 확인용, 파일을 남기지 않음)
    async fn manifest(&self, specifier: &str, options: &InstallOptions) -> Result<Option<Vec<u8>>>;
}

// ============================================================================
// SourceResolver - specifier 형태별 분배
// ============================================================================

/// 기본 resolver - 로컬 경로, tarball URL, 레지스트리를 구분해 위임
pub struct SourceResolver {
    local: LocalResolver,
    registry: RegistryResolver,
}

impl SourceResolver {
    pub fn new(registry_url: impl Into<String>) -> Self {
        Self {
            local: LocalResolver::new(),
            registry: RegistryResolver::new(registry_url),
        }
    }

    /// 설정에서 생성
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.registry_url())
    }

    fn classify(specifier: &str) -> Result<PluginSource> {
        PluginSource::parse(specifier)
            .ok_or_else(|| Error::resolution(specifier, "unrecognized plugin specifier"))
    }
}

#[async_trait]
impl PackageResolver for SourceResolver {
    async fn resolve(&self, specifier: &str, options: &InstallOptions) -> Result<ResolvedPackage> {
        match Self::classify(specifier)? {
            PluginSource::Directory(_) | PluginSource::Archive(_) => {
                self.local.resolve(specifier, options).await
            }
            PluginSource::Url(_) | PluginSource::Registry { .. } => {
                self.registry.resolve(specifier, options).await
            }
        }
    }

    async fn manifest(&self, specifier: &str, options: &InstallOptions) -> Result<Option<Vec<u8>>> {
        match Self::classify(specifier)? {
            PluginSource::Directory(_) | PluginSource::Archive(_) => {
                self.local.manifest(specifier, options).await
            }
            PluginSource::Url(_) | PluginSource::Registry { .. } => {
                self.registry.manifest(specifier, options).await
            }
        }
    }
}
