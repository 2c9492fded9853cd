//! Memory Resolver - 메모리에 등록된 패키지
//!
//! 번들 플러그인이나 테스트에서 네트워크/파일시스템 없이 패키지를 제공할 때 사용합니다.
//! 같은 specifier로 여러 번 `publish`하면 마지막 것이 최신 버전이 됩니다.

use async_trait::async_trait;
use parking_lot::RwLock;
use plugkit_foundation::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs;

use super::{scratch_dir, PackageResolver, ResolvedPackage, MANIFEST_FILE};
use crate::plugin::entity::InstallOptions;
use crate::plugin::manifest::peek_version;

/// 메모리 패키지
#[derive(Debug, Clone, Default)]
pub struct MemoryPackage {
    /// `package.json` 원본 (None이면 매니페스트 없음)
    manifest: Option<Vec<u8>>,

    /// 상대 경로 → 내용
    files: Vec<(String, Vec<u8>)>,
}

impl MemoryPackage {
    /// JSON 매니페스트로 생성
    pub fn new(manifest: Value) -> Self {
        Self {
            manifest: Some(manifest.to_string().into_bytes()),
            files: Vec::new(),
        }
    }

    /// 원본 바이트로 생성 (깨진 매니페스트 테스트용)
    pub fn raw(manifest: impl Into<Vec<u8>>) -> Self {
        Self {
            manifest: Some(manifest.into()),
            files: Vec::new(),
        }
    }

    /// 매니페스트 없는 패키지
    pub fn without_manifest() -> Self {
        Self::default()
    }

    /// 파일 추가
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.into(), contents.into()));
        self
    }

    fn version(&self) -> Option<String> {
        self.manifest.as_deref().and_then(peek_version)
    }
}

/// 메모리 resolver
#[derive(Default)]
pub struct MemoryResolver {
    packages: RwLock<HashMap<String, Vec<MemoryPackage>>>,
    resolved: AtomicUsize,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 패키지 게시 (같은 specifier의 최신 버전이 됨)
    pub fn publish(&self, specifier: impl Into<String>, package: MemoryPackage) {
        self.packages
            .write()
            .entry(specifier.into())
            .or_default()
            .push(package);
    }

    /// 빌더 형태의 publish
    pub fn with_package(self, specifier: impl Into<String>, package: MemoryPackage) -> Self {
        self.publish(specifier, package);
        self
    }

    /// 게시 취소 (이후 해석 실패)
    pub fn unpublish(&self, specifier: &str) {
        self.packages.write().remove(specifier);
    }

    /// `resolve` 호출 횟수
    pub fn resolve_count(&self) -> usize {
        self.resolved.load(Ordering::SeqCst)
    }

    fn pick(&self, specifier: &str, options: &InstallOptions) -> Result<MemoryPackage> {
        let packages = self.packages.read();
        let versions = packages
            .get(specifier)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::resolution(specifier, "package not found"))?;

        let picked = match options.version.as_deref() {
            Some(wanted) => versions
                .iter()
                .rev()
                .find(|p| p.version().as_deref() == Some(wanted))
                .ok_or_else(|| Error::resolution(specifier, format!("version {} not found", wanted)))?,
            None => versions.last().ok_or_else(|| Error::resolution(specifier, "package not found"))?,
        };

        Ok(picked.clone())
    }
}

#[async_trait]
impl PackageResolver for MemoryResolver {
    async fn resolve(&self, specifier: &str, options: &InstallOptions) -> Result<ResolvedPackage> {
        self.resolved.fetch_add(1, Ordering::SeqCst);
        let package = self.pick(specifier, options)?;

        let scratch = scratch_dir(specifier).await?;
        let root = scratch.join("package");
        fs::create_dir_all(&root)
            .await
            .map_err(|e| Error::filesystem(&root, e))?;

        if let Some(manifest) = &package.manifest {
            let path = root.join(MANIFEST_FILE);
            fs::write(&path, manifest)
                .await
                .map_err(|e| Error::filesystem(&path, e))?;
        }

        for (relative, contents) in &package.files {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Error::filesystem(parent, e))?;
            }
            fs::write(&path, contents)
                .await
                .map_err(|e| Error::filesystem(&path, e))?;
        }

        Ok(ResolvedPackage::scratch(package.manifest, root, scratch))
    }

    async fn manifest(&self, specifier: &str, options: &InstallOptions) -> Result<Option<Vec<u8>>> {
        Ok(self.pick(specifier, options)?.manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn demo(version: &str) -> MemoryPackage {
        MemoryPackage::new(json!({
            "name": "demo",
            "version": version,
            "main": "index.js",
            "activationPoints": ["init"]
        }))
        .with_file("index.js", "noop")
    }

    #[tokio::test]
    async fn test_resolve_writes_files() {
        let resolver = MemoryResolver::new().with_package("demo", demo("0.0.1"));

        let package = resolver.resolve("demo", &InstallOptions::default()).await.unwrap();
        assert!(package.root.join(MANIFEST_FILE).exists());
        assert!(package.root.join("index.js").exists());

        let root = package.root.clone();
        package.cleanup().await;
        assert!(!root.exists());
        assert_eq!(resolver.resolve_count(), 1);
    }

    #[tokio::test]
    async fn test_latest_and_pinned() {
        let resolver = MemoryResolver::new()
            .with_package("demo", demo("0.0.1"))
            .with_package("demo", demo("0.0.2"));

        let latest = resolver.manifest("demo", &InstallOptions::default()).await.unwrap();
        assert_eq!(peek_version(&latest.unwrap()).as_deref(), Some("0.0.2"));

        let pinned = resolver
            .manifest("demo", &InstallOptions::new().with_version("0.0.1"))
            .await
            .unwrap();
        assert_eq!(peek_version(&pinned.unwrap()).as_deref(), Some("0.0.1"));
    }

    #[tokio::test]
    async fn test_unknown_specifier() {
        let resolver = MemoryResolver::new();
        let err = resolver
            .resolve("missing", &InstallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResolutionFailed { .. }));
    }
}
