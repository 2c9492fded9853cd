//! Local Resolver - 로컬 디렉토리와 tarball

use async_trait::async_trait;
use plugkit_foundation::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::archive::{extract_tarball, find_extracted_dir};
use super::{read_manifest, scratch_dir, PackageResolver, ResolvedPackage};
use crate::plugin::entity::InstallOptions;
use crate::plugin::source::is_archive;

/// 로컬 경로 resolver
///
/// 디렉토리는 그대로 사용하고, tarball은 임시 디렉토리에 풀어서 사용한다.
#[derive(Debug, Default, Clone)]
pub struct LocalResolver;

impl LocalResolver {
    pub fn new() -> Self {
        Self
    }

    fn path_of(specifier: &str) -> PathBuf {
        let raw = specifier.trim();
        let raw = raw.strip_prefix("file:").unwrap_or(raw);

        match raw.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(raw)),
            None => PathBuf::from(raw),
        }
    }

    async fn unpack(specifier: &str, archive: &Path) -> Result<ResolvedPackage> {
        let scratch = scratch_dir(specifier).await?;

        let unpacked = async {
            extract_tarball(archive, &scratch).await?;
            find_extracted_dir(&scratch).await
        }
        .await;

        match unpacked {
            Ok(root) => {
                let manifest = read_manifest(&root).await?;
                Ok(ResolvedPackage::scratch(manifest, root, scratch))
            }
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&scratch).await;
                Err(Error::resolution(specifier, e.to_string()))
            }
        }
    }
}

#[async_trait]
impl PackageResolver for LocalResolver {
    async fn resolve(&self, specifier: &str, _options: &InstallOptions) -> Result<ResolvedPackage> {
        let path = Self::path_of(specifier);
        debug!("Resolving local package {}", path.display());

        if path.is_dir() {
            let manifest = read_manifest(&path)
                .await
                .map_err(|e| Error::resolution(specifier, e.to_string()))?;
            return Ok(ResolvedPackage::from_dir(manifest, path));
        }

        if path.is_file() && is_archive(specifier) {
            return Self::unpack(specifier, &path).await;
        }

        Err(Error::resolution(
            specifier,
            format!("{} does not exist", path.display()),
        ))
    }

    async fn manifest(&self, specifier: &str, options: &InstallOptions) -> Result<Option<Vec<u8>>> {
        let path = Self::path_of(specifier);
        if path.is_dir() {
            return read_manifest(&path)
                .await
                .map_err(|e| Error::resolution(specifier, e.to_string()));
        }

        let package = self.resolve(specifier, options).await?;
        let manifest = package.manifest.clone();
        package.cleanup().await;
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolve_directory_without_manifest() {
        let temp = TempDir::new().unwrap();
        let resolver = LocalResolver::new();

        let package = resolver
            .resolve(temp.path().to_str().unwrap(), &InstallOptions::default())
            .await
            .unwrap();
        assert!(package.manifest.is_none());
    }

    #[tokio::test]
    async fn test_resolve_missing_path() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let resolver = LocalResolver::new();

        let err = resolver
            .resolve(missing.to_str().unwrap(), &InstallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResolutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_manifest_only() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("package.json"),
            br#"{"name": "demo", "version": "1.0.0"}"#,
        )
        .unwrap();

        let resolver = LocalResolver::new();
        let manifest = resolver
            .manifest(temp.path().to_str().unwrap(), &InstallOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(String::from_utf8(manifest).unwrap().contains("1.0.0"));
    }

    #[test]
    fn test_file_prefix() {
        assert_eq!(LocalResolver::path_of("file:/tmp/x"), PathBuf::from("/tmp/x"));
    }
}
