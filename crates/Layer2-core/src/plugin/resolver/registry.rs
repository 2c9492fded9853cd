//! Registry Resolver - npm 호환 레지스트리와 tarball URL
//!
//! 레지스트리 패키지는 packument(`GET <registry>/<name>`)를 조회해 버전을 고르고
//! `dist.tarball`을 받아서 임시 디렉토리에 풉니다.

use async_trait::async_trait;
use plugkit_foundation::{Error, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::archive::{download_file, extract_tarball, find_extracted_dir, ARCHIVE_FILE};
use super::{read_manifest, scratch_dir, PackageResolver, ResolvedPackage};
use crate::plugin::entity::InstallOptions;
use crate::plugin::source::PluginSource;

/// 축약 메타데이터 Accept 헤더
const ABBREVIATED_METADATA: &str = "application/vnd.npm.install-v1+json";

/// 기본 dist-tag
const LATEST_TAG: &str = "latest";

/// 레지스트리 resolver
pub struct RegistryResolver {
    registry_url: String,
    client: Client,
}

impl RegistryResolver {
    pub fn new(registry_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            registry_url: registry_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn registry_url(&self) -> &str {
        &self.registry_url
    }

    /// packument URL (scoped 이름의 `/`는 인코딩)
    pub fn packument_url(&self, name: &str) -> Result<Url> {
        let path = match name.strip_prefix('@') {
            Some(rest) => format!("@{}", urlencoding::encode(rest)),
            None => urlencoding::encode(name).into_owned(),
        };

        Url::parse(&format!("{}/{}", self.registry_url, path))
            .map_err(|e| Error::Config(format!("Invalid registry url {}: {}", self.registry_url, e)))
    }

    async fn fetch_packument(&self, name: &str, options: &InstallOptions) -> Result<Value> {
        let url = self.packument_url(name)?;
        debug!("Fetching packument {}", url);

        let mut request = self.client.get(url.clone()).header("User-Agent", "plugkit");
        if !options.full_metadata {
            request = request.header("Accept", ABBREVIATED_METADATA);
        }

        let response = request.send().await.map_err(|e| Error::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "Failed to fetch {}: HTTP {}",
                url,
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Http(e.to_string()))
    }

    /// 요청 버전 선택 (옵션 > specifier 버전 > latest)
    ///
    /// 요청이 dist-tag이면 태그가 가리키는 버전을, 아니면 정확히 일치하는 버전을 고른다.
    pub fn select_version(packument: &Value, requested: Option<&str>) -> Option<Value> {
        let versions = packument.get("versions")?.as_object()?;
        let tags = packument.get("dist-tags").and_then(|t| t.as_object());
        let wanted = requested.unwrap_or(LATEST_TAG);

        let exact = tags
            .and_then(|t| t.get(wanted))
            .and_then(|v| v.as_str())
            .unwrap_or(wanted);

        versions
            .get(exact)
            .or_else(|| versions.get(exact.trim_start_matches('v')))
            .cloned()
    }

    async fn fetch_version(
        &self,
        name: &str,
        requested: Option<&str>,
        options: &InstallOptions,
    ) -> Result<Value> {
        let packument = self.fetch_packument(name, options).await?;
        Self::select_version(&packument, requested).ok_or_else(|| {
            Error::NotFound(format!(
                "{}@{} is not published",
                name,
                requested.unwrap_or(LATEST_TAG)
            ))
        })
    }

    async fn unpack_url(&self, specifier: &str, tarball: &str) -> Result<ResolvedPackage> {
        let scratch = scratch_dir(specifier).await?;

        let unpacked = async {
            let archive = scratch.join(ARCHIVE_FILE);
            download_file(&self.client, tarball, &archive).await?;
            extract_tarball(&archive, &scratch).await?;
            let _ = tokio::fs::remove_file(&archive).await;
            let root = find_extracted_dir(&scratch).await?;
            let manifest = read_manifest(&root).await?;
            Ok::<_, Error>((root, manifest))
        }
        .await;

        match unpacked {
            Ok((root, manifest)) => Ok(ResolvedPackage::scratch(manifest, root, scratch)),
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&scratch).await;
                Err(e)
            }
        }
    }

    fn classify(specifier: &str) -> Result<PluginSource> {
        match PluginSource::parse(specifier) {
            Some(source @ (PluginSource::Url(_) | PluginSource::Registry { .. })) => Ok(source),
            _ => Err(Error::resolution(specifier, "not a registry specifier")),
        }
    }

    fn tarball_of(version: &Value) -> Option<&str> {
        version.get("dist")?.get("tarball")?.as_str()
    }
}

#[async_trait]
impl PackageResolver for RegistryResolver {
    async fn resolve(&self, specifier: &str, options: &InstallOptions) -> Result<ResolvedPackage> {
        let tarball = match Self::classify(specifier)? {
            PluginSource::Url(url) => url,
            PluginSource::Registry { name, version } => {
                let requested = options.version.as_deref().or(version.as_deref());
                let meta = self
                    .fetch_version(&name, requested, options)
                    .await
                    .map_err(|e| Error::resolution(specifier, e.to_string()))?;

                Self::tarball_of(&meta)
                    .map(str::to_string)
                    .ok_or_else(|| Error::resolution(specifier, "published version has no tarball"))?
            }
            _ => return Err(Error::resolution(specifier, "not a registry specifier")),
        };

        info!("Fetching {} from {}", specifier, tarball);
        self.unpack_url(specifier, &tarball)
            .await
            .map_err(|e| match e {
                e @ Error::ResolutionFailed { .. } => e,
                e => Error::resolution(specifier, e.to_string()),
            })
    }

    async fn manifest(&self, specifier: &str, options: &InstallOptions) -> Result<Option<Vec<u8>>> {
        match Self::classify(specifier)? {
            PluginSource::Registry { name, version } => {
                let requested = options.version.as_deref().or(version.as_deref());
                let meta = self
                    .fetch_version(&name, requested, options)
                    .await
                    .map_err(|e| Error::resolution(specifier, e.to_string()))?;
                Ok(Some(serde_json::to_vec(&meta)?))
            }
            _ => {
                let package = self.resolve(specifier, options).await?;
                let manifest = package.manifest.clone();
                package.cleanup().await;
                Ok(manifest)
            }
        }
    }
}
