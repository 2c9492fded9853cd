//! tarball 다운로드 / 압축 해제 유틸리티

use plugkit_foundation::{Error, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// 다운로드한 tarball 파일명
pub(crate) const ARCHIVE_FILE: &str = "package.tgz";

/// 파일 다운로드
pub(crate) async fn download_file(client: &Client, url: &str, dest: &Path) -> Result<()> {
    debug!("Downloading {} to {}", url, dest.display());

    let response = client
        .get(url)
        .header("User-Agent", "plugkit")
        .send()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    if !response.status().is_success() {
        return Err(Error::Http(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Http(e.to_string()))?;

    fs::write(dest, bytes)
        .await
        .map_err(|e| Error::filesystem(dest, e))?;
    Ok(())
}

/// tarball 압축 해제 (`tar -xzf`)
pub(crate) async fn extract_tarball(archive: &Path, dest: &Path) -> Result<()> {
    debug!("Extracting {} to {}", archive.display(), dest.display());

    let output = tokio::process::Command::new("tar")
        .arg("-xzf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .output()
        .await
        .map_err(|e| Error::Internal(format!("Failed to run tar: {}", e)))?;

    if !output.status.success() {
        return Err(Error::Internal(format!(
            "Failed to extract archive: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(())
}

/// 압축 해제 후 패키지 루트 찾기
///
/// npm tarball은 `package/` 아래에 파일을 두지만 이름이 다른 경우도 있어
/// 매니페스트가 최상위에 없으면 첫 하위 디렉토리를 사용한다.
pub(crate) async fn find_extracted_dir(dir: &Path) -> Result<PathBuf> {
    if fs::try_exists(dir.join(super::MANIFEST_FILE)).await.unwrap_or(false) {
        return Ok(dir.to_path_buf());
    }

    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| Error::filesystem(dir, e))?;

    let mut dirs = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::filesystem(dir, e))?
    {
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }

    dirs.sort();
    let preferred = dir.join("package");
    if dirs.contains(&preferred) {
        return Ok(preferred);
    }

    dirs.into_iter()
        .next()
        .ok_or_else(|| Error::NotFound("No directory found after extraction".into()))
}

/// 디렉토리 재귀 복사
pub(crate) async fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)
        .await
        .map_err(|e| Error::filesystem(dest, e))?;

    let mut entries = fs::read_dir(src)
        .await
        .map_err(|e| Error::filesystem(src, e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::filesystem(src, e))?
    {
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| Error::filesystem(&src_path, e))?;

        if file_type.is_dir() {
            Box::pin(copy_dir_recursive(&src_path, &dest_path)).await?;
        } else {
            fs::copy(&src_path, &dest_path)
                .await
                .map_err(|e| Error::filesystem(&src_path, e))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_dir_recursive() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("lib")).unwrap();
        std::fs::write(src.join("index.js"), "main").unwrap();
        std::fs::write(src.join("lib").join("util.js"), "util").unwrap();

        let dest = temp.path().join("dest");
        copy_dir_recursive(&src, &dest).await.unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("index.js")).unwrap(), "main");
        assert_eq!(
            std::fs::read_to_string(dest.join("lib").join("util.js")).unwrap(),
            "util"
        );
    }

    #[tokio::test]
    async fn test_find_extracted_dir_prefers_package() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("aaa")).unwrap();
        std::fs::create_dir_all(temp.path().join("package")).unwrap();

        let found = find_extracted_dir(temp.path()).await.unwrap();
        assert_eq!(found, temp.path().join("package"));
    }

    #[tokio::test]
    async fn test_find_extracted_dir_manifest_at_root() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(super::super::MANIFEST_FILE), "{}").unwrap();

        let found = find_extracted_dir(temp.path()).await.unwrap();
        assert_eq!(found, temp.path());
    }

    #[tokio::test]
    async fn test_find_extracted_dir_empty() {
        let temp = TempDir::new().unwrap();
        assert!(find_extracted_dir(temp.path()).await.is_err());
    }
}
