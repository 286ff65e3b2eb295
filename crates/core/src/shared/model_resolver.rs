use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model {name} not found in {searched:?} and no download URL configured")]
    NotFound { name: String, searched: Vec<PathBuf> },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Resolve a model file by name.
///
/// Resolution order:
/// 1. Local models directory (`./models` by default)
/// 2. User cache directory (platform-specific)
/// 3. Download `{base_url}/{name}` into the cache, when a base URL is set
pub fn resolve(
    name: &str,
    models_dir: Option<&Path>,
    base_url: Option<&str>,
) -> Result<PathBuf, ModelResolveError> {
    // A model in the models directory needs no cache directory at all
    if let Some(local_path) = find_local(name, models_dir) {
        return Ok(local_path);
    }
    let cache_dir = model_cache_dir()?;
    resolve_in(name, models_dir, &cache_dir, base_url)
}

fn find_local(name: &str, models_dir: Option<&Path>) -> Option<PathBuf> {
    models_dir
        .map(|dir| dir.join(name))
        .filter(|path| path.exists())
}

fn resolve_in(
    name: &str,
    models_dir: Option<&Path>,
    cache_dir: &Path,
    base_url: Option<&str>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(local_path) = find_local(name, models_dir) {
        return Ok(local_path);
    }
    let mut searched: Vec<PathBuf> = models_dir.map(Path::to_path_buf).into_iter().collect();

    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        return Ok(cached_path);
    }
    searched.push(cache_dir.to_path_buf());

    let Some(base_url) = base_url else {
        return Err(ModelResolveError::NotFound {
            name: name.to_string(),
            searched,
        });
    };

    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    let url = format!("{}/{name}", base_url.trim_end_matches('/'));
    log::info!("Downloading {name} from {url}");
    download(&url, &cached_path)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Facelink/models/`
/// - Linux: `$XDG_CACHE_HOME/Facelink/models/` or `~/.cache/Facelink/models/`
/// - Windows: `%LOCALAPPDATA%/Facelink/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Facelink").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Facelink").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path) -> Result<(), ModelResolveError> {
    let response = reqwest::blocking::get(url).map_err(|e| ModelResolveError::Download {
        url: url.to_string(),
        source: e,
    })?;
    if !response.status().is_success() {
        return Err(ModelResolveError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let bytes = response.bytes().map_err(|e| ModelResolveError::Download {
        url: url.to_string(),
        source: e,
    })?;

    // Temp file then rename, so a failed download never leaves a truncated model
    let temp_path = dest.with_extension("part");
    let write_err = |e| ModelResolveError::Write {
        path: temp_path.clone(),
        source: e,
    };
    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(&bytes).map_err(write_err)?;
    file.flush().map_err(write_err)?;
    drop(file);
    log::info!("Downloaded {} bytes to {}", bytes.len(), dest.display());

    fs::rename(&temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_prefers_models_dir() {
        let tmp = TempDir::new().unwrap();
        let models = tmp.path().join("models");
        let cache = tmp.path().join("cache");
        fs::create_dir_all(&models).unwrap();
        fs::create_dir_all(&cache).unwrap();
        fs::write(models.join("m.onnx"), b"local").unwrap();
        fs::write(cache.join("m.onnx"), b"cached").unwrap();

        let path = resolve_in("m.onnx", Some(&models), &cache, None).unwrap();
        assert_eq!(path, models.join("m.onnx"));
    }

    #[test]
    fn test_resolve_falls_back_to_cache() {
        let tmp = TempDir::new().unwrap();
        let models = tmp.path().join("models");
        let cache = tmp.path().join("cache");
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join("m.onnx"), b"cached").unwrap();

        let path = resolve_in("m.onnx", Some(&models), &cache, None).unwrap();
        assert_eq!(path, cache.join("m.onnx"));
    }

    #[test]
    fn test_resolve_missing_without_url_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let models = tmp.path().join("models");
        let cache = tmp.path().join("cache");

        let err = resolve_in("m.onnx", Some(&models), &cache, None).unwrap_err();
        match err {
            ModelResolveError::NotFound { name, searched } => {
                assert_eq!(name, "m.onnx");
                assert_eq!(searched, vec![models, cache]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_finds_local_model_before_cache_lookup() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("m.onnx"), b"local").unwrap();

        let path = resolve("m.onnx", Some(tmp.path()), None).unwrap();
        assert_eq!(path, tmp.path().join("m.onnx"));
        assert_eq!(find_local("other.onnx", Some(tmp.path())), None);
        assert_eq!(find_local("m.onnx", None), None);
    }

    #[test]
    fn test_model_cache_dir_returns_path() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains("Facelink"));
        assert!(path.ends_with("models"));
    }

    #[test]
    fn test_download_invalid_url_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let result = download("http://invalid.nonexistent.example.com/model", &dest);
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
