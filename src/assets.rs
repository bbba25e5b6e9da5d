//! The pre-built static files that get published to the origin store.
//! The build pipeline owns their contents; we only locate and label them.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("mjs", "text/javascript"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("txt", "text/plain"),
    ("xml", "application/xml"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("wasm", "application/wasm"),
    ("webmanifest", "application/manifest+json"),
];

/// path to a directory of static assets. Only guaranteed to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AssetSource(PathBuf);

impl AssetSource {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(Error::config("asset_path", "Must provide the path to your built static files"));
        }
        Ok(AssetSource(path))
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetObject {
    /// object key in the bucket, always `/` separated.
    pub key: String,
    pub path: PathBuf,
    pub content_type: &'static str,
}

#[derive(Debug, Default)]
pub struct AssetManifest {
    pub objects: Vec<AssetObject>,
}

impl AssetManifest {
    pub fn scan(source: &AssetSource) -> Result<Self> {
        let root = source.path();
        let asset_err = |reason: String| Error::Asset { path: root.display().to_string(), reason };
        if !root.is_dir() {
            return Err(asset_err("not a directory".to_string()));
        }
        let mut objects = vec![];
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|e| asset_err(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(root).map_err(|e| asset_err(e.to_string()))?;
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let content_type = content_type_for(&key);
            debug!(%key, content_type, "found asset");
            objects.push(AssetObject { key, path: entry.path().to_path_buf(), content_type });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(AssetManifest { objects })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.iter().any(|o| o.key == key)
    }
}

pub fn content_type_for(key: &str) -> &'static str {
    let ext = match key.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_CONTENT_TYPE,
    };
    CONTENT_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, ct)| *ct)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_is_a_config_error() {
        assert!(matches!(AssetSource::new(""), Err(Error::Configuration { field, .. }) if field == "asset_path"));
    }

    #[test]
    fn scans_nested_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets/img")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::write(dir.path().join("assets/app.JS"), "x").unwrap();
        std::fs::write(dir.path().join("assets/img/logo.svg"), "<svg/>").unwrap();
        std::fs::write(dir.path().join("LICENSE"), "mit").unwrap();

        let source = AssetSource::new(dir.path()).unwrap();
        let manifest = AssetManifest::scan(&source).unwrap();
        let keys: Vec<&str> = manifest.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["LICENSE", "assets/app.JS", "assets/img/logo.svg", "index.html"]);
        let types: Vec<&str> = manifest.objects.iter().map(|o| o.content_type).collect();
        assert_eq!(types, [DEFAULT_CONTENT_TYPE, "text/javascript", "image/svg+xml", "text/html"]);
        assert!(manifest.contains("index.html"));
    }

    #[test]
    fn missing_directory_fails() {
        let source = AssetSource::new("/definitely/not/here/dist").unwrap();
        assert!(matches!(AssetManifest::scan(&source), Err(Error::Asset { .. })));
    }
}
