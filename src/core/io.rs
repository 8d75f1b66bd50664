use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Where exported scripts and voice-over clips are written.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Filesystem storage rooted at a folder.
pub struct NativeStorage {
    root: PathBuf,
}

impl NativeStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl Storage for NativeStorage {
    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(full, content).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }
}

/// First of `stem.ext`, `stem (2).ext`, `stem (3).ext`, ... that does not exist yet.
pub async fn unused_path(storage: &dyn Storage, stem: &str, ext: &str) -> Result<String> {
    let first = format!("{}.{}", stem, ext);
    if !storage.exists(&first).await? {
        return Ok(first);
    }
    for n in 2..=MAX_NAME_ATTEMPTS {
        let candidate = format!("{} ({}).{}", stem, n, ext);
        if !storage.exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    anyhow::bail!("Too many existing files named {}", first)
}

/// Turns a user-entered title into a safe file stem.
pub fn file_stem_for(title: &str, fallback: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim().to_string();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}
