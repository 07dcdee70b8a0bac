//! CookieFile - ログインで得た cookie を JSON 配列で保存する
//!
//! 形式: `[{"name": "...", "value": "...", "domain": "...", "path": "/"}, ...]`

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::domain::{Credential, CredentialSet};
use crate::ports::{CredentialStore, StoreError};

pub struct CookieFile {
    path: PathBuf,
}

impl CookieFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for CookieFile {
    async fn save(&self, credentials: &CredentialSet) -> Result<(), StoreError> {
        let list: Vec<&Credential> = credentials.iter().collect();
        let json = serde_json::to_vec_pretty(&list)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        // 一時ファイルに書いてから rename で置き換える
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn load(&self) -> Result<Option<CredentialSet>, StoreError> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let list: Vec<Credential> = serde_json::from_slice(&raw)?;
        Ok(Some(list.into_iter().collect()))
    }
}
