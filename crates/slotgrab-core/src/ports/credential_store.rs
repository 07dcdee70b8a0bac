//! CredentialStore port - ログイン結果の保存と読み込み

use async_trait::async_trait;

use crate::domain::CredentialSet;
use crate::ports::history::StoreError;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn save(&self, credentials: &CredentialSet) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<CredentialSet>, StoreError>;
}
