//! Account credential records and the JSON accounts file
//!
//! The accounts file is the single durable record of the credential set and
//! its runtime counters. It is read once at startup and written explicitly
//! (shutdown, reload). All writes use atomic temp-file + rename so a crash
//! mid-write cannot corrupt it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

fn default_true() -> bool {
    true
}

fn default_max_requests() -> u32 {
    50
}

/// One Telegram account credential with its scheduling state.
///
/// Timestamps are unix seconds. `flood_wait_until` of zero means no active
/// flood-wait window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Stable identifier used in logs, status and the admin API
    pub name: String,
    /// Telegram API application id
    pub api_id: i32,
    /// Telegram API application hash
    pub api_hash: String,
    /// Phone number the account is registered under
    pub phone: String,
    /// Session reference understood by the bridge
    pub session: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_requests")]
    pub max_requests_per_hour: u32,
    #[serde(default)]
    pub current_requests: u32,
    #[serde(default)]
    pub last_reset: u64,
    #[serde(default)]
    pub last_used: u64,
    #[serde(default)]
    pub errors_count: u32,
    #[serde(default)]
    pub flood_wait_until: u64,
    #[serde(default)]
    pub in_use: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileFormat {
    accounts: Vec<AccountConfig>,
}

/// Accounts file manager.
pub struct AccountsFile {
    path: PathBuf,
}

impl AccountsFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the account set from disk.
    ///
    /// A missing file is created with a single disabled placeholder account
    /// so the operator has the shape to fill in. `in_use` is forced to false
    /// on every load: a crashed process must not strand credentials busy.
    pub async fn load(&self) -> Result<Vec<AccountConfig>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "accounts file not found, writing template");
            let template = vec![template_account()];
            write_atomic(&self.path, &template).await?;
            return Ok(template);
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Io(format!("reading accounts file: {e}")))?;
        let parsed: FileFormat = serde_json::from_str(&contents)
            .map_err(|e| Error::Parse(format!("parsing accounts file: {e}")))?;

        let mut accounts = parsed.accounts;
        for acct in &mut accounts {
            acct.in_use = false;
        }
        info!(path = %self.path.display(), accounts = accounts.len(), "loaded accounts");
        Ok(accounts)
    }

    /// Persist the given account set atomically.
    pub async fn save(&self, accounts: &[AccountConfig]) -> Result<()> {
        write_atomic(&self.path, accounts).await
    }
}

fn template_account() -> AccountConfig {
    AccountConfig {
        name: "example".into(),
        api_id: 0,
        api_hash: "fill-me-in".into(),
        phone: "+10000000000".into(),
        session: "example.session".into(),
        enabled: false,
        max_requests_per_hour: default_max_requests(),
        current_requests: 0,
        last_reset: 0,
        last_used: 0,
        errors_count: 0,
        flood_wait_until: 0,
        in_use: false,
    }
}

/// Write the account set to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Permissions are 0600 since the file holds api hashes and
/// session references.
async fn write_atomic(path: &Path, accounts: &[AccountConfig]) -> Result<()> {
    let file = FileFormat {
        accounts: accounts.to_vec(),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| Error::Parse(format!("serializing accounts: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("accounts path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".accounts.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp accounts file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting accounts file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp accounts file: {e}")))?;

    debug!(path = %path.display(), "persisted accounts");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_account(name: &str) -> AccountConfig {
        AccountConfig {
            name: name.into(),
            api_id: 12345,
            api_hash: format!("hash_{name}"),
            phone: "+15550001111".into(),
            session: format!("{name}.session"),
            enabled: true,
            max_requests_per_hour: 50,
            current_requests: 0,
            last_reset: 0,
            last_used: 0,
            errors_count: 0,
            flood_wait_until: 0,
            in_use: false,
        }
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = AccountsFile::new(dir.path().join("accounts.json"));

        let mut acct = test_account("acct1");
        acct.enabled = false;
        acct.current_requests = 17;
        acct.errors_count = 3;
        acct.flood_wait_until = 1_900_000_000;
        file.save(&[acct]).await.unwrap();

        let loaded = file.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "acct1");
        assert!(!loaded[0].enabled);
        assert_eq!(loaded[0].current_requests, 17);
        assert_eq!(loaded[0].errors_count, 3);
        assert_eq!(loaded[0].flood_wait_until, 1_900_000_000);
        assert_eq!(loaded[0].api_hash, "hash_acct1");
    }

    #[tokio::test]
    async fn missing_file_creates_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let file = AccountsFile::new(path.clone());

        assert!(!path.exists());
        let accounts = file.load().await.unwrap();
        assert!(path.exists());
        assert_eq!(accounts.len(), 1);
        assert!(
            !accounts[0].enabled,
            "template account must not be selectable"
        );
    }

    #[tokio::test]
    async fn in_use_cleared_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = AccountsFile::new(dir.path().join("accounts.json"));

        let mut acct = test_account("busy");
        acct.in_use = true;
        file.save(&[acct]).await.unwrap();

        let loaded = file.load().await.unwrap();
        assert!(!loaded[0].in_use, "stale in_use must not survive a restart");
    }

    #[tokio::test]
    async fn defaults_fill_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        tokio::fs::write(
            &path,
            r#"{"accounts":[{"name":"bare","api_id":1,"api_hash":"h","phone":"+15550001111","session":"bare.session"}]}"#,
        )
        .await
        .unwrap();

        let loaded = AccountsFile::new(path).load().await.unwrap();
        assert!(loaded[0].enabled);
        assert_eq!(loaded[0].max_requests_per_hour, 50);
        assert_eq!(loaded[0].current_requests, 0);
        assert_eq!(loaded[0].flood_wait_until, 0);
    }

    #[tokio::test]
    async fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = AccountsFile::new(path).load().await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        let file = AccountsFile::new(path.clone());
        file.save(&[test_account("acct1")]).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "accounts file must be 0600, got {mode:o}");
    }
}
