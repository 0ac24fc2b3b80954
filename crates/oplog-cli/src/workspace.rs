//! On-disk layout used by the CLI:
//!
//! ```text
//! <root>/blocks/       content-addressed block store
//! <root>/keys/<id>.key hex-encoded ed25519 secret per identity
//! <root>/oplog.toml    optional LogConfig overrides
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};

use oplog_core::{AllowAll, LogConfig, LogContext};
use oplog_crypto::{Ed25519IdentityProvider, Identity, IdentityOptions, IdentityProvider, SigningKey};
use oplog_store::{BlockStore, FileBlockStore};
use oplog_types::IdentityId;

const CONFIG_FILE: &str = "oplog.toml";

/// Identity used by read-only commands; it never signs anything.
const READER_ID: &str = "reader";

pub struct Workspace {
    root: PathBuf,
    store: Arc<dyn BlockStore>,
    provider: Arc<Ed25519IdentityProvider>,
    config: LogConfig,
}

impl Workspace {
    pub fn open(root: impl AsRef<Path>, concurrency: Option<usize>) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let store = FileBlockStore::open(root.join("blocks"))
            .with_context(|| format!("opening block store under {}", root.display()))?;

        let config_path = root.join(CONFIG_FILE);
        let mut config = if config_path.exists() {
            LogConfig::load(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?
        } else {
            LogConfig::default()
        };
        if let Some(n) = concurrency {
            config.fetch_concurrency = n;
        }
        config.validate()?;

        tracing::debug!(root = %root.display(), concurrency = config.fetch_concurrency, "opened workspace");
        Ok(Self {
            root,
            store: Arc::new(store),
            provider: Arc::new(Ed25519IdentityProvider::new()),
            config,
        })
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn key_path(&self, id: &str) -> PathBuf {
        self.root.join("keys").join(format!("{id}.key"))
    }

    /// Generate and persist a key for `id`.
    pub fn create_identity(&self, id: &str, force: bool) -> anyhow::Result<Identity> {
        let id = IdentityId::new(id)?;
        let path = self.key_path(id.as_str());
        if path.exists() && !force {
            bail!("identity '{id}' already exists (use --force to replace it)");
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let key = SigningKey::generate();
        fs::write(&path, hex::encode(key.as_bytes()))
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(self.provider.import_secret(id, *key.as_bytes()))
    }

    /// Load a persisted key and register it with the provider.
    pub fn identity(&self, id: &str) -> anyhow::Result<Identity> {
        let path = self.key_path(id);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("unknown identity '{id}' (no key at {})", path.display()))?;
        let bytes = hex::decode(text.trim()).context("key file is not valid hex")?;
        let secret: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("key file for '{id}' must hold 32 bytes"))?;
        let identity = self
            .provider
            .create_identity(&IdentityOptions::new(id).with_secret(secret))?;
        Ok(identity)
    }

    /// Context for a writer whose key is on disk.
    pub fn context(&self, id: &str) -> anyhow::Result<LogContext> {
        let identity = self.identity(id)?;
        Ok(self.context_for(identity))
    }

    /// Context with a throwaway in-memory identity, for commands that only read.
    pub fn reader_context(&self) -> anyhow::Result<LogContext> {
        let identity = self
            .provider
            .create_identity(&IdentityOptions::new(READER_ID))?;
        Ok(self.context_for(identity))
    }

    fn context_for(&self, identity: Identity) -> LogContext {
        let provider: Arc<dyn IdentityProvider> = self.provider.clone();
        LogContext::new(self.store.clone(), Arc::new(AllowAll), identity, provider)
            .with_config(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let created = {
            let ws = Workspace::open(dir.path(), None).unwrap();
            ws.create_identity("alice", false).unwrap()
        };
        let ws = Workspace::open(dir.path(), None).unwrap();
        let loaded = ws.identity("alice").unwrap();
        assert_eq!(loaded.public_key, created.public_key);
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path(), None).unwrap();
        let first = ws.create_identity("bob", false).unwrap();
        assert!(ws.create_identity("bob", false).is_err());
        let second = ws.create_identity("bob", true).unwrap();
        assert_ne!(first.public_key, second.public_key);
    }

    #[test]
    fn unknown_identity_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path(), None).unwrap();
        assert!(ws.identity("nobody").is_err());
    }

    #[test]
    fn concurrency_flag_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "fetch_concurrency = 4\n").unwrap();
        let ws = Workspace::open(dir.path(), None).unwrap();
        assert_eq!(ws.config().fetch_concurrency, 4);
        let ws = Workspace::open(dir.path(), Some(9)).unwrap();
        assert_eq!(ws.config().fetch_concurrency, 9);
        assert!(Workspace::open(dir.path(), Some(0)).is_err());
    }
}
