//! Account storage and credential hashing.
//!
//! Credentials are salted, iterated HMAC-SHA-256 digests stored as
//! `hex(salt)$hex(digest)`. Accounts live in a flat JSON snapshot that
//! is loaded once at startup and rewritten wholesale after each
//! registration; there is no crash safety across a mid-write failure.

use crate::error::LobbyError;
use hmac::{Hmac, Mac};
use log::{debug, warn};
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;
const ITERATIONS: u32 = 10_000;

/// Derives a digest by feeding the salt through an HMAC keyed with the
/// password, then re-feeding each intermediate digest.
fn derive(password: &str, salt: &[u8]) -> Option<Vec<u8>> {
    let mut block = salt.to_vec();
    for _ in 0..ITERATIONS {
        let Ok(mut mac) = HmacSha256::new_from_slice(password.as_bytes()) else {
            return None;
        };
        mac.update(&block);
        block = mac.finalize().into_bytes().to_vec();
    }
    Some(block)
}

/// Hashes a password with a fresh random salt.
pub fn hash_password(password: &str) -> Option<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = derive(password, &salt)?;
    Some(format!("{}${}", hex::encode(salt), hex::encode(digest)))
}

/// Checks a password against a stored credential. Any malformed
/// credential fails verification rather than erroring out.
pub fn verify_password(credential: &str, password: &str) -> bool {
    let Some((salt_hex, digest_hex)) = credential.split_once('$') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    match derive(password, &salt) {
        Some(digest) => digest == expected,
        None => false,
    }
}

/// Registered accounts, keyed by username.
///
/// Mutation happens in memory under the caller's lock; the caller
/// persists the serialized snapshot after releasing it.
pub struct AccountStore {
    path: PathBuf,
    accounts: HashMap<String, String>,
}

impl AccountStore {
    /// Loads the account snapshot, treating a missing file as an empty
    /// store. A corrupt snapshot is discarded with a warning, matching
    /// the wholesale-rewrite persistence model.
    pub async fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let accounts = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(accounts) => accounts,
                Err(e) => {
                    warn!("Discarding corrupt account file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e),
        };
        debug!("Loaded {} account(s) from {}", accounts.len(), path.display());
        Ok(Self { path, accounts })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            accounts: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates an account with a hashed credential. Fails if the
    /// username is taken; the caller persists afterwards.
    pub fn register(&mut self, username: &str, password: &str) -> Result<(), LobbyError> {
        if self.accounts.contains_key(username) {
            return Err(LobbyError::UsernameTaken);
        }
        let Some(credential) = hash_password(password) else {
            // HMAC accepts keys of any length, so this is unreachable in
            // practice; refuse the registration rather than panic.
            return Err(LobbyError::BadCredential);
        };
        self.accounts.insert(username.to_string(), credential);
        Ok(())
    }

    /// Validates a login attempt. Failure order: unknown user first,
    /// then credential mismatch.
    pub fn verify_login(&self, username: &str, password: &str) -> Result<(), LobbyError> {
        let credential = self.accounts.get(username).ok_or(LobbyError::UnknownUser)?;
        if verify_password(credential, password) {
            Ok(())
        } else {
            Err(LobbyError::BadCredential)
        }
    }

    /// Serializes the full store for wholesale rewrite.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.accounts)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let credential = hash_password("hunter2").unwrap();
        assert!(verify_password(&credential, "hunter2"));
        assert!(!verify_password(&credential, "hunter3"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password(&a, "same"));
        assert!(verify_password(&b, "same"));
    }

    #[test]
    fn test_verify_rejects_malformed_credentials() {
        assert!(!verify_password("", "pw"));
        assert!(!verify_password("nodollar", "pw"));
        assert!(!verify_password("zz$zz", "pw"));
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut store = AccountStore::in_memory();
        store.register("alice", "pw1").unwrap();
        assert_eq!(store.register("alice", "pw2"), Err(LobbyError::UsernameTaken));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_login_failure_order() {
        let mut store = AccountStore::in_memory();
        store.register("alice", "pw1").unwrap();
        assert_eq!(store.verify_login("bob", "pw1"), Err(LobbyError::UnknownUser));
        assert_eq!(
            store.verify_login("alice", "wrong"),
            Err(LobbyError::BadCredential)
        );
        assert!(store.verify_login("alice", "pw1").is_ok());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let path = std::env::temp_dir().join("lobby-auth-test-missing.json");
        let _ = tokio::fs::remove_file(&path).await;
        let store = AccountStore::load(&path).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_persisted_snapshot_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "lobby-auth-test-{}.json",
            std::process::id()
        ));
        let _ = tokio::fs::remove_file(&path).await;

        let mut store = AccountStore::load(&path).await.unwrap();
        store.register("alice", "pw1").unwrap();
        tokio::fs::write(&path, store.to_json().unwrap()).await.unwrap();

        let reloaded = AccountStore::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.verify_login("alice", "pw1").is_ok());

        let _ = tokio::fs::remove_file(&path).await;
    }
}
