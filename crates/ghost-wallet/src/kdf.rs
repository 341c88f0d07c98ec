//! Password-based key derivation.
//!
//! Two PBKDF2-HMAC-SHA256 derivations run over the same password and salt:
//! a cheaper one producing the usable [`EncryptionKey`], and a much more
//! expensive one producing a verifier that is persisted next to the salt.
//! The verifier confirms a password without storing the password or the key.
//!
//! # Persisted layout
//! ```text
//! salt              -> hex(random salt)
//! password_verifier -> hex(PBKDF2(password, salt, verifier_iterations))
//! ```
//! Both entries are written in one store call and read together.

use ghost_core::constants::{
    DEFAULT_KEY_ITERATIONS, DEFAULT_SALT_LEN, DEFAULT_VERIFIER_ITERATIONS, ENCRYPTION_KEY_LEN,
    MIN_SALT_LEN, STORE_KEY_PASSWORD_VERIFIER, STORE_KEY_SALT,
};
use ghost_core::traits::KeyValueStore;
use ghost_core::types::EncryptionKey;
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::WalletError;

/// Iteration counts and salt size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Rounds for the usable encryption key.
    pub key_iterations: u32,
    /// Rounds for the stored verifier.
    pub verifier_iterations: u32,
    /// Salt length in bytes.
    pub salt_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            key_iterations: DEFAULT_KEY_ITERATIONS,
            verifier_iterations: DEFAULT_VERIFIER_ITERATIONS,
            salt_len: DEFAULT_SALT_LEN,
        }
    }
}

impl KdfParams {
    /// Reject parameters that would let the verifier stand in for the key.
    pub fn validate(&self) -> Result<(), WalletError> {
        if self.key_iterations == 0 {
            return Err(WalletError::InvalidConfig(
                "key_iterations must be positive".into(),
            ));
        }
        if self.verifier_iterations == self.key_iterations {
            return Err(WalletError::InvalidConfig(
                "verifier_iterations must differ from key_iterations".into(),
            ));
        }
        if self.salt_len < MIN_SALT_LEN {
            return Err(WalletError::InvalidConfig(format!(
                "salt_len must be at least {MIN_SALT_LEN} bytes"
            )));
        }
        Ok(())
    }
}

/// PBKDF2-HMAC-SHA256 with a 32-byte output.
pub fn derive_key(password: &[u8], salt: &[u8], rounds: u32) -> [u8; ENCRYPTION_KEY_LEN] {
    let mut out = [0u8; ENCRYPTION_KEY_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, rounds, &mut out);
    out
}

/// Derive the usable key and the verifier from one (password, salt) pair.
pub fn derive_pair(
    password: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> (EncryptionKey, Zeroizing<[u8; ENCRYPTION_KEY_LEN]>) {
    let key = EncryptionKey::from_bytes(derive_key(password, salt, params.key_iterations));
    let verifier = Zeroizing::new(derive_key(password, salt, params.verifier_iterations));
    (key, verifier)
}

/// Run both derivations off the async executor.
async fn derive_pair_blocking(
    password: &str,
    salt: Vec<u8>,
    params: &KdfParams,
) -> Result<(EncryptionKey, Zeroizing<[u8; ENCRYPTION_KEY_LEN]>), WalletError> {
    let password = Zeroizing::new(password.as_bytes().to_vec());
    let params = params.clone();
    tokio::task::spawn_blocking(move || derive_pair(&password, &salt, &params))
        .await
        .map_err(|e| WalletError::KeyDerivation(e.to_string()))
}

/// Key and verifier derived for a new password, not yet persisted.
pub struct PendingCredentials {
    key: EncryptionKey,
    salt_hex: String,
    verifier_hex: Zeroizing<String>,
}

impl PendingCredentials {
    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    /// Write salt and verifier together with `extra` entries in one store
    /// call, replacing any previous pair. Returns the key.
    pub fn persist(
        self,
        store: &dyn KeyValueStore,
        extra: &[(&str, &str)],
    ) -> Result<EncryptionKey, WalletError> {
        let mut entries = vec![
            (STORE_KEY_SALT, self.salt_hex.as_str()),
            (STORE_KEY_PASSWORD_VERIFIER, self.verifier_hex.as_str()),
        ];
        entries.extend_from_slice(extra);
        store.set_many(&entries)?;
        debug!(entries = entries.len(), "stored password salt and verifier");
        Ok(self.key.clone())
    }
}

/// Derive a key and verifier from a new password with a fresh salt.
///
/// Nothing is written; see [`PendingCredentials::persist`].
pub async fn derive_new(
    params: &KdfParams,
    password: &str,
) -> Result<PendingCredentials, WalletError> {
    params.validate()?;
    let salt = random_salt(params.salt_len);
    let (key, verifier) = derive_pair_blocking(password, salt.clone(), params).await?;
    Ok(PendingCredentials {
        key,
        salt_hex: hex::encode(&salt),
        verifier_hex: Zeroizing::new(hex::encode(verifier.as_ref())),
    })
}

/// Derive a key from a new password with a fresh salt, persist the salt and
/// verifier (replacing any previous pair) and return the key.
pub async fn derive_and_store(
    store: &dyn KeyValueStore,
    params: &KdfParams,
    password: &str,
) -> Result<EncryptionKey, WalletError> {
    derive_new(params, password).await?.persist(store, &[])
}

/// Re-derive the key for an existing password.
///
/// Fails with [`WalletError::MissingCredentials`] when the salt or the
/// verifier is absent and with [`WalletError::IncorrectPassword`] when the
/// recomputed verifier differs. The comparison is constant-time.
pub async fn derive_and_verify(
    store: &dyn KeyValueStore,
    params: &KdfParams,
    password: &str,
) -> Result<EncryptionKey, WalletError> {
    let salt_hex = store.get(STORE_KEY_SALT)?;
    let verifier_hex = store.get(STORE_KEY_PASSWORD_VERIFIER)?;
    let (Some(salt_hex), Some(verifier_hex)) = (salt_hex, verifier_hex) else {
        return Err(WalletError::MissingCredentials);
    };

    let salt = hex::decode(&salt_hex)
        .map_err(|e| WalletError::CorruptedCredentials(format!("salt: {e}")))?;
    if salt.len() < MIN_SALT_LEN {
        return Err(WalletError::CorruptedCredentials(format!(
            "salt too short: {} < {MIN_SALT_LEN}",
            salt.len()
        )));
    }
    let stored = Zeroizing::new(
        hex::decode(&verifier_hex)
            .map_err(|e| WalletError::CorruptedCredentials(format!("verifier: {e}")))?,
    );

    let (key, verifier) = derive_pair_blocking(password, salt, params).await?;
    if bool::from(verifier.as_slice().ct_eq(stored.as_slice())) {
        Ok(key)
    } else {
        Err(WalletError::IncorrectPassword)
    }
}

fn random_salt(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut salt = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    /// Cheap parameters so tests stay fast.
    fn fast() -> KdfParams {
        KdfParams {
            key_iterations: 10,
            verifier_iterations: 100,
            salt_len: 16,
        }
    }

    #[tokio::test]
    async fn store_then_verify_returns_same_key() {
        let store = MemoryStore::new();
        let key = derive_and_store(&store, &fast(), "Secret123!").await.unwrap();
        let again = derive_and_verify(&store, &fast(), "Secret123!").await.unwrap();
        assert_eq!(key, again);
    }

    #[tokio::test]
    async fn wrong_password_fails() {
        let store = MemoryStore::new();
        derive_and_store(&store, &fast(), "correct").await.unwrap();
        let err = derive_and_verify(&store, &fast(), "wrong").await.unwrap_err();
        assert_eq!(err, WalletError::IncorrectPassword);
    }

    #[tokio::test]
    async fn verify_without_store_is_missing_credentials() {
        let store = MemoryStore::new();
        let err = derive_and_verify(&store, &fast(), "anything").await.unwrap_err();
        assert_eq!(err, WalletError::MissingCredentials);
    }

    #[tokio::test]
    async fn half_stored_credentials_are_missing_not_incorrect() {
        let store = MemoryStore::new();
        derive_and_store(&store, &fast(), "pw").await.unwrap();
        store.remove(STORE_KEY_PASSWORD_VERIFIER).unwrap();
        let err = derive_and_verify(&store, &fast(), "pw").await.unwrap_err();
        assert_eq!(err, WalletError::MissingCredentials);

        let store = MemoryStore::new();
        derive_and_store(&store, &fast(), "pw").await.unwrap();
        store.remove(STORE_KEY_SALT).unwrap();
        let err = derive_and_verify(&store, &fast(), "pw").await.unwrap_err();
        assert_eq!(err, WalletError::MissingCredentials);
    }

    #[tokio::test]
    async fn corrupted_salt_is_reported() {
        let store = MemoryStore::new();
        derive_and_store(&store, &fast(), "pw").await.unwrap();
        store.set(STORE_KEY_SALT, "not-hex").unwrap();
        let err = derive_and_verify(&store, &fast(), "pw").await.unwrap_err();
        assert!(matches!(err, WalletError::CorruptedCredentials(_)));
    }

    #[tokio::test]
    async fn restore_overwrites_previous_salt() {
        let store = MemoryStore::new();
        derive_and_store(&store, &fast(), "first").await.unwrap();
        let salt1 = store.get(STORE_KEY_SALT).unwrap().unwrap();
        derive_and_store(&store, &fast(), "second").await.unwrap();
        let salt2 = store.get(STORE_KEY_SALT).unwrap().unwrap();
        assert_ne!(salt1, salt2);
        assert_eq!(
            derive_and_verify(&store, &fast(), "first").await.unwrap_err(),
            WalletError::IncorrectPassword
        );
        assert!(derive_and_verify(&store, &fast(), "second").await.is_ok());
    }

    #[tokio::test]
    async fn stored_salt_has_configured_length() {
        let store = MemoryStore::new();
        let params = KdfParams {
            salt_len: 32,
            ..fast()
        };
        derive_and_store(&store, &params, "pw").await.unwrap();
        let salt = hex::decode(store.get(STORE_KEY_SALT).unwrap().unwrap()).unwrap();
        assert_eq!(salt.len(), 32);
    }

    #[tokio::test]
    async fn derive_new_writes_nothing_until_persisted() {
        let store = MemoryStore::new();
        let pending = derive_new(&fast(), "pw").await.unwrap();
        assert!(store.is_empty());

        let key = pending.persist(&store, &[("wallet_id", "w1")]).unwrap();
        assert_eq!(store.get("wallet_id").unwrap().as_deref(), Some("w1"));
        assert_eq!(derive_and_verify(&store, &fast(), "pw").await.unwrap(), key);
    }

    #[test]
    fn verifier_differs_from_key() {
        let (key, verifier) = derive_pair(b"password", &[7u8; 16], &fast());
        assert_ne!(key.as_bytes(), &*verifier);
    }

    #[test]
    fn params_validation() {
        assert!(KdfParams::default().validate().is_ok());
        let same = KdfParams {
            key_iterations: 5,
            verifier_iterations: 5,
            salt_len: 16,
        };
        assert!(matches!(same.validate(), Err(WalletError::InvalidConfig(_))));
        let short_salt = KdfParams {
            salt_len: 8,
            ..fast()
        };
        assert!(short_salt.validate().is_err());
    }

    #[test]
    fn known_pbkdf2_vector() {
        // RFC 7914 section 11, PBKDF2-HMAC-SHA256 with 1 round.
        let out = derive_key(b"passwd", b"salt", 1);
        assert_eq!(
            hex::encode(out),
            "55ac046e56e3089fec1691c22544b605f94185216dde0465e68b9d57c20dacbc"
        );
    }

    proptest! {
        #[test]
        fn distinct_passwords_give_distinct_verifiers(
            a in "[a-zA-Z0-9!]{1,24}",
            b in "[a-zA-Z0-9!]{1,24}",
        ) {
            prop_assume!(a != b);
            let salt = [3u8; 16];
            let (key_a, ver_a) = derive_pair(a.as_bytes(), &salt, &fast());
            let (key_b, ver_b) = derive_pair(b.as_bytes(), &salt, &fast());
            prop_assert_ne!(key_a, key_b);
            prop_assert_ne!(*ver_a, *ver_b);
        }

        #[test]
        fn derivation_is_deterministic(pw in "[ -~]{0,32}") {
            let salt = [9u8; 16];
            let (k1, v1) = derive_pair(pw.as_bytes(), &salt, &fast());
            let (k2, v2) = derive_pair(pw.as_bytes(), &salt, &fast());
            prop_assert_eq!(k1, k2);
            prop_assert_eq!(*v1, *v2);
        }
    }
}
