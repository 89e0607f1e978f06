//! Vault password handling and unlock sessions.
//!
//! The password hash lives in the runtime settings row; unlock sessions are
//! in-process state, which is sound because a single backend instance owns
//! the data plane.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::Argon2;
use argon2::password_hash::{
    Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    rand_core::OsRng,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use teledrive_core::{DriveError, DriveResult, Item, RuntimeSettings, SettingsPatch};
use teledrive_data::SettingsStore;
use tokio::sync::RwLock;
use tracing::info;

const TOKEN_LENGTH: usize = 32;

/// Vault unlock flow backed by the settings singleton.
#[derive(Clone)]
pub struct VaultService {
    settings: SettingsStore,
    defaults: RuntimeSettings,
    sessions: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl VaultService {
    /// Construct the service over the settings repository.
    #[must_use]
    pub fn new(settings: SettingsStore, defaults: RuntimeSettings) -> Self {
        Self {
            settings,
            defaults,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Hash and store a new vault password, revoking every open session.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] for an empty password and the
    /// settings repository errors otherwise.
    pub async fn set_password(&self, plain: &str, now: DateTime<Utc>) -> DriveResult<()> {
        if plain.trim().is_empty() {
            return Err(DriveError::bad_input("vault password must not be empty"));
        }
        let hash = hash_secret(plain)?;
        self.settings
            .update(
                SettingsPatch {
                    vault_password_hash: Some(hash),
                    ..SettingsPatch::default()
                },
                &self.defaults,
                now,
            )
            .await?;
        self.sessions.write().await.clear();
        info!("vault password updated; open sessions revoked");
        Ok(())
    }

    /// Verify the password and mint an unlock token.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Forbidden`] when no password is set or the
    /// candidate does not match.
    pub async fn unlock(&self, plain: &str, now: DateTime<Utc>) -> DriveResult<String> {
        let settings = self.settings.get_or_init(&self.defaults).await?;
        let Some(hash) = settings.vault_password_hash.as_deref() else {
            return Err(DriveError::forbidden("vault password has not been set"));
        };
        if !verify_secret(hash, plain)? {
            return Err(DriveError::forbidden("vault password mismatch"));
        }
        let token = generate_token(TOKEN_LENGTH);
        let expires_at = now + Duration::minutes(i64::from(settings.vault_session_ttl_minutes));
        self.sessions.write().await.insert(token.clone(), expires_at);
        Ok(token)
    }

    /// Whether a token names a live unlock session, pruning expired ones.
    pub async fn is_unlocked(&self, token: &str, now: DateTime<Utc>) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, expires_at| *expires_at > now);
        sessions.contains_key(token)
    }

    /// Revoke one unlock session.
    pub async fn lock(&self, token: &str) {
        self.sessions.write().await.remove(token);
    }

    /// Gate a read of `item`: vault items need a live unlock session.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Forbidden`] when the item is vault-flagged and
    /// the token is absent or expired.
    pub async fn authorize_read(
        &self,
        item: &Item,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> DriveResult<()> {
        if !item.in_vault {
            return Ok(());
        }
        match token {
            Some(token) if self.is_unlocked(token, now).await => Ok(()),
            _ => Err(DriveError::forbidden(
                "vault items require an unlocked session",
            )),
        }
    }
}

fn generate_token(length: usize) -> String {
    let mut rng = rand::rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

fn hash_secret(input: &str) -> DriveResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon = Argon2::default();
    let hash = argon
        .hash_password(input.as_bytes(), &salt)
        .map_err(|err| DriveError::Permanent {
            operation: "vault.hash_password",
            source: err.to_string().into(),
        })?;
    Ok(hash.to_string())
}

fn verify_secret(expected_hash: &str, candidate: &str) -> DriveResult<bool> {
    let parsed = PasswordHash::new(expected_hash).map_err(|err| DriveError::Permanent {
        operation: "vault.parse_hash",
        source: err.to_string().into(),
    })?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(PasswordHashError::Password) => Ok(false),
        Err(err) => Err(DriveError::Permanent {
            operation: "vault.verify_password",
            source: err.to_string().into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trips_and_rejects_wrong_password() {
        let hash = hash_secret("correct horse").expect("hashing must succeed");
        assert!(verify_secret(&hash, "correct horse").expect("verify must succeed"));
        assert!(!verify_secret(&hash, "battery staple").expect("verify must succeed"));
    }

    #[test]
    fn tokens_are_alphanumeric_and_distinct() {
        let first = generate_token(TOKEN_LENGTH);
        let second = generate_token(TOKEN_LENGTH);
        assert_eq!(first.len(), TOKEN_LENGTH);
        assert_ne!(first, second);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
