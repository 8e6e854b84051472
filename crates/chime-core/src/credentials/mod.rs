//! Credential management
//!
//! Storage of the account identifier, device token and session token, plus
//! the account provisioning and sign-out flows built on top of it.

pub mod device_token;
pub mod store;

pub use device_token::{device_token_from, generate_device_token};
pub use store::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, ACCOUNT_EMAIL, DEVICE_TOKEN,
    SESSION_TOKEN,
};

use tracing::info;

use crate::errors::{ChimeError, Result, StorageError};

// ----------------------------------------------------------------------------
// Credentials Snapshot
// ----------------------------------------------------------------------------

/// Everything stored for the current account; empty strings read as absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub account_id: Option<String>,
    pub device_token: Option<String>,
    pub session_token: Option<String>,
}

impl Credentials {
    /// Read all credential keys from a store
    pub fn load(store: &dyn CredentialStore) -> core::result::Result<Self, StorageError> {
        Ok(Self {
            account_id: read_non_empty(store, ACCOUNT_EMAIL)?,
            device_token: read_non_empty(store, DEVICE_TOKEN)?,
            session_token: read_non_empty(store, SESSION_TOKEN)?,
        })
    }

    /// Account and device token required to open a connection
    pub fn require_login(&self) -> Result<(&str, &str)> {
        let account = self
            .account_id
            .as_deref()
            .ok_or_else(|| ChimeError::missing_credentials(ACCOUNT_EMAIL))?;
        let device = self
            .device_token
            .as_deref()
            .ok_or_else(|| ChimeError::missing_credentials(DEVICE_TOKEN))?;
        Ok((account, device))
    }

    pub fn has_session_token(&self) -> bool {
        self.session_token.is_some()
    }
}

fn read_non_empty(
    store: &dyn CredentialStore,
    key: &str,
) -> core::result::Result<Option<String>, StorageError> {
    Ok(store.get(key)?.filter(|value| !value.is_empty()))
}

// ----------------------------------------------------------------------------
// Provisioning
// ----------------------------------------------------------------------------

/// Store `account_id` and make sure a device token exists for it
///
/// The stored device token is kept when the account is unchanged. Switching
/// to a different account generates a new device token and drops the old
/// account's session token.
pub fn provision_account<G>(
    store: &mut dyn CredentialStore,
    account_id: &str,
    generate: G,
) -> Result<Credentials>
where
    G: FnOnce(&str) -> String,
{
    let account_id = account_id.trim();
    if account_id.is_empty() {
        return Err(ChimeError::invalid_input("account identifier is empty"));
    }

    let current = Credentials::load(store)?;
    let same_account = current.account_id.as_deref() == Some(account_id);

    if same_account && current.device_token.is_some() {
        return Ok(current);
    }

    if !same_account && current.session_token.is_some() {
        store.clear(SESSION_TOKEN)?;
    }

    let device_token = generate(account_id);
    store.set(ACCOUNT_EMAIL, account_id)?;
    store.set(DEVICE_TOKEN, &device_token)?;
    info!(account = account_id, "Provisioned device token");

    Ok(Credentials::load(store)?)
}

/// Remove every stored credential
pub fn sign_out(store: &mut dyn CredentialStore) -> core::result::Result<(), StorageError> {
    store.clear(SESSION_TOKEN)?;
    store.clear(DEVICE_TOKEN)?;
    store.clear(ACCOUNT_EMAIL)?;
    Ok(())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_token(account: &str) -> String {
        format!("dev-{}", account)
    }

    #[test]
    fn test_empty_values_read_as_absent() {
        let store = MemoryCredentialStore::with_entries([
            (ACCOUNT_EMAIL, "alice@example.com"),
            (DEVICE_TOKEN, ""),
            (SESSION_TOKEN, ""),
        ]);
        let creds = Credentials::load(&store).unwrap();
        assert_eq!(creds.device_token, None);
        assert!(!creds.has_session_token());
        assert_eq!(
            creds.require_login(),
            Err(ChimeError::missing_credentials(DEVICE_TOKEN))
        );
    }

    #[test]
    fn test_provision_new_account() {
        let mut store = MemoryCredentialStore::new();
        let creds = provision_account(&mut store, "alice@example.com", fixed_token).unwrap();
        assert_eq!(creds.account_id.as_deref(), Some("alice@example.com"));
        assert_eq!(creds.device_token.as_deref(), Some("dev-alice@example.com"));
        assert_eq!(
            creds.require_login().unwrap(),
            ("alice@example.com", "dev-alice@example.com")
        );
    }

    #[test]
    fn test_provision_keeps_existing_token() {
        let mut store = MemoryCredentialStore::with_entries([
            (ACCOUNT_EMAIL, "alice@example.com"),
            (DEVICE_TOKEN, "original"),
            (SESSION_TOKEN, "sess"),
        ]);
        let creds = provision_account(&mut store, "alice@example.com", |_| {
            panic!("token must not be regenerated")
        })
        .unwrap();
        assert_eq!(creds.device_token.as_deref(), Some("original"));
        assert_eq!(creds.session_token.as_deref(), Some("sess"));
    }

    #[test]
    fn test_provision_account_switch_resets_tokens() {
        let mut store = MemoryCredentialStore::with_entries([
            (ACCOUNT_EMAIL, "alice@example.com"),
            (DEVICE_TOKEN, "original"),
            (SESSION_TOKEN, "sess"),
        ]);
        let creds = provision_account(&mut store, "bob@example.com", fixed_token).unwrap();
        assert_eq!(creds.device_token.as_deref(), Some("dev-bob@example.com"));
        assert_eq!(creds.session_token, None);
    }

    #[test]
    fn test_provision_rejects_empty_account() {
        let mut store = MemoryCredentialStore::new();
        let result = provision_account(&mut store, "   ", fixed_token);
        assert!(matches!(result, Err(ChimeError::InvalidInput { .. })));
    }

    #[test]
    fn test_sign_out_clears_everything() {
        let mut store = MemoryCredentialStore::new();
        provision_account(&mut store, "alice@example.com", fixed_token).unwrap();
        store.set(SESSION_TOKEN, "sess").unwrap();

        sign_out(&mut store).unwrap();
        assert_eq!(Credentials::load(&store).unwrap(), Credentials::default());
    }
}
