//! Device token derivation
//!
//! A device token identifies one installation of the client for one account.
//! It is the SHA-256 digest of the host machine id followed by the account
//! identifier, hex encoded.

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Files consulted for the host machine id, in order
const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Derive a device token from raw machine id bytes and an account identifier
pub fn device_token_from(machine_id: &[u8], account_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(machine_id);
    hasher.update(account_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate the device token for `account_id` on this host
///
/// Falls back to random bytes when no machine id can be read. The result is
/// then only stable because the caller stores it once per account.
pub fn generate_device_token(account_id: &str) -> String {
    let machine_id = read_machine_id().unwrap_or_else(|| {
        warn!("No readable machine id; device token will be random");
        uuid::Uuid::new_v4().as_bytes().to_vec()
    });
    device_token_from(&machine_id, account_id)
}

fn read_machine_id() -> Option<Vec<u8>> {
    MACHINE_ID_PATHS.iter().find_map(|path| {
        let contents = std::fs::read_to_string(path).ok()?;
        match hex::decode(contents.trim()) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            _ => {
                debug!(path, "Ignoring malformed machine id");
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MACHINE: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

    #[test]
    fn test_device_token_is_deterministic() {
        let a = device_token_from(&MACHINE, "alice@example.com");
        let b = device_token_from(&MACHINE, "alice@example.com");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_device_token_differs_between_accounts_and_machines() {
        let alice = device_token_from(&MACHINE, "alice@example.com");
        let bob = device_token_from(&MACHINE, "bob@example.com");
        let other_host = device_token_from(&[1, 2, 3, 4], "alice@example.com");
        assert_ne!(alice, bob);
        assert_ne!(alice, other_host);
    }

    #[test]
    fn test_generate_device_token_shape() {
        let token = generate_device_token("alice@example.com");
        assert_eq!(token.len(), 64);
    }
}
