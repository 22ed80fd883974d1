//! Passphrase key derivation.
//!
//! Keys are derived with Argon2id over a per-document random salt, so the
//! same passphrase never produces the same key twice.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::VaultError;

pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 16;

const ARGON2_MEMORY_KIB: u32 = 19 * 1024;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;

/// Derive a 256-bit key from `passphrase` and `salt` using Argon2id.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], VaultError> {
    if passphrase.is_empty() {
        return Err(VaultError::EmptyPassphrase);
    }

    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(KEY_LEN),
    )
    .map_err(|e| VaultError::Kdf(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| VaultError::Kdf(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_key() {
        let salt = [7u8; SALT_LEN];
        assert_eq!(
            derive_key("correct horse", &salt).unwrap(),
            derive_key("correct horse", &salt).unwrap()
        );
    }

    #[test]
    fn salt_changes_key() {
        let a = derive_key("correct horse", &[1u8; SALT_LEN]).unwrap();
        let b = derive_key("correct horse", &[2u8; SALT_LEN]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_passphrase_rejected() {
        assert!(matches!(
            derive_key("", &[0u8; SALT_LEN]),
            Err(VaultError::EmptyPassphrase)
        ));
    }
}
