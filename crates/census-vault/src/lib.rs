//! Census Vault: authenticated encryption for output documents.
//!
//! A sealed document is a scheme tag line followed by the binary payload:
//!
//! ```text
//! CENSUS-VAULT/aes-256-gcm+argon2id/v1\n
//! salt (16 bytes) | nonce (12 bytes) | ciphertext and GCM tag
//! ```
//!
//! Readers call [`open`], which selects the decryption path from the tag.
//! Documents without the `CENSUS-VAULT/` magic are returned as-is.
//!
//! ```no_run
//! let sealed = census_vault::seal(b"{}", "passphrase").unwrap();
//! let plain = census_vault::open(&sealed, Some("passphrase")).unwrap();
//! assert_eq!(plain, b"{}");
//! ```

pub mod kdf;
pub mod scheme;

use std::fs;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

pub use scheme::Scheme;

const NONCE_LEN: usize = 12;

/// Errors from sealing or opening a document.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("Unknown vault scheme: {0}")]
    UnknownScheme(String),

    #[error("Sealed document truncated in {0}")]
    Truncated(&'static str),

    #[error("Key derivation failed: {0}")]
    Kdf(String),

    #[error("Passphrase must not be empty")]
    EmptyPassphrase,

    #[error("Document is sealed but no passphrase was supplied")]
    MissingPassphrase,

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed: wrong passphrase or tampered document")]
    Decrypt,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encrypt `plaintext` under `passphrase` and prepend the scheme tag.
pub fn seal(plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>, VaultError> {
    let mut rng = rand::rng();
    let mut salt = [0u8; kdf::SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce);

    let key = kdf::derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| VaultError::Encrypt)?;

    let tag = Scheme::Aes256GcmArgon2id
        .tag()
        .ok_or(VaultError::Encrypt)?;
    let mut out = Vec::with_capacity(tag.len() + 1 + salt.len() + nonce.len() + ciphertext.len());
    out.extend_from_slice(tag.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);

    tracing::debug!(
        plaintext_bytes = plaintext.len(),
        sealed_bytes = out.len(),
        "Document sealed"
    );
    Ok(out)
}

/// Return the plaintext of `document`, decrypting when it carries a sealed
/// scheme tag.
pub fn open(document: &[u8], passphrase: Option<&str>) -> Result<Vec<u8>, VaultError> {
    let (scheme, payload) = Scheme::detect(document)?;
    match scheme {
        Scheme::Plain => Ok(payload.to_vec()),
        Scheme::Aes256GcmArgon2id => {
            let passphrase = passphrase.ok_or(VaultError::MissingPassphrase)?;
            open_aes_gcm(payload, passphrase)
        }
    }
}

fn open_aes_gcm(payload: &[u8], passphrase: &str) -> Result<Vec<u8>, VaultError> {
    if payload.len() < kdf::SALT_LEN + NONCE_LEN {
        return Err(VaultError::Truncated("salt and nonce"));
    }
    let (salt, rest) = payload.split_at(kdf::SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = kdf::derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::Decrypt)
}

/// Seal `plaintext` and write it to `path`, creating parent directories.
pub fn seal_to_file(path: &Path, plaintext: &[u8], passphrase: &str) -> Result<(), VaultError> {
    let sealed = seal(plaintext, passphrase)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, sealed)?;
    tracing::info!(path = %path.display(), "Sealed document written");
    Ok(())
}

/// Read `path` and return its plaintext.
pub fn open_file(path: &Path, passphrase: Option<&str>) -> Result<Vec<u8>, VaultError> {
    let document = fs::read(path)?;
    open(&document, passphrase)
}
