//! Scheme tags identifying how a persisted document was produced.

use crate::VaultError;

/// Prefix shared by every sealed scheme tag.
pub const MAGIC: &[u8] = b"CENSUS-VAULT/";

/// Protection scheme of a persisted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// No protection; the document is the payload.
    Plain,
    /// AES-256-GCM with an Argon2id passphrase-derived key.
    Aes256GcmArgon2id,
}

impl Scheme {
    /// The full tag line (without the trailing newline) for sealed schemes.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::Aes256GcmArgon2id => Some("CENSUS-VAULT/aes-256-gcm+argon2id/v1"),
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CENSUS-VAULT/aes-256-gcm+argon2id/v1" => Some(Self::Aes256GcmArgon2id),
            _ => None,
        }
    }

    /// Identify the scheme of `document` and return its payload.
    pub fn detect(document: &[u8]) -> Result<(Scheme, &[u8]), VaultError> {
        if !document.starts_with(MAGIC) {
            return Ok((Scheme::Plain, document));
        }

        let newline = document
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(VaultError::Truncated("scheme tag line"))?;
        let tag = String::from_utf8_lossy(&document[..newline]);
        let scheme =
            Self::from_tag(&tag).ok_or_else(|| VaultError::UnknownScheme(tag.to_string()))?;
        Ok((scheme, &document[newline + 1..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_document_is_plain() {
        let (scheme, payload) = Scheme::detect(b"{\"10.0.0.1\": {}}").unwrap();
        assert_eq!(scheme, Scheme::Plain);
        assert_eq!(payload, b"{\"10.0.0.1\": {}}");
    }

    #[test]
    fn tagged_document_splits_after_tag_line() {
        let (scheme, payload) =
            Scheme::detect(b"CENSUS-VAULT/aes-256-gcm+argon2id/v1\n\x01\x02").unwrap();
        assert_eq!(scheme, Scheme::Aes256GcmArgon2id);
        assert_eq!(payload, &[1, 2]);
    }

    #[test]
    fn unknown_tag_rejected() {
        let err = Scheme::detect(b"CENSUS-VAULT/rot13/v0\npayload").unwrap_err();
        assert!(matches!(err, VaultError::UnknownScheme(tag) if tag.contains("rot13")));
    }

    #[test]
    fn missing_tag_terminator_rejected() {
        assert!(matches!(
            Scheme::detect(b"CENSUS-VAULT/aes-256-gcm"),
            Err(VaultError::Truncated(_))
        ));
    }
}
