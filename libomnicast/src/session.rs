//! Session material codec
//!
//! Adapters hand over sessions as JSON; the cipher turns them into opaque
//! base64 blobs (age passphrase encryption) for the database and back. The
//! blob layout is an implementation detail of this module; nothing else
//! inspects it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, Secret};
use std::io::{Read, Write};

use crate::config::Config;
use crate::error::{CodecError, Result};

/// Platform session material in its decoded form.
///
/// Each adapter defines its own JSON shape; this type only guarantees the
/// value is valid JSON and round-trips through the cipher unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData(serde_json::Value);

impl SessionData {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let value = serde_json::from_str(s)
            .map_err(|e| CodecError::Corrupt(format!("invalid session JSON: {}", e)))?;
        Ok(Self(value))
    }

    pub fn to_json_string(&self) -> String {
        self.0.to_string()
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// String field lookup, tolerant of missing keys
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(|v| v.as_i64())
    }
}

/// Encrypts and decrypts session blobs with a passphrase.
///
/// Blob format: age passphrase encryption over the JSON bytes, then base64.
/// Any failure on the decode path surfaces as `CodecError::Corrupt` so
/// callers can treat tampered, truncated, and wrong-key blobs uniformly.
#[derive(Clone)]
pub struct SessionCipher {
    passphrase: Secret<String>,
}

impl SessionCipher {
    pub fn new(passphrase: String) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(CodecError::MissingPassphrase.into());
        }
        Ok(Self {
            passphrase: Secret::new(passphrase),
        })
    }

    /// Build a cipher from config. `OMNICAST_SESSION_KEY` overrides the
    /// passphrase file.
    pub fn from_config(config: &Config) -> Result<Self> {
        if let Ok(passphrase) = std::env::var("OMNICAST_SESSION_KEY") {
            if !passphrase.is_empty() {
                return Self::new(passphrase);
            }
        }

        let path = shellexpand::tilde(&config.session.passphrase_file).to_string();
        let passphrase = std::fs::read_to_string(&path)
            .map_err(|_| CodecError::MissingPassphrase)?
            .trim()
            .to_string();
        Self::new(passphrase)
    }

    /// Encrypt session material into a storable blob
    pub fn encode(&self, session: &SessionData) -> Result<String> {
        let plaintext = session.to_json_string();

        let encryptor = age::Encryptor::with_user_passphrase(age::secrecy::Secret::new(
            self.passphrase.expose_secret().clone(),
        ));

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| CodecError::Encrypt(e.to_string()))?;
        writer
            .write_all(plaintext.as_bytes())
            .map_err(|e| CodecError::Encrypt(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| CodecError::Encrypt(e.to_string()))?;

        Ok(STANDARD.encode(encrypted))
    }

    /// Decrypt a stored blob back into session material
    pub fn decode(&self, blob: &str) -> Result<SessionData> {
        let encrypted = STANDARD
            .decode(blob)
            .map_err(|e| CodecError::Corrupt(format!("bad base64: {}", e)))?;

        let decryptor = match age::Decryptor::new(&encrypted[..]) {
            Ok(age::Decryptor::Passphrase(d)) => d,
            Ok(_) => {
                return Err(CodecError::Corrupt(
                    "unexpected encryption format (expected passphrase)".to_string(),
                )
                .into())
            }
            Err(e) => return Err(CodecError::Corrupt(e.to_string()).into()),
        };

        let mut decrypted = vec![];
        let mut reader = decryptor
            .decrypt(
                &age::secrecy::Secret::new(self.passphrase.expose_secret().clone()),
                None,
            )
            .map_err(|e| CodecError::Corrupt(e.to_string()))?;
        reader
            .read_to_end(&mut decrypted)
            .map_err(|e| CodecError::Corrupt(e.to_string()))?;

        let json = String::from_utf8(decrypted)
            .map_err(|e| CodecError::Corrupt(format!("invalid UTF-8: {}", e)))?;
        SessionData::from_json_str(&json)
    }
}
