//! Transform pipeline for snapshot payloads.
//!
//! Encoding runs `json -> compress -> encrypt`. Compression is applied only
//! in front of encryption; without a key the payload is the plain JSON
//! document. Each stage degrades instead of failing: a compression error
//! encrypts the raw JSON, an encryption error emits the raw JSON. Every form
//! the encoder can produce is readable by one step of the restore decode
//! chain.

mod compress;
mod crypto;

pub use compress::{compress, decompress};
pub use crypto::{CryptoManager, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

use crate::config::BackupConfig;
use crate::error::{CoreError, CoreResult};

/// Which transforms were applied to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadForm {
    /// Untransformed JSON.
    Plain,
    /// Encrypted JSON.
    Encrypted,
    /// JSON compressed, then encrypted.
    CompressedEncrypted,
}

/// An encoded payload.
#[derive(Debug, Clone)]
pub struct Encoded {
    /// Bytes to upload.
    pub bytes: Vec<u8>,
    /// Transforms actually applied.
    pub form: PayloadForm,
}

/// Applies and reverses the snapshot transforms.
#[derive(Debug, Default)]
pub struct TransformPipeline {
    crypto: Option<CryptoManager>,
    compression_level: Option<i32>,
}

impl TransformPipeline {
    /// Creates a pipeline that leaves payloads as plain JSON.
    #[must_use]
    pub fn plain() -> Self {
        Self::default()
    }

    /// Creates a pipeline that compresses at level 3 and encrypts with `key`.
    #[must_use]
    pub fn encrypted(key: &EncryptionKey) -> Self {
        Self {
            crypto: Some(CryptoManager::new(key)),
            compression_level: Some(3),
        }
    }

    /// Creates a pipeline from backup settings and an optional key.
    #[must_use]
    pub fn from_config(config: &BackupConfig, key: Option<&EncryptionKey>) -> Self {
        Self {
            crypto: key.map(CryptoManager::new),
            compression_level: config.compress.then_some(config.compression_level),
        }
    }

    /// Sets the compression level, or disables compression with `None`.
    #[must_use]
    pub fn with_compression(mut self, level: Option<i32>) -> Self {
        self.compression_level = level;
        self
    }

    /// Returns true if a key is configured.
    #[must_use]
    pub fn is_encrypting(&self) -> bool {
        self.crypto.is_some()
    }

    /// Encodes a JSON document for upload. Never fails.
    #[must_use]
    pub fn encode(&self, json: &[u8]) -> Encoded {
        let Some(crypto) = &self.crypto else {
            return Encoded {
                bytes: json.to_vec(),
                form: PayloadForm::Plain,
            };
        };
        self.encode_stages(
            json,
            |data, level| compress(data, level),
            |data| crypto.encrypt(data),
        )
    }

    fn encode_stages<C, E>(&self, json: &[u8], compress_fn: C, encrypt_fn: E) -> Encoded
    where
        C: Fn(&[u8], i32) -> CoreResult<Vec<u8>>,
        E: Fn(&[u8]) -> CoreResult<Vec<u8>>,
    {
        let (inner, compressed) = match self.compression_level {
            Some(level) => match compress_fn(json, level) {
                Ok(packed) => (packed, true),
                Err(e) => {
                    tracing::warn!(error = %e, "compression failed, encrypting uncompressed payload");
                    (json.to_vec(), false)
                }
            },
            None => (json.to_vec(), false),
        };

        match encrypt_fn(&inner) {
            Ok(bytes) => Encoded {
                bytes,
                form: if compressed {
                    PayloadForm::CompressedEncrypted
                } else {
                    PayloadForm::Encrypted
                },
            },
            Err(e) => {
                tracing::warn!(error = %e, "encryption failed, storing untransformed payload");
                Encoded {
                    bytes: json.to_vec(),
                    form: PayloadForm::Plain,
                }
            }
        }
    }

    /// Reverses the encryption stage.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DecryptionFailed`] if no key is configured or the
    /// data does not authenticate.
    pub fn decrypt(&self, data: &[u8]) -> CoreResult<Vec<u8>> {
        match &self.crypto {
            Some(crypto) => crypto.decrypt(data),
            None => Err(CoreError::decryption_failed("no encryption key configured")),
        }
    }

    /// Reverses the compression stage.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Compression`] if `data` is not a zstd frame.
    pub fn decompress(&self, data: &[u8]) -> CoreResult<Vec<u8>> {
        decompress(data)
    }
}
