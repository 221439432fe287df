//! Zstd compression stage.

use crate::error::{CoreError, CoreResult};

/// Compresses `data` with zstd at `level`.
///
/// # Errors
///
/// Returns [`CoreError::Compression`] if the encoder fails.
pub fn compress(data: &[u8], level: i32) -> CoreResult<Vec<u8>> {
    zstd::encode_all(data, level).map_err(|e| CoreError::compression(e.to_string()))
}

/// Decompresses a zstd frame produced by [`compress`].
///
/// # Errors
///
/// Returns [`CoreError::Compression`] if `data` is not a valid frame.
pub fn decompress(data: &[u8]) -> CoreResult<Vec<u8>> {
    zstd::decode_all(data).map_err(|e| CoreError::compression(e.to_string()))
}
