//! Fallback decode chain.
//!
//! Snapshots in the wild come in several forms: plain JSON from older
//! builds, encrypted JSON, compressed-then-encrypted JSON, and plain JSON
//! damaged by text transports. Each form has a strategy; the chain tries
//! them in order and stops at the first that yields well-formed JSON.

use crate::error::{CoreError, CoreResult, DecodeAttempt};
use crate::transform::TransformPipeline;
use serde_json::Value as JsonValue;
use stockpile_codec::{parse_json, SnapshotDocument};

/// One way of turning payload bytes into JSON.
#[derive(Clone, Copy)]
pub struct DecodeStrategy {
    /// Name reported in logs and errors.
    pub name: &'static str,
    run: fn(&TransformPipeline, &[u8]) -> CoreResult<JsonValue>,
}

impl std::fmt::Debug for DecodeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DecodeStrategy").field(&self.name).finish()
    }
}

/// Parse as-is.
pub const PLAINTEXT: &str = "plaintext";
/// Decrypt, then parse.
pub const DECRYPT: &str = "decrypt";
/// Decrypt, decompress, then parse.
pub const DECRYPT_DECOMPRESS: &str = "decrypt+decompress";
/// Sanitize text, then parse.
pub const SANITIZE: &str = "sanitize";

fn run_plaintext(_: &TransformPipeline, bytes: &[u8]) -> CoreResult<JsonValue> {
    Ok(parse_json(bytes)?)
}

fn run_decrypt(pipeline: &TransformPipeline, bytes: &[u8]) -> CoreResult<JsonValue> {
    Ok(parse_json(&pipeline.decrypt(bytes)?)?)
}

fn run_decrypt_decompress(pipeline: &TransformPipeline, bytes: &[u8]) -> CoreResult<JsonValue> {
    let inner = pipeline.decrypt(bytes)?;
    Ok(parse_json(&pipeline.decompress(&inner)?)?)
}

fn run_sanitize(_: &TransformPipeline, bytes: &[u8]) -> CoreResult<JsonValue> {
    Ok(parse_json(sanitize(bytes).as_bytes())?)
}

/// The default chain: plaintext, decrypt, decrypt+decompress, sanitize.
pub const DEFAULT_CHAIN: [DecodeStrategy; 4] = [
    DecodeStrategy {
        name: PLAINTEXT,
        run: run_plaintext,
    },
    DecodeStrategy {
        name: DECRYPT,
        run: run_decrypt,
    },
    DecodeStrategy {
        name: DECRYPT_DECOMPRESS,
        run: run_decrypt_decompress,
    },
    DecodeStrategy {
        name: SANITIZE,
        run: run_sanitize,
    },
];

/// A successfully decoded payload.
#[derive(Debug, Clone)]
pub struct Decoded {
    /// The validated document.
    pub document: SnapshotDocument,
    /// Name of the strategy that succeeded.
    pub strategy: &'static str,
}

/// Decodes `bytes` with the default chain.
///
/// # Errors
///
/// Returns [`CoreError::Decode`] if no strategy yields JSON, and
/// [`CoreError::Schema`] if the JSON is not a snapshot document.
pub fn decode(pipeline: &TransformPipeline, bytes: &[u8]) -> CoreResult<Decoded> {
    decode_with(&DEFAULT_CHAIN, pipeline, bytes)
}

/// Decodes `bytes` with an explicit chain.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_with(
    chain: &[DecodeStrategy],
    pipeline: &TransformPipeline,
    bytes: &[u8],
) -> CoreResult<Decoded> {
    let mut attempts = Vec::with_capacity(chain.len());

    for strategy in chain {
        match (strategy.run)(pipeline, bytes) {
            Ok(json) => {
                if !attempts.is_empty() {
                    tracing::debug!(strategy = strategy.name, failed = attempts.len(), "decoded after fallback");
                }
                let document = SnapshotDocument::from_json(json)
                    .map_err(|e| CoreError::schema(e.to_string()))?;
                return Ok(Decoded {
                    document,
                    strategy: strategy.name,
                });
            }
            Err(e) => attempts.push(DecodeAttempt {
                strategy: strategy.name,
                error: e.to_string(),
            }),
        }
    }

    Err(CoreError::Decode { attempts })
}

/// Repairs text damaged in transit.
///
/// Strips a leading byte-order mark and control characters other than tab,
/// newline and carriage return, then collapses runs of three or more
/// double quotes into one.
#[must_use]
pub fn sanitize(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let mut out = String::with_capacity(text.len());
    let mut quotes = 0usize;

    let flush = |out: &mut String, quotes: &mut usize| {
        match *quotes {
            0 => {}
            n if n >= 3 => out.push('"'),
            n => out.extend(std::iter::repeat('"').take(n)),
        }
        *quotes = 0;
    };

    for c in text.chars() {
        if c == '\u{feff}' || (c.is_control() && !matches!(c, '\t' | '\n' | '\r')) {
            continue;
        }
        if c == '"' {
            quotes += 1;
            continue;
        }
        flush(&mut out, &mut quotes);
        out.push(c);
    }
    flush(&mut out, &mut quotes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{compress, EncryptionKey, KEY_SIZE};
    use proptest::prelude::*;

    const DOC: &str = r#"{"metadata":{"version":2},"data":{"items":[{"id":1,"name":"Tea"}]}}"#;

    fn keyed() -> TransformPipeline {
        TransformPipeline::encrypted(&EncryptionKey::from_bytes(&[5u8; KEY_SIZE]).unwrap())
    }

    #[test]
    fn plaintext_first() {
        let decoded = decode(&keyed(), DOC.as_bytes()).unwrap();
        assert_eq!(decoded.strategy, PLAINTEXT);
        assert_eq!(decoded.document.row_count(), 1);
    }

    #[test]
    fn plaintext_without_key() {
        let decoded = decode(&TransformPipeline::plain(), DOC.as_bytes()).unwrap();
        assert_eq!(decoded.strategy, PLAINTEXT);
    }

    #[test]
    fn encrypted_payload() {
        let pipeline = keyed().with_compression(None);
        let bytes = pipeline.encode(DOC.as_bytes()).bytes;
        assert_eq!(decode(&pipeline, &bytes).unwrap().strategy, DECRYPT);
    }

    #[test]
    fn compressed_encrypted_payload() {
        let pipeline = keyed();
        let bytes = pipeline.encode(DOC.as_bytes()).bytes;
        assert_eq!(decode(&pipeline, &bytes).unwrap().strategy, DECRYPT_DECOMPRESS);
    }

    #[test]
    fn damaged_text_is_sanitized() {
        let damaged = format!("\u{feff}{}\u{0}\u{7}", DOC.replace("\"Tea\"", "\"\"\"Tea\"\"\""));
        let decoded = decode(&TransformPipeline::plain(), damaged.as_bytes()).unwrap();
        assert_eq!(decoded.strategy, SANITIZE);
        assert_eq!(decoded.document.tables[0].rows[0]["name"], "Tea");
    }

    #[test]
    fn undecodable_reports_every_attempt() {
        let err = decode(&keyed(), &[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        match err {
            CoreError::Decode { attempts } => {
                let names: Vec<_> = attempts.iter().map(|a| a.strategy).collect();
                assert_eq!(names, [PLAINTEXT, DECRYPT, DECRYPT_DECOMPRESS, SANITIZE]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_key_cannot_decode() {
        let bytes = keyed().encode(DOC.as_bytes()).bytes;
        let other = TransformPipeline::encrypted(&EncryptionKey::generate());
        assert!(matches!(decode(&other, &bytes), Err(CoreError::Decode { .. })));
    }

    #[test]
    fn compressed_without_encryption_is_undecodable() {
        let bytes = compress(DOC.as_bytes(), 3).unwrap();
        assert!(decode(&keyed(), &bytes).is_err());
    }

    #[test]
    fn json_without_data_is_schema_error() {
        let err = decode(&TransformPipeline::plain(), br#"{"metadata":{}}"#).unwrap_err();
        assert!(matches!(err, CoreError::Schema { .. }));
    }

    #[test]
    fn sanitize_rules() {
        assert_eq!(sanitize(b"a\x00b\tc\n"), "ab\tc\n");
        assert_eq!(sanitize(br#"{"k":""}"#), r#"{"k":""}"#);
        assert_eq!(sanitize(br#"""""x"#), r#""x"#);
        assert_eq!(sanitize("\u{feff}{}".as_bytes()), "{}");
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(s in "[a-z{}:,\"\\x00-\\x08]{0,64}") {
            let once = sanitize(s.as_bytes());
            prop_assert_eq!(sanitize(once.as_bytes()), once);
        }
    }
}
