//! Canonical JSON encode/decode and content hashing.
//!
//! The canonical encoding is a function: equal values produce byte-identical
//! output. That property is what formula ids and release content hashes are
//! built on, so the rules are strict:
//!
//! - UTF-8, no BOM, no insignificant whitespace;
//! - object keys in declared order (struct fields) or insertion order
//!   (ordered maps), never alphabetized;
//! - integers in plain decimal form.
//!
//! serde_json's compact writer satisfies all three given the types in this
//! crate; the functions here add the parse-vs-schema error split and the
//! hashing entry points.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::formula::Formula;

/// Canonically encode a domain value.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(value).map_err(|err| ApiError::CodecSchema {
        detail: format!("encoding failed: {err}"),
    })
}

/// Decode a domain value from canonical (or any valid) JSON.
///
/// Distinguishes malformed bytes (`codec-parse`, with position) from
/// well-formed JSON of the wrong shape (`codec-schema`).
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    match serde_json::from_slice::<T>(bytes) {
        Ok(value) => Ok(value),
        Err(err) => {
            // The typed decode failed; a raw parse tells us whether the bytes
            // were even JSON.
            if serde_json::from_slice::<serde_json::Value>(bytes).is_ok() {
                Err(ApiError::CodecSchema {
                    detail: err.to_string(),
                })
            } else {
                Err(ApiError::CodecParse {
                    line: err.line(),
                    column: err.column(),
                    message: err.to_string(),
                })
            }
        }
    }
}

/// Content hash of a byte sequence: hex-encoded BLAKE3.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// The identity of a formula: content hash of its canonical encoding.
pub fn formula_id(formula: &Formula) -> Result<String, ApiError> {
    Ok(content_hash(&encode(formula)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::plot::PlotCapsule;

    const HELLO_PLOT: &str = r#"{"plot.v1":{"inputs":{"rootfs":"catalog:example.com/module:v1.0:x86_64"},"steps":{"hello-world":{"protoformula":{"inputs":{"/":"pipe::rootfs"},"action":{"script":{"interpreter":"/bin/sh","contents":["mkdir /out","echo hi > /out/f"],"network":false}},"outputs":{"out":{"from":"/out","packtype":"tar"}}}}},"outputs":{"output":"pipe:hello-world:out"}}}"#;

    #[test]
    fn test_decode_encode_is_bit_exact() {
        let plot: PlotCapsule = decode(HELLO_PLOT.as_bytes()).unwrap();
        let bytes = encode(&plot).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), HELLO_PLOT);
    }

    #[test]
    fn test_encode_is_idempotent() {
        let plot: PlotCapsule = decode(HELLO_PLOT.as_bytes()).unwrap();
        let once = encode(&plot).unwrap();
        let again: PlotCapsule = decode(&once).unwrap();
        assert_eq!(encode(&again).unwrap(), once);
    }

    #[test]
    fn test_malformed_bytes_are_parse_errors() {
        let err = decode::<PlotCapsule>(b"{\"plot.v1\": {,}").unwrap_err();
        assert_eq!(err.code(), ErrorCode::CodecParse);
        let ApiError::CodecParse { line, column, .. } = err else {
            panic!("expected CodecParse");
        };
        assert!(line >= 1 && column >= 1);
    }

    #[test]
    fn test_wrong_shape_is_schema_error() {
        let err = decode::<PlotCapsule>(b"{\"plot.v2\": {}}").unwrap_err();
        assert_eq!(err.code(), ErrorCode::CodecSchema);
    }

    #[test]
    fn test_formula_id_stable_across_roundtrip() {
        let formula: Formula = decode(
            br#"{"inputs":{"/":"ware:tar:abcd123","$MSG":"literal:hi"},"action":{"exec":{"command":["/bin/true"]}},"outputs":{}}"#,
        )
        .unwrap();
        let id = formula_id(&formula).unwrap();
        let reparsed: Formula = decode(&encode(&formula).unwrap()).unwrap();
        assert_eq!(formula_id(&reparsed).unwrap(), id);
        assert_eq!(id.len(), 64);
    }

    #[test]
    fn test_formula_id_differs_on_input_change() {
        let a: Formula =
            decode(br#"{"inputs":{"/":"ware:tar:abcd123"},"action":{"echo":{}},"outputs":{}}"#).unwrap();
        let b: Formula =
            decode(br#"{"inputs":{"/":"ware:tar:beef456"},"action":{"echo":{}},"outputs":{}}"#).unwrap();
        assert_ne!(formula_id(&a).unwrap(), formula_id(&b).unwrap());
    }
}
