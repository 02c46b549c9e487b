//! Key-value form encoding
//!
//! Direct (machine-to-machine) OpenID responses and signature inputs use
//! newline-terminated `key:value` lines.

use crate::error::{MessageError, Result};
use tracing::debug;

/// Encode ordered pairs as key-value form.
///
/// # Errors
///
/// Returns [`MessageError::UnencodableKv`] if a key contains `:` or a newline,
/// or a value contains a newline.
pub fn encode<'a, I>(pairs: I) -> Result<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (key, value) in pairs {
        if key.contains(':') || key.contains('\n') {
            return Err(MessageError::UnencodableKv(key.to_string()));
        }
        if value.contains('\n') {
            return Err(MessageError::UnencodableKv(value.to_string()));
        }
        out.push_str(key);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    Ok(out)
}

/// Decode key-value form into ordered pairs.
///
/// Blank lines are skipped and surrounding whitespace on keys and values is
/// dropped.
///
/// # Errors
///
/// Returns [`MessageError::MalformedKvLine`] for a non-blank line without `:`.
pub fn decode(body: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for (index, line) in body.split('\n').enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(MessageError::MalformedKvLine {
                line: index + 1,
                content: line.to_string(),
            });
        };
        let (trimmed_key, trimmed_value) = (key.trim(), value.trim());
        if trimmed_key.len() != key.len() || trimmed_value.len() != value.len() {
            debug!(line = index + 1, "Stripped whitespace in key-value form line");
        }
        pairs.push((trimmed_key.to_string(), trimmed_value.to_string()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_orders_lines() {
        let body = encode([("mode", "id_res"), ("is_valid", "true")]).unwrap();
        assert_eq!(body, "mode:id_res\nis_valid:true\n");
    }

    #[test]
    fn test_encode_rejects_newline_in_value() {
        let err = encode([("mode", "id\nres")]).unwrap_err();
        assert!(matches!(err, MessageError::UnencodableKv(_)));
    }

    #[test]
    fn test_encode_rejects_colon_in_key() {
        assert!(encode([("a:b", "c")]).is_err());
    }

    #[test]
    fn test_decode_keeps_colons_in_value() {
        let pairs = decode("op_endpoint:https://op.example.com/\n").unwrap();
        assert_eq!(
            pairs,
            vec![(
                "op_endpoint".to_string(),
                "https://op.example.com/".to_string()
            )]
        );
    }

    #[test]
    fn test_decode_skips_blank_lines_and_trims() {
        let pairs = decode("is_valid: true\n\n").unwrap();
        assert_eq!(pairs, vec![("is_valid".to_string(), "true".to_string())]);
    }

    proptest::proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            pairs in proptest::collection::vec(("[a-z_.]{1,12}", "[ -~]{0,24}"), 0..8)
        ) {
            // Values with edge whitespace are normalised on decode
            let pairs: Vec<(String, String)> = pairs
                .into_iter()
                .map(|(k, v)| (k, v.trim().to_string()))
                .collect();
            let body = encode(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))).unwrap();
            proptest::prop_assert_eq!(decode(&body).unwrap(), pairs);
        }
    }

    #[test]
    fn test_decode_rejects_line_without_separator() {
        let err = decode("is_valid:true\ngarbage\n").unwrap_err();
        assert_eq!(
            err,
            MessageError::MalformedKvLine {
                line: 2,
                content: "garbage".to_string()
            }
        );
    }
}
