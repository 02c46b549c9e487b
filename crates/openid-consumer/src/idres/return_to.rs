//! return_to integrity
//!
//! The OP echoes the RP's return URL. Its query parameters must agree with
//! the bare parameters actually delivered, and its base must be the URL the
//! RP is listening on.

use crate::error::{Result, VerificationError};
use openid_message::{Field, Message, Namespace};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Proof that return_to integrity has been established
///
/// Only [`verify_return_to`] constructs it; signature checking consumes it, so
/// no `check_authentication` request is sent for an unchecked response.
#[derive(Debug)]
pub(crate) struct ReturnToVerified(());

/// Run both return_to checks
///
/// `expected` is the URL the RP is listening on; without it only argument
/// consistency is checked.
pub(crate) fn verify_return_to(message: &Message, expected: Option<&str>) -> Result<ReturnToVerified> {
    let return_to = message.require(Field::ReturnTo)?;
    let asserted = Url::parse(return_to).map_err(|e| {
        VerificationError::ReturnToMismatch(format!("Invalid return_to {return_to:?}: {e}"))
    })?;

    verify_return_to_args(message, &asserted)?;

    match expected {
        Some(expected) => verify_return_to_base(&asserted, expected)?,
        None => debug!("No expected return_to supplied, skipping base URL check"),
    }

    Ok(ReturnToVerified(()))
}

/// Every return_to query parameter must be present and identical among the
/// bare message parameters, and vice versa
fn verify_return_to_args(message: &Message, asserted: &Url) -> Result<()> {
    let mut query = BTreeMap::new();
    for (key, value) in asserted.query_pairs() {
        query.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }
    let bare = message.args(&Namespace::Bare);

    for (key, value) in &query {
        match bare.get(key.as_str()) {
            None => {
                return Err(VerificationError::ReturnToMismatch(format!(
                    "Message missing return_to argument {key:?}"
                )));
            }
            Some(actual) if actual != value => {
                return Err(VerificationError::ReturnToMismatch(format!(
                    "Parameter {key:?} value {actual:?} does not match return_to value {value:?}"
                )));
            }
            Some(_) => {}
        }
    }

    for key in bare.keys() {
        if !query.contains_key(*key) {
            return Err(VerificationError::ReturnToMismatch(format!(
                "Parameter {key:?} does not appear in return_to URL"
            )));
        }
    }

    Ok(())
}

/// Scheme, host, port (with scheme default) and path must equal the expected URL
fn verify_return_to_base(asserted: &Url, expected: &str) -> Result<()> {
    let expected = Url::parse(expected).map_err(|e| {
        VerificationError::configuration(format!("Invalid expected return_to URL {expected:?}: {e}"))
    })?;

    let mismatch = if asserted.scheme() != expected.scheme() {
        Some("scheme")
    } else if asserted.host_str() != expected.host_str() {
        Some("host")
    } else if asserted.port_or_known_default() != expected.port_or_known_default() {
        Some("port")
    } else if asserted.path() != expected.path() {
        Some("path")
    } else {
        None
    };

    match mismatch {
        Some(part) => Err(VerificationError::ReturnToMismatch(format!(
            "return_to {part} does not match: {asserted} vs {expected}"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(return_to: &str, bare: &[(&str, &str)]) -> Message {
        let mut args = vec![("openid.return_to", return_to)];
        args.extend_from_slice(bare);
        Message::from_post_args(args).unwrap()
    }

    #[test]
    fn test_matching_args() {
        let msg = message("https://rp.example.com/return?a=1&b=2", &[("a", "1"), ("b", "2")]);
        assert!(verify_return_to(&msg, None).is_ok());
    }

    #[test]
    fn test_matching_args_in_any_order() {
        let msg = message(
            "https://rp.example.com/return?a=1&b=2&c=3",
            &[("c", "3"), ("a", "1"), ("b", "2")],
        );
        assert!(verify_return_to(&msg, None).is_ok());
    }

    #[test]
    fn test_missing_argument() {
        let msg = message("https://rp.example.com/return?a=1&b=2", &[("a", "1")]);
        let err = verify_return_to(&msg, None).unwrap_err();
        assert!(matches!(err, VerificationError::ReturnToMismatch(ref r) if r.contains("\"b\"")));
    }

    #[test]
    fn test_extra_bare_parameter() {
        let msg = message("https://rp.example.com/return?a=1", &[("a", "1"), ("c", "3")]);
        let err = verify_return_to(&msg, None).unwrap_err();
        assert!(matches!(err, VerificationError::ReturnToMismatch(ref r) if r.contains("\"c\"")));
    }

    #[test]
    fn test_value_differs() {
        let msg = message("https://rp.example.com/return?a=1", &[("a", "2")]);
        assert!(matches!(
            verify_return_to(&msg, None).unwrap_err(),
            VerificationError::ReturnToMismatch(_)
        ));
    }

    #[test]
    fn test_first_repeated_query_value_counts() {
        let msg = message("https://rp.example.com/return?a=1&a=2", &[("a", "1")]);
        assert!(verify_return_to(&msg, None).is_ok());
    }

    #[test]
    fn test_base_default_port_applied() {
        let msg = message("https://rp.example.com:443/return?x=1", &[("x", "1")]);
        assert!(verify_return_to(&msg, Some("https://rp.example.com/return")).is_ok());
        // Query of the expected URL is not compared
        assert!(verify_return_to(&msg, Some("https://rp.example.com/return?y=2")).is_ok());
    }

    #[test]
    fn test_base_mismatches() {
        let msg = message("https://rp.example.com/return", &[]);
        for expected in [
            "http://rp.example.com/return",
            "https://other.example.com/return",
            "https://rp.example.com:8443/return",
            "https://rp.example.com/elsewhere",
        ] {
            let err = verify_return_to(&msg, Some(expected)).unwrap_err();
            assert!(err.is_protocol_violation(), "{expected}");
        }
    }

    #[test]
    fn test_unparseable_expected_is_configuration_fault() {
        let msg = message("https://rp.example.com/return", &[]);
        assert!(verify_return_to(&msg, Some("not a url")).unwrap_err().is_configuration());
    }

    #[test]
    fn test_unparseable_return_to_is_protocol_violation() {
        let msg = message("::nope", &[]);
        assert!(verify_return_to(&msg, None).unwrap_err().is_protocol_violation());
    }
}
