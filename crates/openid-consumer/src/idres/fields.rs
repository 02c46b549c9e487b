//! Required and required-signed fields

use super::version::VersionRules;
use crate::error::{Result, VerificationError};
use openid_message::{Field, Message};

/// Split an `openid.signed` value into field names
///
/// An empty value is an empty list; otherwise every comma separates, so a
/// trailing comma yields a trailing empty name.
pub(crate) fn parse_signed_list(value: &str) -> Vec<String> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(',').map(str::to_string).collect()
}

/// Check that every required field is present and every required-signed
/// field that is present is covered by the signature
///
/// Returns the parsed signed list.
pub(crate) fn check_for_fields(message: &Message, rules: &dyn VersionRules) -> Result<Vec<String>> {
    for field in rules.required_fields() {
        if !message.has(*field) {
            return Err(VerificationError::MissingField(field.to_string()));
        }
    }

    let signed = parse_signed_list(message.require(Field::Signed)?);
    for field in rules.required_signed() {
        if message.has(*field) && !signed.iter().any(|name| name == field.as_str()) {
            return Err(VerificationError::UnsignedField(field.to_string()));
        }
    }

    Ok(signed)
}
