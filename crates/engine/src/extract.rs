// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listing schema validation applied before records are streamed to the
//! data sink. Rejections are counted by the caller, never fatal.

use serde_json::Value;

/// Check one extracted record against the listing schema.
///
/// Required: an object carrying a scalar `listingId`, a non-empty `title`,
/// and a non-empty `url`. Everything else is passed through untouched.
pub fn validate_listing(value: &Value) -> Result<(), String> {
    let Some(obj) = value.as_object() else {
        return Err("not an object".to_owned());
    };

    match obj.get("listingId") {
        Some(id) if id.is_string() || id.is_number() => {
            if id.as_str().is_some_and(str::is_empty) {
                return Err("empty listingId".to_owned());
            }
        }
        Some(_) => return Err("listingId must be a string or number".to_owned()),
        None => return Err("missing listingId".to_owned()),
    }

    match obj.get("title").and_then(Value::as_str) {
        Some(title) if !title.trim().is_empty() => {}
        _ => return Err("missing title".to_owned()),
    }

    match obj.get("url").and_then(Value::as_str) {
        Some(url) if !url.is_empty() => {}
        _ => return Err("missing url".to_owned()),
    }

    Ok(())
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
