// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::ErrorCode;

#[yare::parameterized(
    domain = { ErrorCode::DomainNotAllowed, "DOMAIN_NOT_ALLOWED" },
    attach = { ErrorCode::AttachFailed, "ATTACH_FAILED" },
    parsing = { ErrorCode::ParsingError, "PARSING_ERROR" },
    invalid = { ErrorCode::InvalidCommand, "INVALID_COMMAND" },
    rate = { ErrorCode::RateLimited, "RATE_LIMITED" },
    navigation = { ErrorCode::NavigationTimeout, "NAVIGATION_TIMEOUT" },
    content_script = { ErrorCode::ContentScriptError, "CONTENT_SCRIPT_ERROR" },
    disabled = { ErrorCode::AgentDisabled, "AGENT_DISABLED" },
    unknown_message = { ErrorCode::UnknownMessageType, "UNKNOWN_MESSAGE_TYPE" },
    missing_selector = { ErrorCode::MissingSelector, "MISSING_SELECTOR" },
    element_not_found = { ErrorCode::ElementNotFound, "ELEMENT_NOT_FOUND" },
    unknown = { ErrorCode::UnknownError, "UNKNOWN_ERROR" },
)]
fn as_str_round_trips(code: ErrorCode, wire: &str) {
    assert_eq!(code.as_str(), wire);
    assert_eq!(ErrorCode::from_code(wire), code);
}

#[test]
fn unknown_strings_become_other() {
    let code = ErrorCode::from_code("something exploded");
    assert_eq!(code, ErrorCode::Other("something exploded".to_owned()));
    assert_eq!(code.as_str(), "something exploded");
}

#[test]
fn serde_uses_wire_strings() -> anyhow::Result<()> {
    let json = serde_json::to_string(&ErrorCode::RateLimited)?;
    assert_eq!(json, "\"RATE_LIMITED\"");
    let back: ErrorCode = serde_json::from_str(&json)?;
    assert_eq!(back, ErrorCode::RateLimited);

    let other: ErrorCode = serde_json::from_str("\"boom\"")?;
    assert_eq!(other, ErrorCode::Other("boom".to_owned()));
    Ok(())
}
