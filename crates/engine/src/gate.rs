// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain gate: origin-pattern matcher applied to any command carrying a
//! URL. Malformed URLs fail closed.

use url::Url;

/// Return true if `raw_url`'s host matches at least one allow pattern.
pub fn allowed(raw_url: &str, patterns: &[String]) -> bool {
    let Ok(url) = Url::parse(raw_url) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    patterns.iter().any(|p| pattern_matches(&host, p))
}

/// Match one normalized pattern against a lowercase host.
///
/// Both `d` and `*.d` match host `d` and any host ending in `.d`
/// (label-boundary suffix, so `evilexample.com` never matches
/// `example.com`).
pub fn pattern_matches(host: &str, pattern: &str) -> bool {
    let domain = normalize_pattern(pattern);
    if domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Strip scheme, leading wildcard, trailing slash; lowercase.
fn normalize_pattern(pattern: &str) -> String {
    let mut p = pattern.trim().to_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = p.strip_prefix(scheme) {
            p = rest.to_owned();
            break;
        }
    }
    let p = p.trim_end_matches('/');
    let p = p.strip_prefix("*.").unwrap_or(p);
    p.to_owned()
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
