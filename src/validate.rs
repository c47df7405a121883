//! Bucket-name and object-key validation.
//!
//! Pure predicates, no I/O.  Each rule failure produces a distinct, stable
//! message that handlers surface verbatim in 400 responses, so the messages
//! are part of the API surface and must not drift.

use std::net::IpAddr;

/// Validate a bucket name against the S3-workalike naming rules.
///
/// Rules, checked in order:
/// - 3 to 63 characters long
/// - only lowercase letters, digits, hyphens, and periods
/// - must begin and end with a letter or digit
/// - no adjacent periods
/// - no adjacent hyphens, no leading or trailing hyphen
/// - not an IPv4 or IPv6 literal
/// - DNS-compliant: dot-separated labels, each starting and ending
///   alphanumeric, interior hyphens allowed
pub fn validate_bucket_name(name: &str) -> Result<(), String> {
    if name.len() < 3 || name.len() > 63 {
        return Err("Bucket name must be between 3 and 63 characters".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(
            "Bucket name can only contain lowercase letters, numbers, hyphens, and periods"
                .to_string(),
        );
    }

    // Safe: length checked above, so first/last exist.
    let first = name.as_bytes()[0];
    let last = name.as_bytes()[name.len() - 1];
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err("Bucket name must start and end with a letter or number".to_string());
    }

    if name.contains("..") {
        return Err("Periods (.) cannot be adjacent to each other".to_string());
    }

    if name.contains("--") || name.starts_with('-') || name.ends_with('-') {
        return Err(
            "Hyphens (-) cannot be adjacent to each other or at the beginning or end".to_string(),
        );
    }

    if name.parse::<IpAddr>().is_ok() {
        return Err("Bucket name cannot be an IP address".to_string());
    }

    if !is_dns_compliant(name) {
        return Err(
            "Bucket name must be a valid DNS-compliant name, containing only letters, numbers, \
             hyphens, and periods. It cannot start or end with a hyphen or period."
                .to_string(),
        );
    }

    Ok(())
}

/// Check that `name` is a sequence of dot-separated DNS labels, each
/// starting and ending with an alphanumeric character and containing only
/// alphanumerics and interior hyphens.
fn is_dns_compliant(name: &str) -> bool {
    name.split('.').all(|label| {
        let bytes = label.as_bytes();
        match (bytes.first(), bytes.last()) {
            (Some(first), Some(last)) => {
                first.is_ascii_alphanumeric()
                    && last.is_ascii_alphanumeric()
                    && bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'-')
            }
            _ => false,
        }
    })
}

/// Validate an object key.
///
/// Rules, checked in order:
/// - non-empty, at most 1024 bytes
/// - no NUL, LF, or CR bytes
/// - must not start with `.`, `..`, `-`, or `_`
/// - no `//`, no `\`
/// - must not end with `/`
/// - every character drawn from `[A-Za-z0-9!\-_.*'()/]`
pub fn validate_object_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("key cannot be empty".to_string());
    }

    if key.len() > 1024 {
        return Err("key length cannot exceed 1024 bytes".to_string());
    }

    if key.bytes().any(|b| b == 0x00 || b == 0x0A || b == 0x0D) {
        return Err("key contains invalid control characters".to_string());
    }

    for prefix in [".", "..", "-", "_"] {
        if key.starts_with(prefix) {
            return Err(format!("key cannot start with {prefix}"));
        }
    }

    for seq in ["//", "\\"] {
        if key.contains(seq) {
            return Err(format!("key cannot contain {seq}"));
        }
    }

    if key.ends_with('/') {
        return Err("key cannot end with forward slash".to_string());
    }

    if !key.chars().all(is_safe_key_char) {
        return Err("key contains invalid characters".to_string());
    }

    Ok(())
}

/// The safe-character class for object keys.
fn is_safe_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '!' | '-' | '_' | '.' | '*' | '\'' | '(' | ')' | '/')
}

// ── Tests ───────────────────────────────────────────────────────────
