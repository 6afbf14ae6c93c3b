/// Parse a `Cache-Control` header value into seconds of freshness.
///
/// Returns 0 when the header is absent, marks the response uncacheable
/// (`no-cache` or `private`), or carries no recognized freshness directive.
/// `s-maxage` (the shared-cache directive) takes precedence over `max-age`.
/// Matching is by substring on the directive tokens; no full grammar is
/// parsed, so e.g. `cache-control: unknown` simply yields 0 and falls
/// through to the configured minimum TTL.
pub(crate) fn from_cache_control(value: Option<&str>) -> u64 {
    let Some(value) = value else { return 0 };
    if value.contains("no-cache") || value.contains("private") {
        return 0;
    }
    directive_value(value, "s-maxage=")
        .or_else(|| directive_value(value, "max-age="))
        .unwrap_or(0)
}

/// The integer immediately following `token`, or `None` when the token is
/// absent or not followed by at least one digit.
fn directive_value(header: &str, token: &str) -> Option<u64> {
    let rest = &header[header.find(token)? + token.len()..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}
