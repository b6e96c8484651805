use std::collections::HashMap;
use std::time::Duration;

/// Reads a vendor's `Retry-After` hint from response headers.
///
/// Numeric seconds only, fractions allowed. HTTP-date values are ignored.
pub(crate) fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| seconds(value.trim()))
}

/// Parses a protobuf JSON duration such as `"17s"` or `"0.250s"`.
pub(crate) fn parse_proto_duration(value: &str) -> Option<Duration> {
    value.trim().strip_suffix('s').and_then(seconds)
}

fn seconds(value: &str) -> Option<Duration> {
    value
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(Duration::from_secs_f64)
}
