//! Text normalization: URL canonicalization, VIN cleanup, multi-line
//! flattening, and the best-effort result-count parse.

use std::sync::OnceLock;

use regex::Regex;

/// Separator used when flattening multi-line element text to one CSV cell.
const INTERNAL_DELIM: char = '^';

fn vehicle_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(https://.*?/vehicle/[a-zA-Z0-9]*)(\?.*)?$").expect("valid vehicle url regex")
    })
}

/// Reduce a listing URL to its stable `.../vehicle/<id>` form, stripping
/// tracking query parameters. `None` when the URL does not carry a vehicle
/// segment at all. Idempotent on its own output.
pub fn canonicalize_vehicle_url(url: &str) -> Option<String> {
    vehicle_url_regex()
        .captures(url)
        .map(|captures| captures[1].to_string())
}

/// Trailing path segment of a canonical vehicle URL.
pub fn vehicle_id_from_url(canonical_url: &str) -> &str {
    canonical_url.rsplit('/').next().unwrap_or_default()
}

/// Normalize a VIN block like `"VIN: 4T1G11AK5NU020242"`: uppercase, take
/// the segment after the last colon, trim. Accepted only at exactly 17
/// characters; this is a format check, not a checksum validation.
pub fn normalize_vin(raw: &str) -> Option<String> {
    let upper = raw.to_uppercase();
    let vin = upper.rsplit(':').next().unwrap_or_default().trim();
    (vin.len() == 17).then(|| vin.to_string())
}

/// Flatten multi-line element text into one line: the internal delimiter and
/// `|` are squashed to spaces first so the output splits unambiguously, then
/// trimmed lines are joined with `^`.
pub fn flatten_lines(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c == '|' || c == INTERNAL_DELIM { ' ' } else { c })
        .collect();

    cleaned
        .trim()
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(&INTERNAL_DELIM.to_string())
}

/// The price element renders as "modal-title ^ $60,944"; the price is the
/// last flattened segment.
pub fn last_flattened_segment(flattened: &str) -> String {
    flattened
        .rsplit(INTERNAL_DELIM)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Best-effort parse of a human-formatted total like `"1,234 Results"`:
/// strip commas from the first whitespace-delimited token. Anything
/// unparseable yields -1, meaning "unknown expected count".
pub fn parse_result_count(raw: &str) -> i64 {
    raw.split_whitespace()
        .next()
        .map(|token| token.replace(',', ""))
        .and_then(|token| token.parse::<i64>().ok())
        .unwrap_or(-1)
}
