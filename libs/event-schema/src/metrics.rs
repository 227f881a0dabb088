//! Parsing of abbreviated metric strings as rendered by list providers,
//! e.g. `$1.2M`, `538K`, `12,345`, `3.4%`.

/// Parse a display metric string into a number.
///
/// Strips commas, a leading `$` and a trailing `%`, then applies a
/// `K`/`M`/`B` suffix multiplier (case-insensitive). Returns `None` for
/// empty or unparsable input; a bad metric never fails the record it
/// belongs to.
pub fn parse_metric(raw: &str) -> Option<f64> {
    let mut s = raw.replace(',', "").trim().to_string();
    if s.is_empty() {
        return None;
    }
    if let Some(stripped) = s.strip_suffix('%') {
        s = stripped.to_string();
    }
    if let Some(stripped) = s.strip_prefix('$') {
        s = stripped.to_string();
    }

    let mut multiplier = 1.0_f64;
    if let Some(last) = s.chars().last() {
        let m = match last.to_ascii_uppercase() {
            'K' => Some(1e3),
            'M' => Some(1e6),
            'B' => Some(1e9),
            _ => None,
        };
        if let Some(m) = m {
            multiplier = m;
            s.pop();
        }
    }

    s.trim().parse::<f64>().ok().map(|v| v * multiplier)
}
