// src/duration.rs

//! Parsing of human-written duration strings such as `"5m"`, `"250ms"` or
//! `"1h30m"`.
//!
//! Accepted grammar: one or more `<number><unit>` segments with no
//! separators, where `<number>` may carry a decimal fraction and `<unit>` is
//! one of `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `"0"` is also
//! accepted. Anything else is an error; callers must never treat a parse
//! failure as "no limit".

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|ms|s|m|h)").expect("duration segment regex")
});

/// Parse a duration string like `"3s"`, `"1.5m"` or `"2h45m10s"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos = 0f64;
    let mut cursor = 0usize;

    for caps in SEGMENT.captures_iter(s) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() != cursor {
            return Err(format!(
                "unexpected text {:?} in duration",
                &s[cursor..whole.start()]
            ));
        }
        cursor = whole.end();

        let number = &caps[1];
        let value: f64 = number
            .parse()
            .map_err(|e| format!("invalid duration number '{}': {}", number, e))?;
        total_nanos += value * unit_nanos(&caps[2]);
    }

    if cursor == 0 {
        return Err(if s.chars().all(|c| c.is_ascii_digit() || c == '.') {
            "duration missing unit suffix; expected ns, us, ms, s, m, or h".to_string()
        } else {
            format!("unrecognised duration {:?}", s)
        });
    }
    if cursor != s.len() {
        return Err(format!("unexpected trailing text {:?} in duration", &s[cursor..]));
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err("duration is too large".to_string());
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

fn unit_nanos(unit: &str) -> f64 {
    match unit {
        "ns" => 1.0,
        "us" | "µs" => 1_000.0,
        "ms" => 1_000_000.0,
        "s" => 1_000_000_000.0,
        "m" => 60.0 * 1_000_000_000.0,
        "h" => 3_600.0 * 1_000_000_000.0,
        _ => unreachable!("unit alternatives are fixed by SEGMENT"),
    }
}
