//! Duration strings such as `"1h30m"`, `"250ms"` or `"1.5s"`.
//!
//! Grammar: an optional `+`, then one or more `<decimal><unit>` components,
//! where unit is one of `ns`, `us` (`µs`), `ms`, `s`, `m`, `h`. The bare
//! string `"0"` is also accepted. Negative durations are rejected because
//! [`Duration`] is unsigned.

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a duration string. Returns `None` on any syntax error or overflow.
///
/// ```
/// use ruleq::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
/// assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
/// assert_eq!(parse_duration("-1s"), None);
/// ```
#[must_use]
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() || s.starts_with('-') {
        return None;
    }

    let mut rest = s;
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let (whole, frac, after_number) = split_number(rest)?;
        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, after_unit) = after_number.split_at(unit_len);
        let scale = unit_nanos(unit)?;

        let mut nanos = whole.checked_mul(scale)?;
        if !frac.is_empty() {
            let digits = u32::try_from(frac.len()).ok()?;
            let frac_value: u128 = frac.parse().ok()?;
            let divisor = 10u128.checked_pow(digits)?;
            nanos = nanos.checked_add(frac_value.checked_mul(scale)? / divisor)?;
        }
        total = total.checked_add(nanos)?;
        rest = after_unit;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).ok()?;
    let subsec = u32::try_from(total % NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, subsec))
}

/// Split a leading `<digits>[.<digits>]` off `s`.
fn split_number(s: &str) -> Option<(u128, &str, &str)> {
    let int_len = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (int_part, rest) = s.split_at(int_len);
    let (frac_part, rest) = match rest.strip_prefix('.') {
        Some(after_dot) => {
            let frac_len = after_dot
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_dot.len());
            after_dot.split_at(frac_len)
        }
        None => ("", rest),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    let whole = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    Some((whole, frac_part, rest))
}

fn unit_nanos(unit: &str) -> Option<u128> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3_600 * NANOS_PER_SEC,
        _ => return None,
    })
}
