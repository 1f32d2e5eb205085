use std::time::Duration;

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_ms(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.2}ms")
    } else {
        "n/a".to_string()
    }
}

/// Fraction in `[0, 1]` as a percentage with two decimals.
pub(crate) fn format_percent(rate: f64) -> String {
    if rate.is_finite() {
        format!("{:.2}%", rate * 100.0)
    } else {
        "n/a".to_string()
    }
}

/// Whole seconds, in humantime's `1m 5s` form.
pub(crate) fn format_elapsed(d: Duration) -> String {
    let secs = Duration::from_secs(d.as_secs_f64().round() as u64);
    humantime::format_duration(secs).to_string()
}

pub(crate) fn format_duration_single(d: Duration) -> String {
    // A single rounded component in one of: ms, s.
    let total_ms = d.as_millis();
    if total_ms >= 1_000 {
        return format!("{}s", (total_ms + 500) / 1_000);
    }
    format!("{total_ms}ms")
}
