//! Text helpers shared by replies, live feeds and notifications.

use chrono::{DateTime, Local};

const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

/// Human-readable size in SI units: `0 B`, `999 B`, `1.2 kB`, `12 MB`.
///
/// The value is rounded to one decimal before picking the format, so
/// 9 960 bytes reads `10 kB` rather than `10.0 kB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 10 {
        return format!("{bytes} B");
    }
    let exp = (((bytes as f64).log10() / 3.0).floor() as usize).min(UNITS.len() - 1);
    let scaled = bytes as f64 / 1000f64.powi(exp as i32);
    let value = (scaled * 10.0 + 0.5).floor() / 10.0;
    if value < 10.0 {
        format!("{value:.1} {}", UNITS[exp])
    } else {
        format!("{value:.0} {}", UNITS[exp])
    }
}

/// Replace characters that break legacy Telegram Markdown with look-alikes.
pub fn escape_markdown(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '*' => '•',
            '[' => '(',
            ']' => ')',
            '_' => '-',
            '`' => '\'',
            other => other,
        })
        .collect()
}

/// Truncate to at most `max` Unicode scalars, marking the cut with `…`.
pub fn ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push('…');
    out
}

/// Fixed-width bar for a 0.0–1.0 fraction.
pub fn progress_bar(fraction: f64, cells: usize) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = ((fraction * cells as f64).floor() as usize).min(cells);
    let mut bar = "█".repeat(filled);
    bar.push_str(&"░".repeat(cells - filled));
    bar
}

/// Compact duration, two most significant units: `45s`, `3m 5s`, `1h 2m`, `2d 4h`.
pub fn format_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    let seconds = secs % 60;
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// ETA in seconds as reported by the daemon; negative means unknown.
pub fn format_eta(eta: i64) -> String {
    if eta < 0 {
        "∞".to_owned()
    } else {
        format_duration(eta as u64)
    }
}

/// Local wall-clock stamp for a unix timestamp, e.g. `Jan  2 15:04:05`.
pub fn format_timestamp(unix: i64) -> String {
    match DateTime::from_timestamp(unix, 0) {
        Some(ts) if unix > 0 => ts.with_timezone(&Local).format("%b %e %H:%M:%S").to_string(),
        _ => "-".to_owned(),
    }
}
