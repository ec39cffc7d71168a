//! Display formatting for byte sizes, transfer speeds and remaining time.

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Human readable byte size, e.g. `3.52 MB`.
pub fn bytes_to_size(size_bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if size_bytes == 0 {
        return "0 Byte".to_string();
    }
    let exponent = ((size_bytes as f64).ln() / KIB.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = size_bytes as f64 / KIB.powi(exponent as i32);
    format!("{:.2} {}", value, UNITS[exponent])
}

/// Transfer speed with two decimals, scaled to B/s, KB/s or MB/s.
pub fn format_speed(bytes_per_second: f64) -> String {
    if bytes_per_second >= MIB {
        format!("{:.2} MB/s", bytes_per_second / MIB)
    } else if bytes_per_second >= KIB {
        format!("{:.2} KB/s", bytes_per_second / KIB)
    } else {
        format!("{:.2} B/s", bytes_per_second)
    }
}

/// Remaining time floored into whole minutes and seconds, e.g. `4 min 9 sec`.
pub fn format_remaining_time(seconds: u64) -> String {
    let minutes = seconds / 60;
    let remaining = seconds % 60;
    format!("{} min {} sec", minutes, remaining)
}
