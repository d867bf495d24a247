/// Format a packet rate, e.g. `12.50 kpps`.
pub fn scale_packets(n: f64) -> String {
    if n > 1_000_000_000.0 {
        format!("{:.2} gpps", n / 1_000_000_000.0)
    } else if n > 1_000_000.0 {
        format!("{:.2} mpps", n / 1_000_000.0)
    } else if n > 1_000.0 {
        format!("{:.2} kpps", n / 1_000.0)
    } else {
        format!("{n:.0} pps")
    }
}

/// Format a byte rate as bits per second, e.g. `4.80 mbit/s`.
pub fn scale_bits(bytes_per_second: f64) -> String {
    let n = bytes_per_second * 8.0;
    if n > 1_000_000_000.0 {
        format!("{:.2} gbit/s", n / 1_000_000_000.0)
    } else if n > 1_000_000.0 {
        format!("{:.2} mbit/s", n / 1_000_000.0)
    } else if n > 1_000.0 {
        format!("{:.2} kbit/s", n / 1_000.0)
    } else {
        format!("{n:.0} bit/s")
    }
}
