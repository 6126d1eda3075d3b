use colored::*;

pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn warning(message: &str) {
    println!("{} {}", "!".yellow().bold(), message.yellow());
}

pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", "Error:".red(), message);
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

pub fn format_optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
