//! Formatted output utilities.

use console::style;

/// Print a success message with checkmark.
pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message with X.
pub fn error(msg: &str) {
    println!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message.
pub fn warning(msg: &str) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message.
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a header/section title.
pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair.
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).bold(), value);
}

/// Print a usage line as `used/limit`, red once the limit is reached.
pub fn quota(key: &str, used: u32, limit: u32) {
    let remaining = limit.saturating_sub(used);
    let text = format!("{used}/{limit} ({remaining} remaining)");
    let text = if remaining == 0 {
        style(text).red().to_string()
    } else {
        style(text).green().to_string()
    };
    kv(key, &text);
}
