//! On-demand display formatting. The model only stores raw numbers; the
//! presentation layer calls these when it renders a snapshot.

const PLACEHOLDER: &str = "--";

/// `1234567.891` with 2 decimals → `"1,234,567.89"`.
pub fn format_amount(value: f64, decimals: u8) -> String {
    if !value.is_finite() {
        return PLACEHOLDER.to_string();
    }
    let digits = format!("{:.*}", usize::from(decimals), value.abs());
    let sign = if value < 0.0 && !is_zero(&digits) { "-" } else { "" };
    format!("{sign}{}", group_thousands(&digits))
}

/// Signed amount for day changes: `"+12.50"`, `"-3.00"`, `"0.00"`.
pub fn format_change(value: f64, decimals: u8) -> String {
    if !value.is_finite() {
        return PLACEHOLDER.to_string();
    }
    let formatted = format_amount(value, decimals);
    if value > 0.0 && !is_zero(&formatted) {
        format!("+{formatted}")
    } else {
        formatted
    }
}

/// Signed percentage: `"+1.25%"`.
pub fn format_percent(value: f64, decimals: u8) -> String {
    if !value.is_finite() {
        return PLACEHOLDER.to_string();
    }
    format!("{}%", format_change(value, decimals))
}

fn is_zero(digits: &str) -> bool {
    digits.chars().filter(char::is_ascii_digit).all(|c| c == '0')
}

fn group_thousands(digits: &str) -> String {
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(digits.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}
