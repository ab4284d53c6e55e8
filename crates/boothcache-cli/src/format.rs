/// Format a phone number for display.
/// Ten-digit numbers (optionally with a leading 1) become (XXX) XXX-XXXX;
/// anything else, including international numbers, is left as entered.
pub fn format_phone(phone: &str) -> String {
    let trimmed = phone.trim_start();
    if trimmed.starts_with('+') && !trimmed.starts_with("+1") {
        return phone.to_string();
    }
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        10 => format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..10]),
        11 if digits.starts_with('1') => {
            format!("({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..11])
        }
        _ => phone.to_string(),
    }
}

/// Truncate to `max_len` characters, adding an ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

pub fn format_optional(value: Option<&str>, default: &str) -> String {
    value.unwrap_or(default).to_string()
}

/// `-` for a missing count, the number otherwise.
pub fn format_count(value: Option<i32>) -> String {
    value.map_or_else(|| "-".to_string(), |n| n.to_string())
}

pub fn format_coord(lat: f64, lng: f64) -> String {
    format!("{:.5},{:.5}", lat, lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_phone() {
        assert_eq!(format_phone("5551234567"), "(555) 123-4567");
        assert_eq!(format_phone("15551234567"), "(555) 123-4567");
        assert_eq!(format_phone("555-123-4567"), "(555) 123-4567");
        assert_eq!(format_phone("+32 9 123 45 67"), "+32 9 123 45 67");
        assert_eq!(format_phone("123"), "123");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("Brasserie Café", 12), "Brasserie...");
    }

    #[test]
    fn test_format_count_and_coord() {
        assert_eq!(format_count(None), "-");
        assert_eq!(format_count(Some(4)), "4");
        assert_eq!(format_coord(51.0123456, 3.7), "51.01235,3.70000");
    }
}
