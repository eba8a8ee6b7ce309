//! Phone number normalization shared by eligibility checks and dispatch.
//!
//! WhatsApp numbers are sent as bare digits (`+55 11 94697-4555` -> `5511946974555`).
//! Anything shorter than a national number with area code is rejected.

/// Minimum number of digits for a dialable number.
pub const MIN_DIGITS: usize = 10;

/// Strip every non-digit character and return the digits if at least
/// [`MIN_DIGITS`] remain.
pub fn normalize(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < MIN_DIGITS {
        return None;
    }
    Some(digits)
}

/// Pick the dispatch number for a contact: the E.164 field wins, the national
/// field is the fallback. Empty fields are skipped.
pub fn resolve(e164: Option<&str>, national: Option<&str>) -> Option<String> {
    [e164, national]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .find_map(normalize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting() {
        assert_eq!(
            normalize("+55 11 94697-4555").as_deref(),
            Some("5511946974555")
        );
        assert_eq!(normalize("(11) 4002-8922").as_deref(), Some("1140028922"));
    }

    #[test]
    fn rejects_short_numbers() {
        assert_eq!(normalize("123-456-789"), None);
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("phone"), None);
        assert_eq!(normalize("+1 555"), None);
    }

    #[test]
    fn resolve_prefers_e164() {
        assert_eq!(
            resolve(Some("+5511999990000"), Some("(11) 3333-4444")).as_deref(),
            Some("5511999990000")
        );
    }

    #[test]
    fn resolve_falls_back_to_national() {
        assert_eq!(
            resolve(Some(""), Some("(11) 3333-4444")).as_deref(),
            Some("1133334444")
        );
        assert_eq!(
            resolve(None, Some("(11) 3333-4444")).as_deref(),
            Some("1133334444")
        );
        // A malformed E.164 value does not hide a usable national number.
        assert_eq!(
            resolve(Some("+55"), Some("(11) 3333-4444")).as_deref(),
            Some("1133334444")
        );
        assert_eq!(resolve(None, None), None);
    }
}
