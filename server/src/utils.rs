use regex::Regex;

/// Normalizes a free-text roster field: strips characters outside the
/// allowed set, collapses whitespace, trims.
pub fn sanitize_field(input: &str) -> String {
    let clean = Regex::new(r"[^A-Za-z0-9\-&(). ]").unwrap();
    let s = clean.replace_all(input, "").into_owned();

    let collapse = Regex::new(r" +").unwrap();
    collapse.replace_all(s.trim(), " ").into_owned()
}

/// Register numbers are opaque uppercase alphanumerics.
pub fn normalize_register_no(input: &str) -> String {
    let clean = Regex::new(r"[^A-Za-z0-9]").unwrap();
    clean.replace_all(input.trim(), "").to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::{normalize_register_no, sanitize_field};

    #[test]
    fn test_basic() {
        assert_eq!(sanitize_field("  Asha   Rao "), "Asha Rao");
        assert_eq!(sanitize_field("CSE (AI & ML)"), "CSE (AI & ML)");
    }

    #[test]
    fn test_special_characters() {
        assert_eq!(sanitize_field("!@#$%^*"), "");
        assert_eq!(sanitize_field("B.Tech-IT!"), "B.Tech-IT");
    }

    #[test]
    fn test_register_no() {
        assert_eq!(normalize_register_no("  21cs001 "), "21CS001");
        assert_eq!(normalize_register_no("21-CS/001"), "21CS001");
        assert_eq!(normalize_register_no(""), "");
    }
}
