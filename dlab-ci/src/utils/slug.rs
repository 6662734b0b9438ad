//! URL-safe slugs

/// Lowercase ASCII slug: alphanumerics kept, every other run collapsed to `-`.
///
/// Non-ASCII letters are dropped rather than transliterated.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch == '\'' || ch == '\u{2019}' {
            // "Hunter's Mark" → "hunters-mark"
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Acolyte"), "acolyte");
        assert_eq!(slugify("  Hunter's Mark  "), "hunters-mark");
        assert_eq!(slugify("Potion of Healing (Greater)"), "potion-of-healing-greater");
        assert_eq!(slugify("D&D 5e -- 2024"), "d-d-5e-2024");
        assert_eq!(slugify("---"), "");
    }
}
