/// Lowercase, hyphen separated slug. Non-ASCII letters (Arabic, Kurdish)
/// are kept as-is; everything else that is not alphanumeric becomes a
/// separator.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "property".to_string()
    } else {
        slug.chars().take(250).collect()
    }
}

/// First free slug given the slugs already taken with the same base
/// (`base`, `base-2`, `base-3`, ...).
pub fn next_available_slug(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|s| s == base) {
        return base.to_string();
    }

    let suffixes: Vec<u64> = taken
        .iter()
        .filter_map(|s| s.strip_prefix(base)?.strip_prefix('-')?.parse::<u64>().ok())
        .collect();

    let next = suffixes
        .iter()
        .copied()
        .max()
        .unwrap_or(1)
        .checked_add(1)
        // Someone already took u64::MAX, fall back to the lowest free suffix
        .unwrap_or_else(|| (2..).find(|n| !suffixes.contains(n)).unwrap_or(2));

    format!("{}-{}", base, next)
}

/// Strip scripts, handlers and unknown tags from owner supplied HTML.
pub fn sanitize_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Plain text teaser for list cards.
pub fn excerpt(html: &str, max_chars: usize) -> String {
    let text = html2text::from_read(html.as_bytes(), 120).unwrap_or_default();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    if let Some(idx) = cut.rfind(' ') {
        cut.truncate(idx);
    }
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Modern Villa -- in Erbil!! "), "modern-villa-in-erbil");
        assert_eq!(slugify("3 BR Apartment"), "3-br-apartment");
        assert_eq!(slugify("!!!"), "property");
    }

    #[test]
    fn slugify_keeps_arabic_letters() {
        assert_eq!(slugify("شقة للبيع"), "شقة-للبيع");
    }

    #[test]
    fn next_slug_handles_suffixes_past_u32() {
        assert_eq!(
            next_available_slug("flat", &["flat".into(), "flat-4294967295".into()]),
            "flat-4294967296"
        );

        let taken: Vec<String> = vec![
            "flat".into(),
            "flat-2".into(),
            "flat-18446744073709551615".into(),
        ];
        let slug = next_available_slug("flat", &taken);
        assert_eq!(slug, "flat-3");
        assert!(!taken.contains(&slug));
    }

    #[test]
    fn next_slug_skips_taken_suffixes() {
        assert_eq!(next_available_slug("villa", &[]), "villa");
        assert_eq!(
            next_available_slug("villa", &["villa-garden".into()]),
            "villa"
        );
        assert_eq!(next_available_slug("villa", &["villa".into()]), "villa-2");
        assert_eq!(
            next_available_slug(
                "villa",
                &["villa".into(), "villa-2".into(), "villa-7".into(), "villa-x".into()]
            ),
            "villa-8"
        );
    }

    #[test]
    fn sanitize_drops_scripts() {
        let cleaned = sanitize_html("<p>Nice</p><script>alert(1)</script>");
        assert_eq!(cleaned, "<p>Nice</p>");
    }

    #[test]
    fn excerpt_cuts_on_word_boundary() {
        let out = excerpt("<p>Bright two bedroom flat near the park</p>", 20);
        assert_eq!(out, "Bright two bedroom…");
        assert_eq!(excerpt("<span>Short</span>", 20), "Short");
    }
}
