//! Slug normalization for catalog items.

/// Normalize a name into a URL-safe slug: lowercase, runs of
/// non-alphanumeric characters collapse to single hyphens, leading and
/// trailing hyphens trimmed. Returns an empty string when nothing survives.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_hyphen = true; // Suppress a leading hyphen

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Base slug for a product: slugified name, falling back to the last path
/// segment of the identity URL, falling back to "product".
pub fn base_slug(name: &str, url: &str) -> String {
    let from_name = slugify(name);
    if !from_name.is_empty() {
        return from_name;
    }

    let last_segment = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let from_url = slugify(last_segment);
    if !from_url.is_empty() {
        return from_url;
    }

    "product".to_string()
}
