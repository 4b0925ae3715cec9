/// Branch- and path-safe form of a feature or task name.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let slug = out.trim_matches(|c| c == '-' || c == '.').to_string();
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}
