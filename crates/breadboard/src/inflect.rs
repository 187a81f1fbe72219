//! English word helpers for deriving display names from table names.
//!
//! Only regular plurals are handled; `people`/`person` and friends come out
//! wrong, and the operator fixes them by hand.

/// `blog_categories` -> `blog_category`. Only the last word changes.
pub fn singular(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies")
        && !stem.is_empty()
    {
        return format!("{stem}y");
    }
    for suffix in ["sses", "xes", "zes", "ches", "shes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

/// `Blog Category` -> `Blog Categories`.
pub fn plural(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    if let Some(stem) = word.strip_suffix('y')
        && let Some(before) = stem.chars().last()
        && !"aeiou".contains(before.to_ascii_lowercase())
    {
        return format!("{stem}ies");
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

fn words(name: &str) -> impl Iterator<Item = &str> {
    name.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `blog_categories` -> `Blog Categories`.
pub fn title_case(name: &str) -> String {
    words(name).map(capitalize).collect::<Vec<_>>().join(" ")
}

/// `blog_category` -> `BlogCategory`.
pub fn studly(name: &str) -> String {
    words(name).map(capitalize).collect()
}

/// `Blog Categories` -> `blog-categories`.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}
