//! Minimal inflections for type-derived path segments.
//!
//! Covers the regular English rules needed to turn `BlogPost` into
//! `blog_post` / `blog_posts`; irregular nouns are not handled.

/// `BlogPost` -> `blog_post`, `Admin::User` -> `admin_user`
pub fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;

    for c in name.chars() {
        if c == ':' {
            if prev != Some(':') && !out.is_empty() {
                out.push('_');
            }
            prev = Some(c);
            continue;
        }

        if c.is_uppercase() {
            if let Some(p) = prev {
                if p.is_lowercase() || p.is_ascii_digit() {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        } else if c == '-' || c.is_whitespace() {
            out.push('_');
        } else {
            out.push(c);
        }
        prev = Some(c);
    }

    out
}

/// Regular plural of a singular noun.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }

    let lower = word.to_lowercase();
    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        return format!("{}es", word);
    }

    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last();
        if !matches!(before, Some('a' | 'e' | 'i' | 'o' | 'u') | None) {
            return format!("{}ies", stem);
        }
    }

    format!("{}s", word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underscore() {
        assert_eq!(underscore("Post"), "post");
        assert_eq!(underscore("BlogPost"), "blog_post");
        assert_eq!(underscore("Admin::User"), "admin_user");
        assert_eq!(underscore("already_snake"), "already_snake");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("post"), "posts");
        assert_eq!(pluralize("avatar"), "avatars");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize(""), "");
    }
}
