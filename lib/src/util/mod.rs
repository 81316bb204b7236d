mod lazy_result;

pub use lazy_result::*;

use std::path::{Component, Path};

/// Joins the normal components of `path` with `/`, whatever the platform.
pub fn slash_path(path: &Path) -> String {
    let mut string = String::new();
    for component in path.components() {
        if let Component::Normal(part) = component {
            if !string.is_empty() {
                string.push('/');
            }

            string.push_str(&part.to_string_lossy());
        }
    }

    string
}

/// Returns `true` if `input` is likely to contain a template.
pub fn is_template(input: &str) -> bool {
    let mut slice = input.as_bytes();
    while let Some(i) = memchr::memchr(b'{', slice) {
        match slice.get(i + 1) {
            Some(b'{') | Some(b'%') | Some(b'#') => return true,
            Some(_) => slice = &slice[(i + 1)..],
            None => return false,
        }
    }

    false
}

/// Minimal HTML escaping for text embedded in generated pages.
pub fn escape_html(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&#39;"),
            _ => output.push(ch),
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use super::*;

    #[test]
    fn test_is_template() {
        assert!(is_template("<p>{{ content }}</p>"));
        assert!(is_template("{% include 'nav.html' %}"));
        assert!(!is_template("body { color: red; }"));
        assert!(!is_template("trailing {"));
    }

    #[test]
    fn test_slash_path() {
        assert_eq!(slash_path(Path::new("_posts/a.md")), "_posts/a.md");
        assert_eq!(slash_path(Path::new("./x/y")), "x/y");
        assert_eq!(slash_path(Path::new("")), "");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
