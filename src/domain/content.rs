//! Content records consumed by the renderer.

use slug::slugify;

/// Primary key of a content record.
pub type ContentId = i64;

/// Minimal projection of a content record needed to build a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub id: ContentId,
    pub title: String,
    pub body_markdown: String,
}

/// Derive a download-safe file name from a document title.
pub fn attachment_filename(title: &str, extension: &str) -> String {
    let mut base = slugify(title);
    if base.is_empty() {
        base = "document".to_string();
    }
    format!("{base}.{extension}")
}

#[cfg(test)]
mod tests {
    use super::attachment_filename;

    #[test]
    fn filename_follows_title() {
        assert_eq!(
            attachment_filename("Hello, World!", "html"),
            "hello-world.html"
        );
    }

    #[test]
    fn empty_title_falls_back() {
        assert_eq!(attachment_filename("  ?? ", "html"), "document.html");
    }
}
