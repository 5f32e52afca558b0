use std::sync::Arc;

use async_trait::async_trait;
use comrak::{Arena, format_html, options::Options, parse_document};

use crate::{
    application::repos::ContentSource,
    domain::content::{ContentId, ContentRecord},
};

use super::types::{DocumentRenderer, RenderError, RenderedDocument};

/// Renders content records to standalone HTML documents with Comrak.
pub struct MarkdownDocumentRenderer {
    source: Arc<dyn ContentSource>,
    options: Arc<Options<'static>>,
}

impl MarkdownDocumentRenderer {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self {
            source,
            options: Arc::new(default_options()),
        }
    }
}

#[async_trait]
impl DocumentRenderer for MarkdownDocumentRenderer {
    async fn render(&self, content_id: ContentId) -> Result<RenderedDocument, RenderError> {
        let record = self
            .source
            .find_content(content_id)
            .await
            .map_err(|err| RenderError::Source(err.to_string()))?
            .ok_or(RenderError::ContentNotFound(content_id))?;

        let options = Arc::clone(&self.options);
        let title = record.title.clone();
        let html = tokio::task::spawn_blocking(move || render_document(&record, &options))
            .await
            .map_err(|err| RenderError::Aborted(err.to_string()))??;

        Ok(RenderedDocument::html(title, html))
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;
    ext.description_lists = true;
    options.render.github_pre_lang = true;
    options
}

fn render_document(record: &ContentRecord, options: &Options<'static>) -> Result<String, RenderError> {
    let arena = Arena::new();
    let root = parse_document(&arena, &record.body_markdown, options);

    let mut body = String::new();
    format_html(root, options, &mut body).map_err(|err| RenderError::Markdown(err.to_string()))?;

    let title = escape_html(&record.title);
    Ok(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<article>\n<h1>{title}</h1>\n{body}</article>\n</body>\n</html>\n"
    ))
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::RepoError;

    struct MapSource(HashMap<ContentId, ContentRecord>);

    #[async_trait]
    impl ContentSource for MapSource {
        async fn find_content(&self, id: ContentId) -> Result<Option<ContentRecord>, RepoError> {
            Ok(self.0.get(&id).cloned())
        }
    }

    fn renderer_with(records: Vec<ContentRecord>) -> MarkdownDocumentRenderer {
        let map = records.into_iter().map(|r| (r.id, r)).collect();
        MarkdownDocumentRenderer::new(Arc::new(MapSource(map)))
    }

    #[tokio::test]
    async fn renders_title_and_body() {
        let renderer = renderer_with(vec![ContentRecord {
            id: 7,
            title: "Rust & <Friends>".to_string(),
            body_markdown: "Some **bold** text.".to_string(),
        }]);

        let document = renderer.render(7).await.expect("rendered");
        let html = std::str::from_utf8(&document.bytes).expect("utf8");

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Rust &amp; &lt;Friends&gt;</title>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert_eq!(document.filename(), "rust-friends.html");
    }

    #[tokio::test]
    async fn missing_content_is_reported() {
        let renderer = renderer_with(Vec::new());
        let err = renderer.render(99).await.expect_err("missing");
        assert_eq!(err, RenderError::ContentNotFound(99));
    }
}
