//! Document rendering.
//!
//! The renderer is an opaque, possibly slow collaborator: it turns a content
//! id into document bytes. [`runtime`] holds the plumbing that lets one render
//! be shared between the request that started it and a background delivery.

mod markdown;
mod runtime;
mod types;

pub use markdown::MarkdownDocumentRenderer;
pub use runtime::{InFlightRenders, SharedRender, spawn_shared};
pub use types::{DocumentRenderer, HTML_CONTENT_TYPE, RenderError, RenderedDocument};
