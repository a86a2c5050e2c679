//! Page compilation: templates, islands, Markdown and layout.
//!
//! - **element**: Island registry and the handle templates print
//! - **template**: Per-page MiniJinja environments and the page index
//! - **markdown**: Markdown + front matter conversion
//! - **pages**: The depth-ordered renderer
//!
//! # Render Flow
//!
//! ```text
//! parse_pages() ──► expand ──► convert ──► layout
//!                  (phase 1)  (phase 2)   (phase 3)
//!                      │          │
//!                      ▼          ▼
//!                 Element[]   PageIndex (published view)
//! ```

pub mod element;
pub mod markdown;
pub mod pages;
pub mod template;

pub use pages::render_site;

use thiserror::Error;

/// Errors raised while parsing or executing page templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to parse template {page}")]
    Parse {
        page: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to render {page}")]
    Render {
        page: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("element directive called on {0} after its template finished")]
    Sealed(String),

    #[error("no element with index {0} on this page")]
    UnknownElement(usize),

    #[error("invalid props: {0}")]
    Props(String),

    #[error("invalid front matter in {page}: {message}")]
    FrontMatter { page: String, message: String },
}

impl From<TemplateError> for minijinja::Error {
    fn from(err: TemplateError) -> Self {
        minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, err.to_string())
    }
}
