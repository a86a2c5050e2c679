//! Markdown conversion with YAML front matter.

use super::TemplateError;
use crate::site::PageData;
use pulldown_cmark::{Event, MetadataBlockKind, Options, Parser, Tag, TagEnd, html};

/// Output of a content conversion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Converted {
    pub html: String,
    pub data: PageData,
}

/// Turns an expanded page body into HTML plus metadata.
pub trait Converter {
    fn convert(&self, page: &str, source: &str) -> Result<Converted, TemplateError>;
}

/// CommonMark + GFM extensions, `---` fenced YAML front matter.
///
/// Raw HTML passes through untouched so island tokens and mount containers
/// survive conversion.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownConverter {
    options: Options,
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS
                | Options::ENABLE_YAML_STYLE_METADATA_BLOCKS,
        }
    }
}

impl Converter for MarkdownConverter {
    fn convert(&self, page: &str, source: &str) -> Result<Converted, TemplateError> {
        let mut front_matter: Option<String> = None;
        let mut in_metadata = false;

        let events = Parser::new_ext(source, self.options).filter_map(|event| match event {
            Event::Start(Tag::MetadataBlock(MetadataBlockKind::YamlStyle)) => {
                in_metadata = true;
                None
            }
            Event::End(TagEnd::MetadataBlock(MetadataBlockKind::YamlStyle)) => {
                in_metadata = false;
                None
            }
            Event::Text(text) if in_metadata => {
                front_matter.get_or_insert_with(String::new).push_str(&text);
                None
            }
            other => Some(other),
        });

        let mut out = String::with_capacity(source.len() * 3 / 2);
        html::push_html(&mut out, events);

        let data = match front_matter {
            Some(yaml) => parse_front_matter(page, &yaml)?,
            None => PageData::new(),
        };
        Ok(Converted { html: out, data })
    }
}

/// Parse a YAML front matter block into a JSON object.
fn parse_front_matter(page: &str, yaml: &str) -> Result<PageData, TemplateError> {
    let trimmed = yaml.trim();
    if trimmed.is_empty() {
        return Ok(PageData::new());
    }

    let value: serde_json::Value =
        serde_yaml::from_str(trimmed).map_err(|e| TemplateError::FrontMatter {
            page: page.to_owned(),
            message: e.to_string(),
        })?;

    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(PageData::new()),
        other => Err(TemplateError::FrontMatter {
            page: page.to_owned(),
            message: format!("expected a mapping, found `{other}`"),
        }),
    }
}
