//! `[base]` section configuration.
//!
//! Site-wide values exposed to templates as `site.*`.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[base]` section in melange.toml - basic site metadata.
///
/// # Example
/// ```toml
/// [base]
/// title = "Field Notes"
/// description = "Notes with interactive examples"
/// language = "en"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
    /// Site title, available to the layout as `site.title`.
    #[serde(default = "defaults::base::title")]
    #[educe(Default = defaults::base::title())]
    pub title: String,

    /// Site description for meta tags.
    #[serde(default)]
    pub description: String,

    /// BCP 47 language code used for `<html lang>`.
    #[serde(default = "defaults::base::language")]
    #[educe(Default = defaults::base::language())]
    pub language: String,
}
