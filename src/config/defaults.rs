//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#true() -> bool {
    true
}

// ============================================================================
// [base] Section Defaults
// ============================================================================

pub mod base {
    pub fn title() -> String {
        "melange".into()
    }

    pub fn language() -> String {
        "en".into()
    }
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn content() -> PathBuf {
        "pages".into()
    }

    pub fn output() -> PathBuf {
        "_site".into()
    }

    pub fn cache() -> PathBuf {
        "node_modules/.cache/melange".into()
    }

    pub fn layout() -> Option<PathBuf> {
        None
    }

    pub mod node {
        pub fn command() -> Vec<String> {
            vec!["node".into()]
        }
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        8000
    }
}
