pub mod minijinja;

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;

/// The data a template sees.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// The content rendered so far.
    pub content: &'a str,
    /// The page's metadata merged with the page itself.
    pub page: &'a serde_json::Value,
    /// Every page, grouped by kind. Shared by all renders of one site.
    pub site: &'a Arc<serde_json::Value>,
}

pub trait EngineInit {
    type Engine: Engine + 'static;

    /// Creates an engine for the project described by `config`. Partials are
    /// loaded from the includes directory; config globals become `G`.
    fn init(config: &Config) -> Self::Engine;
}

pub trait Engine: Send + Sync + Debug {
    /// Renders `template`, whose name (used in error messages and for
    /// relative lookups) is `name`.
    fn render(&self, name: &str, template: &str, scope: &Scope<'_>) -> Result<String>;
}
