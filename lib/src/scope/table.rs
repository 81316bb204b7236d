use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Chainable, ErrorKind, Result};
use crate::page::Page;
use crate::scope::{ScopeGenerator, ScopeResolver};

pub type Handler = dyn Fn(&Page, &[Page]) -> Result<Value> + Send + Sync;

/// Scope generators registered from Rust.
///
/// A sibling `<page>.scope` file holds the name of a registered handler.
/// This is how an embedding program supplies scope without shipping code
/// in the content tree.
#[derive(derive_more::Debug, Default, Clone)]
pub struct HandlerTable {
    #[debug("{:?}", handlers.keys().collect::<Vec<_>>())]
    handlers: FxHashMap<String, Arc<Handler>>,
}

#[derive(derive_more::Debug)]
struct NamedHandler {
    name: String,
    #[debug(skip)]
    handler: Arc<Handler>,
}

impl HandlerTable {
    pub const EXTENSION: &'static str = "scope";

    pub fn new() -> Self {
        HandlerTable::default()
    }

    pub fn register<F>(mut self, name: &str, handler: F) -> Self
        where F: Fn(&Page, &[Page]) -> Result<Value> + Send + Sync + 'static
    {
        self.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Handler>> {
        self.handlers.get(name)
    }
}

impl ScopeResolver for HandlerTable {
    fn extensions(&self) -> &[&str] {
        &[HandlerTable::EXTENSION]
    }

    fn load(&self, path: &Path, relative: &str) -> Result<Arc<dyn ScopeGenerator>> {
        let contents = std::fs::read_to_string(path)
            .chain_with(|| error!("failed to read scope file", "scope generator" => relative))?;

        let name = contents.trim();
        match self.get(name) {
            Some(handler) => Ok(Arc::new(NamedHandler {
                name: name.to_string(),
                handler: handler.clone(),
            })),
            None => Err(error! {
                "scope file names an unregistered handler",
                "scope generator" => relative,
                "handler" => name,
            }.with_kind(ErrorKind::ScopeGenerator)),
        }
    }
}

impl ScopeGenerator for NamedHandler {
    fn generate(&self, page: &Page, pages: &[Page]) -> Result<Value> {
        (self.handler)(page, pages)
            .chain_with(|| error!("scope handler failed", "handler" => &self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_handler_is_not_invocable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.scope");
        std::fs::write(&path, " nope \n").unwrap();

        let table = HandlerTable::new().register("yes", |_, _| Ok(Value::Null));
        let error = table.load(&path, "a.scope").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ScopeGenerator);
        assert!(error.to_string().contains("nope"));

        std::fs::write(&path, "yes").unwrap();
        assert!(table.load(&path, "a.scope").is_ok());
    }
}
