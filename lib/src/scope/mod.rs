//! Scope generators: per-page code that computes extra template variables.
//!
//! A content file `a.md` may have a sibling code unit (`a.lua`, `a.scope`,
//! ...) with an extension claimed by one of the registered
//! [`ScopeResolver`]s. At render time the unit is loaded, at most once per
//! parse cycle, and invoked as `(page, pages) -> table`. The table is merged
//! into the page's metadata.

#[cfg(feature = "plugins")]
pub mod lua;
pub mod table;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Chainable, Error, ErrorKind, Result};
use crate::metadata::Dict;
use crate::page::Page;
use crate::util::LazyFallibleArc;

pub use table::HandlerTable;
#[cfg(feature = "plugins")]
pub use lua::LuaResolver;

/// A loaded, invocable scope generator.
pub trait ScopeGenerator: Send + Sync + fmt::Debug {
    /// Computes extra scope for `page`. `pages` is the full ordered registry.
    fn generate(&self, page: &Page, pages: &[Page]) -> Result<Value>;
}

/// Loads scope generators from code units with particular extensions.
pub trait ScopeResolver: Send + Sync + fmt::Debug {
    /// Extensions, without the dot, of the code units this resolver loads.
    fn extensions(&self) -> &[&str];

    /// Loads the unit at `path`. `relative` is its root-relative name. A
    /// unit that loads but is not invocable is an `ErrorKind::ScopeGenerator`.
    fn load(&self, path: &Path, relative: &str) -> Result<Arc<dyn ScopeGenerator>>;
}

/// The registered resolvers, in priority order.
#[derive(Debug, Clone)]
pub struct Resolvers(Vec<Arc<dyn ScopeResolver>>);

impl Resolvers {
    pub fn empty() -> Self {
        Resolvers(vec![])
    }

    pub fn with<R: ScopeResolver + 'static>(mut self, resolver: R) -> Self {
        self.0.push(Arc::new(resolver));
        self
    }

    /// Every claimed extension, in priority order.
    pub fn extensions(&self) -> Vec<&str> {
        self.0.iter().flat_map(|r| r.extensions().iter().copied()).collect()
    }

    fn for_path(&self, relative: &str) -> Option<&Arc<dyn ScopeResolver>> {
        let (_, ext) = relative.rsplit_once('.')?;
        self.0.iter().find(|r| r.extensions().contains(&ext))
    }
}

impl Default for Resolvers {
    /// Lua when the `plugins` feature is enabled, otherwise nothing.
    fn default() -> Self {
        #[allow(unused_mut)]
        let mut resolvers = Resolvers::empty();

        #[cfg(feature = "plugins")]
        { resolvers = resolvers.with(LuaResolver); }

        resolvers
    }
}

type Unit = LazyFallibleArc<Arc<dyn ScopeGenerator>, Error>;

/// Loaded scope generator units for one parse cycle. Loading is lazy and
/// happens at most once per unit; generating is never cached.
#[derive(derive_more::Debug)]
pub struct ScopeUnits {
    root: PathBuf,
    resolvers: Resolvers,
    #[debug(skip)]
    units: Mutex<FxHashMap<String, Unit>>,
}

impl ScopeUnits {
    pub fn new(root: &Path, resolvers: Resolvers) -> Self {
        ScopeUnits {
            root: root.to_path_buf(),
            resolvers,
            units: Mutex::new(FxHashMap::default()),
        }
    }

    fn unit(&self, relative: &str) -> Unit {
        let mut units = self.units.lock();
        units.entry(relative.to_string())
            .or_insert_with(|| {
                let path = self.root.join(relative);
                let relative = relative.to_string();
                let resolver = self.resolvers.for_path(&relative).cloned();
                LazyFallibleArc::new(move || {
                    let result = match resolver {
                        Some(resolver) => resolver.load(&path, &relative),
                        None => Err(error! {
                            "no scope resolver handles this file",
                            "scope generator" => &relative,
                        }.with_kind(ErrorKind::ScopeGenerator)),
                    };

                    if let Err(e) = &result {
                        log::warn!(target: "wren::scope", "ignoring scope generator {relative}:\n{e}");
                    }

                    result
                })
            })
            .clone()
    }

    /// Runs `page`'s scope generator, if it has one.
    ///
    /// Returns `Ok(None)` when there is nothing to merge: no generator, a
    /// generator that failed to load or is not invocable (logged once per
    /// parse cycle), or a result that is not a table (logged). Failures
    /// while the generator runs are render errors.
    pub fn generate(&self, page: &Page, pages: &[Page]) -> Result<Option<Dict>> {
        let Some(relative) = page.scope_generator.as_deref() else {
            return Ok(None);
        };

        let unit = self.unit(relative);
        let generator = match unit.force() {
            Ok(generator) => generator,
            Err(_) => return Ok(None),
        };

        let value = generator.generate(page, pages)
            .chain_with(|| error! {
                "scope generator failed",
                "scope generator" => relative,
                "page" => &page.relative_path,
            }.with_kind(ErrorKind::Render))?;

        match value {
            Value::Object(dict) => Ok(Some(dict)),
            Value::Null => Ok(None),
            Value::Array(array) if array.is_empty() => Ok(None),
            other => {
                log::warn!(target: "wren::scope",
                    "scope generator {relative} returned {other}, expected a table; ignoring");

                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use serde_json::json;

    use super::*;
    use crate::markdown::CommonMark;

    fn page(path: &str, scope: Option<&str>) -> Page {
        Page::parse(path, "body", &CommonMark::default(), scope.map(String::from)).unwrap()
    }

    #[test]
    fn units_load_once_and_run_every_time() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.scope"), "count").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let table = HandlerTable::new().register("count", move |_, pages| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "n": n, "total": pages.len() }))
        });

        let units = ScopeUnits::new(dir.path(), Resolvers::empty().with(table));
        let page = page("a.html", Some("a.scope"));
        let pages = vec![page.clone()];

        let first = units.generate(&page, &pages).unwrap().unwrap();
        let second = units.generate(&page, &pages).unwrap().unwrap();
        assert_eq!(first["n"], json!(0));
        assert_eq!(second["n"], json!(1));
        assert_eq!(second["total"], json!(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unloadable_units_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.scope"), "missing").unwrap();

        let units = ScopeUnits::new(dir.path(), Resolvers::empty().with(HandlerTable::new()));
        let page = page("a.html", Some("a.scope"));
        assert!(units.generate(&page, &[]).unwrap().is_none());

        let units = ScopeUnits::new(dir.path(), Resolvers::empty());
        assert!(units.generate(&page, &[]).unwrap().is_none());
        assert!(units.generate(&self::page("b.html", None), &[]).unwrap().is_none());
    }

    #[test]
    fn runtime_failures_are_render_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.scope"), "fail").unwrap();
        std::fs::write(dir.path().join("b.scope"), "number").unwrap();

        let table = HandlerTable::new()
            .register("fail", |_, _| err!("boom"))
            .register("number", |_, _| Ok(json!(42)));

        let units = ScopeUnits::new(dir.path(), Resolvers::empty().with(table));
        let error = units.generate(&page("a.html", Some("a.scope")), &[]).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Render);
        assert!(error.to_string().contains("boom"));

        assert!(units.generate(&page("b.html", Some("b.scope")), &[]).unwrap().is_none());
    }
}
