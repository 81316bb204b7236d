use std::path::Path;
use std::sync::Arc;

use mlua::{Function, Lua, LuaSerdeExt, RegistryKey};
use serde_json::Value;
use thread_local::ThreadLocal;

use crate::error::{Chainable, ErrorKind, Result};
use crate::page::Page;
use crate::scope::{ScopeGenerator, ScopeResolver};

pub struct LazyThreadLocal<T: Send> {
    tls: ThreadLocal<T>,
    init_fn: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Send> LazyThreadLocal<T> {
    pub fn new<F: Fn() -> T>(init_fn: F) -> LazyThreadLocal<T>
        where F: Send + Sync + 'static
    {
        LazyThreadLocal {
            tls: ThreadLocal::new(),
            init_fn: Box::new(init_fn),
        }
    }

    pub fn get(&self) -> &T {
        self.tls.get_or(|| (self.init_fn)())
    }
}

/// Loads `.lua` and `.luau` scope generators.
///
/// The chunk must evaluate to a function taking `(page, pages)` and returning
/// a table. Lua states are not shareable across threads, so each rendering
/// thread lazily evaluates its own copy of the chunk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LuaResolver;

#[derive(derive_more::Debug)]
struct LuaScope {
    name: String,
    #[debug(skip)]
    state: LazyThreadLocal<Result<LuaState>>,
}

struct LuaState {
    lua: Lua,
    function: RegistryKey,
}

impl LuaState {
    fn new(chunk: &str, name: &str) -> Result<Self> {
        let lua = Lua::new();
        let function = {
            let value: mlua::Value = lua.load(chunk).set_name(name).eval()?;
            match value {
                mlua::Value::Function(f) => lua.create_registry_value(f)?,
                other => return Err(error! {
                    "scope generator chunk must return a function",
                    "scope generator" => name,
                    "returned" => other.type_name(),
                }.with_kind(ErrorKind::ScopeGenerator)),
            }
        };

        Ok(LuaState { lua, function })
    }
}

impl LuaScope {
    fn state(&self) -> Result<&LuaState> {
        self.state.get().as_ref().map_err(|e| e.clone())
    }
}

impl ScopeResolver for LuaResolver {
    fn extensions(&self) -> &[&str] {
        &["lua", "luau"]
    }

    fn load(&self, path: &Path, relative: &str) -> Result<Arc<dyn ScopeGenerator>> {
        let chunk = std::fs::read_to_string(path)
            .chain_with(|| error!("failed to read scope generator", "scope generator" => relative))?;

        let name = relative.to_string();
        let scope = LuaScope {
            name: name.clone(),
            state: LazyThreadLocal::new(move || LuaState::new(&chunk, &name)),
        };

        // Evaluate once here so syntax errors and non-function chunks are
        // reported at load time rather than on first render.
        scope.state()
            .chain_with(|| error!("failed to load Lua scope generator")
                .with_kind(ErrorKind::ScopeGenerator))?;

        Ok(Arc::new(scope))
    }
}

impl ScopeGenerator for LuaScope {
    fn generate(&self, page: &Page, pages: &[Page]) -> Result<Value> {
        let LuaState { lua, function } = self.state()?;
        let function: Function = lua.registry_value(function)?;
        let page = lua.to_value(page)?;
        let pages = lua.to_value(pages)?;
        let result: mlua::Value = function.call((page, pages))
            .chain_with(|| error!("Lua scope generator raised an error", "scope generator" => &self.name))?;

        Ok(lua.from_value(result)?)
    }
}

impl_error_detail_with_std_error!(mlua::Error);
