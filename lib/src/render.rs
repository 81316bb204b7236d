use std::path::Path;

use serde_json::Value;

use crate::config::{Config, Precedence};
use crate::error::{Chainable, ErrorKind, Result};
use crate::frontmatter;
use crate::metadata::{Layout, Metadata};
use crate::page::Page;
use crate::site::Site;
use crate::templating::{Engine, EngineInit, Scope};
use crate::templating::minijinja::MiniJinjaEngine;
use crate::util::is_template;

/// Layout chains longer than this are considered cyclic.
pub const MAX_LAYOUT_PASSES: usize = 16;

/// The file name of the layout called `name`: `name.html`, unless `name`
/// already has an extension.
pub fn layout_file_name(name: &str) -> String {
    match Path::new(name).extension() {
        Some(_) => name.to_string(),
        None => format!("{name}.html"),
    }
}

/// A rendered page.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub html: String,
    /// Names of the layouts applied, innermost first.
    pub layouts: Vec<String>,
}

/// Renders pages through their scope generator, their own template, and
/// their chain of layouts.
#[derive(Debug)]
pub struct Renderer {
    engine: Box<dyn Engine>,
    layouts_dir: String,
    default_layout: String,
    precedence: Precedence,
}

impl Renderer {
    /// A renderer backed by minijinja.
    pub fn new(config: &Config) -> Self {
        Renderer::with_engine(config, MiniJinjaEngine::init(config))
    }

    pub fn with_engine<E: Engine + 'static>(config: &Config, engine: E) -> Self {
        Renderer {
            engine: Box::new(engine),
            layouts_dir: config.settings.layouts_dir.clone(),
            default_layout: config.settings.default_layout.clone(),
            precedence: config.settings.precedence,
        }
    }

    pub fn render(&self, site: &Site, page: &Page) -> Result<Rendered> {
        self.try_render(site, page)
            .map_err(|e| match e.kind() {
                ErrorKind::Other => e.with_kind(ErrorKind::Render),
                _ => e,
            })
    }

    fn try_render(&self, site: &Site, page: &Page) -> Result<Rendered> {
        let mut meta = page.meta.clone();
        if let Some(scope) = site.scope_units().generate(page, site.pages())? {
            meta.append_all(&scope);
        }

        let kinds = site.kinds();
        let mut content = if is_template(&page.content) {
            let page_value = page_scope(&meta, page, &page.content)?;
            let scope = Scope { content: &page.content, page: &page_value, site: kinds };
            self.engine.render(&page.relative_path, &page.content, &scope)
                .chain_with(|| error!("failed to render page", "page" => &page.relative_path))?
        } else {
            page.content.clone()
        };

        let mut layouts: Vec<String> = vec![];
        let mut current = meta.get_str(Layout).unwrap_or(&self.default_layout).to_string();
        loop {
            if layouts.len() >= MAX_LAYOUT_PASSES {
                return Err(error! {
                    "layout chain does not terminate",
                    "page" => &page.relative_path,
                    "chain" => layouts.join(" -> "),
                }.with_kind(ErrorKind::Configuration));
            }

            let file_name = layout_file_name(&current);
            let layout_path = format!("{}/{}", self.layouts_dir, file_name);
            let Some(source) = site.layout(&file_name) else {
                return Err(error! {
                    "layout not found",
                    "page" => &page.relative_path,
                    "layout" => &layout_path,
                }.with_kind(ErrorKind::Render));
            };

            let (layout_meta, body) = frontmatter::parse(source, &layout_path)?;
            self.merge(&mut meta, &layout_meta);

            let page_value = page_scope(&meta, page, &content)?;
            let scope = Scope { content: &content, page: &page_value, site: kinds };
            content = self.engine.render(&layout_path, &body, &scope)
                .chain_with(|| error! {
                    "failed to render layout",
                    "page" => &page.relative_path,
                    "layout" => &layout_path,
                })?;

            // A layout naming itself, with or without `.html`, ends the chain.
            layouts.push(current.clone());
            match layout_meta.get_str(Layout) {
                Some(next) if layout_file_name(next) != file_name => current = next.to_string(),
                _ => break,
            }
        }

        Ok(Rendered { html: content, layouts })
    }

    /// Merges a layout's metadata into the page's. The `layout` key only
    /// ever selects the next layout; it is never merged.
    fn merge(&self, meta: &mut Metadata, layout_meta: &Metadata) {
        let mut layout_meta = layout_meta.clone();
        layout_meta.remove(Layout);
        match self.precedence {
            Precedence::Page => meta.fill_from(&layout_meta),
            Precedence::Layout => meta.append_all(&layout_meta.to_dict()),
        }
    }
}

/// `page` as templates see it: metadata with the page's fields on top and
/// `content` set to the content rendered so far.
fn page_scope(meta: &Metadata, page: &Page, content: &str) -> Result<Value> {
    let mut dict = meta.to_dict();
    if let Value::Object(fields) = serde_json::to_value(page)? {
        dict.extend(fields);
    }

    dict.insert("content".into(), content.into());
    Ok(Value::Object(dict))
}
