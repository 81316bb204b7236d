use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::classify::Rules;
use crate::config::Config;
use crate::error::{Chainable, ErrorKind, Result};
use crate::markdown::{CommonMark, MarkdownRenderer};
use crate::page::{self, Page};
use crate::registry::Registry;
use crate::render::layout_file_name;
use crate::scope::{Resolvers, ScopeUnits};

/// Root files that can serve as the home page, in order of preference.
pub const HOME_PAGES: &[&str] = &["index.html", "index.md", "index.txt"];

/// Everything one parse cycle produces. Immutable once built.
#[derive(derive_more::Debug)]
pub struct Site {
    root: PathBuf,
    layouts_dir: String,
    /// Layout sources, keyed by their path inside the layouts directory.
    #[debug("{:?}", layouts.keys().collect::<Vec<_>>())]
    layouts: FxHashMap<String, String>,
    statics: Vec<String>,
    #[debug(skip)]
    static_set: FxHashSet<String>,
    registry: Registry,
    #[debug(skip)]
    kinds: Arc<serde_json::Value>,
    scope: ScopeUnits,
}

impl Site {
    /// Walks, classifies and parses the project described by `config`.
    pub fn parse(config: &Config, resolvers: Resolvers) -> Result<Site> {
        Site::parse_with(config, resolvers, &CommonMark::default())
    }

    pub fn parse_with(
        config: &Config,
        resolvers: Resolvers,
        markdown: &dyn MarkdownRenderer,
    ) -> Result<Site> {
        let start = Instant::now();
        let root = config.root.as_path();
        let extensions = resolvers.extensions();
        let classified = Rules::new(config, &extensions).classify(root)?;

        let layouts_prefix = format!("{}/", config.settings.layouts_dir);
        let layouts = classified.layouts.par_iter()
            .map(|relative| {
                let name = relative.strip_prefix(&layouts_prefix).unwrap_or(relative);
                Ok((name.to_string(), read(root, relative)?))
            })
            .collect::<Result<FxHashMap<_, _>>>()?;

        let scope_files: FxHashSet<&str> = classified.scope.iter().map(|s| s.as_str()).collect();
        let pages = classified.content.par_iter()
            .map(|relative| {
                let raw = read(root, relative)?;
                let scope = page::scope_sibling(relative, &extensions, |p| scope_files.contains(p));
                Page::parse(relative, &raw, markdown, scope)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut registry = Registry::new();
        for page in pages {
            registry.add(page)?;
        }

        registry.sort_by_date();
        let kinds = Arc::new(registry.kinds_value()?);
        log::info!(target: "wren::site",
            "parsed {} pages, {} static files, {} layouts in {}ms",
            registry.len(), classified.statics.len(), layouts.len(), start.elapsed().as_millis());

        Ok(Site {
            root: root.to_path_buf(),
            layouts_dir: config.settings.layouts_dir.clone(),
            layouts,
            static_set: classified.statics.iter().cloned().collect(),
            statics: classified.statics,
            registry,
            kinds,
            scope: ScopeUnits::new(root, resolvers),
        })
    }

    /// Checks that the home page and the default layout exist.
    pub fn validate(&self, config: &Config) -> Result<()> {
        let mut errors = vec![];
        if !HOME_PAGES.iter().any(|p| self.registry.iter().any(|page| page.relative_path == *p)) {
            errors.push(error! {
                "missing home page",
                "expected one of" => HOME_PAGES.join(", "),
                "project root" => self.root.display(),
            });
        }

        let default_layout = layout_file_name(&config.settings.default_layout);
        if self.layout(&default_layout).is_none() {
            errors.push(error! {
                "missing default layout",
                "expected" => config.default_layout_path(),
                "project root" => self.root.display(),
            });
        }

        match errors.into_iter().reduce(|a, b| a.chain(b)) {
            Some(error) => Err(error.with_kind(ErrorKind::Configuration)),
            None => Ok(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All pages, newest first.
    pub fn pages(&self) -> &[Page] {
        self.registry.pages()
    }

    pub fn with_url(&self, url: &str) -> Option<&Page> {
        self.registry.with_url(url)
    }

    /// Pages grouped by kind, as templates see them.
    pub fn kinds(&self) -> &Arc<serde_json::Value> {
        &self.kinds
    }

    /// The source of the layout at `name` inside the layouts directory.
    pub fn layout(&self, name: &str) -> Option<&str> {
        self.layouts.get(name).map(|s| s.as_str())
    }

    /// Relative paths of every layout file.
    pub fn layout_paths(&self) -> impl Iterator<Item = String> + '_ {
        self.layouts.keys().map(|name| format!("{}/{}", self.layouts_dir, name))
    }

    /// Relative `/`-separated paths of static files.
    pub fn statics(&self) -> &[String] {
        &self.statics
    }

    pub fn is_static(&self, relative: &str) -> bool {
        self.static_set.contains(relative)
    }

    pub fn scope_units(&self) -> &ScopeUnits {
        &self.scope
    }
}

fn read(root: &Path, relative: &str) -> Result<String> {
    std::fs::read_to_string(root.join(relative))
        .chain_with(|| error!("failed to read source file", "file" => relative))
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(Site: Send, Sync);

    fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (path, contents) in files {
            let path = dir.path().join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        dir
    }

    #[test]
    fn parses_a_project() {
        let dir = project(&[
            ("index.md", "# Home"),
            ("_posts/2024-01-01-hello.md", "hi"),
            ("_posts/2023-01-01-old.md", "old"),
            ("css/site.css", "body {}"),
            ("_layouts/layout.html", "{{ content }}"),
            ("_layouts/partials/post.html", "{{ content }}"),
        ]);

        let config = Config::new(dir.path());
        let site = Site::parse(&config, Resolvers::empty()).unwrap();
        site.validate(&config).unwrap();

        assert_eq!(site.pages().len(), 3);
        assert_eq!(site.pages()[0].url, "/posts/2024-01-01-hello.html");
        assert_eq!(site.with_url("/").unwrap().relative_path, "index.md");
        assert_eq!(site.statics(), ["css/site.css"]);
        assert!(site.is_static("css/site.css"));
        assert!(site.layout("layout.html").is_some());
        assert!(site.layout("partials/post.html").is_some());
        assert_eq!(site.kinds()["posts"][1]["url"], "/posts/2023-01-01-old.html");

        let mut layouts: Vec<_> = site.layout_paths().collect();
        layouts.sort();
        assert_eq!(layouts, ["_layouts/layout.html", "_layouts/partials/post.html"]);
    }

    #[test]
    fn validation_reports_missing_required_files() {
        let dir = project(&[("about.html", "x")]);
        let config = Config::new(dir.path());
        let site = Site::parse(&config, Resolvers::empty()).unwrap();
        let error = site.validate(&config).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);

        let text = error.to_string();
        assert!(text.contains("missing home page"));
        assert!(text.contains("_layouts/layout.html"));
    }

    #[test]
    fn bad_front_matter_fails_the_parse() {
        let dir = project(&[("index.html", "---\nnot metadata\n---\nx")]);
        let error = Site::parse(&Config::new(dir.path()), Resolvers::empty()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Parse);
        assert!(error.to_string().contains("index.html"));
    }

    #[test]
    fn scope_siblings_are_attached() {
        let dir = project(&[
            ("index.html", "x"),
            ("index.scope", "handler"),
            ("about.html", "x"),
        ]);

        let resolvers = Resolvers::empty().with(crate::scope::HandlerTable::new());
        let site = Site::parse(&Config::new(dir.path()), resolvers).unwrap();
        assert_eq!(site.with_url("/").unwrap().scope_generator.as_deref(), Some("index.scope"));
        assert!(site.with_url("/about.html").unwrap().scope_generator.is_none());
        assert!(site.statics().is_empty());
    }
}
