use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, CONFIG_FILE};
use crate::error::Result;
use crate::fstree::FsTree;
use crate::page;
use crate::util::slash_path;

const IGNORE_SUFFIXES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    ".lock",
    ".yml",
    "README.md",
];

const IGNORE_PREFIXES: &[&str] = &["."];

const IGNORE_INCLUDES: &[&str] = &["node_modules"];

/// Exclusion rules applied to every path under the root.
#[derive(Debug, Clone)]
pub struct Rules {
    suffixes: Vec<String>,
    prefixes: Vec<String>,
    includes: Vec<String>,
    layouts_dir: String,
    output_dir: Option<String>,
    scope_extensions: Vec<String>,
}

/// The result of classifying a project tree. Paths are relative to the root
/// and `/`-separated, in walk order.
#[derive(Debug, Default, Clone)]
pub struct Classified {
    pub statics: Vec<String>,
    pub content: Vec<String>,
    pub layouts: Vec<String>,
    /// Scope generator code units: neither static nor content.
    pub scope: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Static,
    Content,
    Layout,
    Scope,
}

impl Rules {
    pub fn new(config: &Config, scope_extensions: &[&str]) -> Self {
        let settings = &config.settings;
        let extend = |builtin: &[&str], extra: &[String]| -> Vec<String> {
            builtin.iter().map(|s| s.to_string()).chain(extra.iter().cloned()).collect()
        };

        let output_dir = config.output_path()
            .strip_prefix(&config.root)
            .ok()
            .map(slash_path)
            .filter(|p| !p.is_empty());

        let mut includes = extend(IGNORE_INCLUDES, &settings.ignore.includes);
        includes.push(settings.includes_dir.clone());

        Rules {
            suffixes: extend(IGNORE_SUFFIXES, &settings.ignore.suffixes),
            prefixes: extend(IGNORE_PREFIXES, &settings.ignore.prefixes),
            includes,
            layouts_dir: settings.layouts_dir.clone(),
            output_dir,
            scope_extensions: scope_extensions.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Whether the `/`-separated `relative` path is excluded outright.
    pub fn is_ignored(&self, relative: &str) -> bool {
        if relative == CONFIG_FILE {
            return true;
        }

        if let Some(output) = &self.output_dir {
            if relative == output || relative.strip_prefix(output.as_str()).map_or(false, |r| r.starts_with('/')) {
                return true;
            }
        }

        // Only the top-level layouts directory is reserved. A directory of
        // the same name anywhere deeper is excluded.
        if relative.split('/').skip(1).any(|c| c == self.layouts_dir) {
            return true;
        }

        let in_layouts = self.in_layouts(relative);
        let substring = !in_layouts && self.includes.iter().any(|i| relative.contains(i.as_str()));

        substring
            || self.suffixes.iter().any(|s| relative.ends_with(s.as_str()))
            || relative.split('/').any(|c| self.prefixes.iter().any(|p| c.starts_with(p.as_str())))
    }

    fn in_layouts(&self, relative: &str) -> bool {
        relative.split('/').next() == Some(self.layouts_dir.as_str())
    }

    /// Classifies a file that is not ignored.
    pub fn class_of(&self, relative: &str) -> Class {
        let ext = relative.rsplit_once('.').map(|(_, ext)| ext);
        if self.in_layouts(relative) {
            Class::Layout
        } else if ext.map_or(false, |e| self.scope_extensions.iter().any(|s| s == e)) {
            Class::Scope
        } else if page::is_content(relative) {
            Class::Content
        } else {
            Class::Static
        }
    }

    /// Walks `root`, never descending into ignored directories.
    pub fn classify(self, root: &Path) -> Result<Classified> {
        let rules = Arc::new(self);
        let prune_rules = rules.clone();
        let tree = FsTree::build_with(root, move |relative, _| {
            prune_rules.is_ignored(&slash_path(relative))
        })?;

        let mut classified = Classified::default();
        for entry in tree.files() {
            let relative = entry.relative_str();
            let bucket = match rules.class_of(&relative) {
                Class::Static => &mut classified.statics,
                Class::Content => &mut classified.content,
                Class::Layout => &mut classified.layouts,
                Class::Scope => &mut classified.scope,
            };

            bucket.push(relative);
        }

        Ok(classified)
    }
}
