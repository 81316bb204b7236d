use std::cmp::Ordering;
use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{ErrorKind, Result};
use crate::page::Page;

/// The pages of one parse cycle, in discovery order, indexed by URL.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    pages: Vec<Page>,
    urls: FxHashMap<String, usize>,
}

/// A page as seen through `site.<kind>`: its metadata with the page's own
/// fields layered on top.
#[derive(Debug, Serialize)]
pub struct KindEntry<'a> {
    #[serde(flatten)]
    pub meta: &'a crate::metadata::Metadata,
    #[serde(flatten)]
    pub page: &'a Page,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Adds `page`. A URL can only be registered once.
    pub fn add(&mut self, page: Page) -> Result<()> {
        if let Some(&i) = self.urls.get(&page.url) {
            return Err(error! {
                "two pages map to the same URL",
                "url" => &page.url,
                "first page" => &self.pages[i].relative_path,
                "second page" => &page.relative_path,
            }.with_kind(ErrorKind::Parse));
        }

        self.urls.insert(page.url.clone(), self.pages.len());
        self.pages.push(page);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn iter(&self) -> impl Iterator<Item = &Page> + '_ {
        self.pages.iter()
    }

    /// Looks up the page serving `url`. In order: the exact URL; for paths
    /// ending in `/`, the path plus `index.html`; for extension-less paths,
    /// the path plus `.html`, then plus `/index.html`.
    pub fn with_url(&self, url: &str) -> Option<&Page> {
        let exact = self.urls.get(url);
        let index = || {
            url.ends_with('/').then(|| self.urls.get(&format!("{url}index.html"))).flatten()
        };

        let extensionless = || {
            let file_name = url.rsplit('/').next().unwrap_or(url);
            if url.ends_with('/') || file_name.contains('.') {
                return None;
            }

            self.urls.get(&format!("{url}.html"))
                .or_else(|| self.urls.get(&format!("{url}/index.html")))
        };

        exact.or_else(index).or_else(extensionless).map(|&i| &self.pages[i])
    }

    /// Pages grouped by kind. Each group keeps the registry's order.
    pub fn kinds(&self) -> BTreeMap<&str, Vec<&Page>> {
        let mut kinds: BTreeMap<&str, Vec<&Page>> = BTreeMap::new();
        for page in &self.pages {
            kinds.entry(page.kind.as_str()).or_default().push(page);
        }

        kinds
    }

    /// Like [`Registry::kinds()`], with each page merged into its metadata:
    /// the shape templates see as `site`.
    pub fn kinds_value(&self) -> Result<serde_json::Value> {
        let kinds: BTreeMap<&str, Vec<KindEntry<'_>>> = self.kinds()
            .into_iter()
            .map(|(kind, pages)| {
                let entries = pages.into_iter()
                    .map(|page| KindEntry { meta: &page.meta, page })
                    .collect();

                (kind, entries)
            })
            .collect();

        Ok(serde_json::to_value(kinds)?)
    }

    /// Stable sort by `meta.date`, newest first. Pages without a parseable
    /// date go last.
    pub fn sort_by_date(&mut self) {
        self.pages.sort_by(|a, b| match (a.timestamp(), b.timestamp()) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        self.urls = self.pages.iter()
            .enumerate()
            .map(|(i, page)| (page.url.clone(), i))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::CommonMark;

    fn page(path: &str, text: &str) -> Page {
        Page::parse(path, text, &CommonMark::default(), None).unwrap()
    }

    fn registry(pages: &[(&str, &str)]) -> Registry {
        let mut registry = Registry::new();
        for (path, text) in pages {
            registry.add(page(path, text)).unwrap();
        }

        registry
    }

    #[test]
    fn url_aliases() {
        let registry = registry(&[
            ("index.html", "home"),
            ("about.md", "about"),
            ("docs/index.html", "docs"),
        ]);

        let url = |u| registry.with_url(u).map(|p| p.relative_path.as_str());
        assert_eq!(url("/"), Some("index.html"));
        assert_eq!(url("/index.html"), Some("index.html"));
        assert_eq!(url("/about.html"), Some("about.md"));
        assert_eq!(url("/about"), Some("about.md"));
        assert_eq!(url("/docs/"), Some("docs/index.html"));
        assert_eq!(url("/docs"), Some("docs/index.html"));
        assert_eq!(url("/about.md"), None);
        assert_eq!(url("/nope"), None);
    }

    #[test]
    fn duplicate_urls_are_rejected() {
        let mut registry = registry(&[("about.md", "a")]);
        let error = registry.add(page("about.html", "b")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Parse);
        let text = error.to_string();
        assert!(text.contains("about.md") && text.contains("about.html"));
    }

    #[test]
    fn kinds_and_date_order() {
        let mut registry = registry(&[
            ("_posts/2023-05-01-old.md", "old"),
            ("_posts/undated.md", "undated"),
            ("_posts/2024-01-01-new.md", "new"),
            ("index.html", "home"),
        ]);

        registry.sort_by_date();
        let posts: Vec<_> = registry.kinds()["posts"].iter().map(|p| p.url.as_str()).collect();
        assert_eq!(posts, ["/posts/2024-01-01-new.html", "/posts/2023-05-01-old.html", "/posts/undated.html"]);
        assert_eq!(registry.kinds()["page"].len(), 1);
        assert_eq!(registry.with_url("/").unwrap().relative_path, "index.html");

        let site = registry.kinds_value().unwrap();
        assert_eq!(site["posts"][0]["date"], "2024-01-01T00:00:00.000Z");
        assert_eq!(site["posts"][0]["url"], "/posts/2024-01-01-new.html");
        assert_eq!(site["posts"][0]["relativePath"], "_posts/2024-01-01-new.md");
    }
}
