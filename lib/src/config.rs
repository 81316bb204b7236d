use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Chainable, ErrorKind, Result};

/// Optional project configuration file, read from the project root.
pub const CONFIG_FILE: &str = "config.toml";

/// Which side wins when a page's metadata and its layout's metadata share a
/// key. The `layout` key itself is exempt: it always names the next layout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precedence {
    /// The most specific level (the page) wins.
    #[default]
    Page,
    /// The enclosing layout overrides the page.
    Layout,
}

/// Extra classification exclusions, appended to the built-in ones.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IgnoreSettings {
    pub suffixes: Vec<String>,
    pub prefixes: Vec<String>,
    pub includes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub output: PathBuf,
    pub host: String,
    pub port: u16,
    pub reload_path: String,
    pub reload_interval_ms: u64,
    pub layouts_dir: String,
    pub includes_dir: String,
    pub default_layout: String,
    pub precedence: Precedence,
    pub ignore: IgnoreSettings,
    #[serde(flatten)]
    pub globals: BTreeMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            output: PathBuf::from("build"),
            host: "localhost".into(),
            port: 8080,
            reload_path: "/dev-refresh".into(),
            reload_interval_ms: 2000,
            layouts_dir: "_layouts".into(),
            includes_dir: "_includes".into(),
            default_layout: "layout".into(),
            precedence: Precedence::Page,
            ignore: IgnoreSettings::default(),
            globals: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub settings: Settings,
}

impl Config {
    /// A configuration with default settings rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Config { root: root.as_ref().to_path_buf(), settings: Settings::default() }
    }

    /// Reads `config.toml` under `root` if present, then applies the `HOST`
    /// and `PORT` environment overrides.
    pub fn discover<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let file = root.join(CONFIG_FILE);
        let mut settings = if file.is_file() {
            Settings::parse(&std::fs::read_to_string(&file)?)
                .chain_with(|| error! {
                    "invalid project configuration",
                    "config file" => file.display(),
                })
                .map_err(|e| e.with_kind(ErrorKind::Configuration))?
        } else {
            Settings::default()
        };

        if let Ok(host) = std::env::var("HOST") {
            settings.host = host;
        }

        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            settings.port = port;
        }

        Ok(Config { root: root.to_path_buf(), settings })
    }

    pub fn includes_path(&self) -> PathBuf {
        self.root.join(&self.settings.includes_dir)
    }

    /// The build output directory. Relative settings resolve against `root`.
    pub fn output_path(&self) -> PathBuf {
        self.root.join(&self.settings.output)
    }

    /// Relative path of the default layout file, e.g. `_layouts/layout.html`.
    pub fn default_layout_path(&self) -> String {
        format!("{}/{}", self.settings.layouts_dir, crate::render::layout_file_name(&self.settings.default_layout))
    }
}

impl Settings {
    pub fn parse(string: &str) -> Result<Self> {
        Ok(toml::from_str(string)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_become_globals() {
        let settings = Settings::parse(r#"
            port = 3000
            precedence = "layout"
            title = "My Site"

            [ignore]
            suffixes = [".bak"]
        "#).unwrap();

        assert_eq!(settings.port, 3000);
        assert_eq!(settings.precedence, Precedence::Layout);
        assert_eq!(settings.ignore.suffixes, vec![".bak"]);
        assert_eq!(settings.globals["title"], serde_json::json!("My Site"));
        assert_eq!(settings.reload_path, "/dev-refresh");
    }

    #[test]
    fn malformed_config_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "port = \"not a number").unwrap();
        let error = Config::discover(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.default_layout_path(), "_layouts/layout.html");
        assert_eq!(config.output_path(), dir.path().join("build"));
    }
}
