use std::sync::Arc;

use minijinja::{context, path_loader, AutoEscape, Environment};
use minijinja::value::Value;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::Result;
use crate::templating::{Engine, EngineInit, Scope};

#[derive(derive_more::Debug)]
pub struct MiniJinjaEngine {
    #[debug(skip)]
    env: Environment<'static>,
    /// The last `site` converted to a template value, keyed by identity.
    #[debug(skip)]
    site: Mutex<Option<(Arc<serde_json::Value>, Value)>>,
}

fn init_env(config: &Config) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_loader(path_loader(config.includes_path()));
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_keep_trailing_newline(true);

    env.add_global("G", Value::from_serialize(&config.settings.globals));
    env.add_function("now", ext::now);
    env.add_filter("date", ext::date);
    env.add_filter("deslug", ext::deslug);
    env.add_filter("split", ext::split);
    env
}

impl MiniJinjaEngine {
    fn site_value(&self, site: &Arc<serde_json::Value>) -> Value {
        let mut cached = self.site.lock();
        match &*cached {
            Some((key, value)) if Arc::ptr_eq(key, site) => value.clone(),
            _ => {
                let value = Value::from_serialize(&**site);
                *cached = Some((site.clone(), value.clone()));
                value
            }
        }
    }
}

impl EngineInit for MiniJinjaEngine {
    type Engine = Self;

    fn init(config: &Config) -> Self::Engine {
        MiniJinjaEngine { env: init_env(config), site: Mutex::new(None) }
    }
}

impl Engine for MiniJinjaEngine {
    fn render(&self, name: &str, template: &str, scope: &Scope<'_>) -> Result<String> {
        let context = context! {
            content => scope.content,
            page => Value::from_serialize(scope.page),
            site => self.site_value(scope.site),
        };

        Ok(self.env.render_named_str(name, template, context)?)
    }
}

mod ext {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use minijinja::{value::Value, Error, ErrorKind};

    pub fn deslug(value: &str) -> String {
        value.replace('-', " ")
    }

    pub fn date(value: Value, fmt: &str) -> Result<Value, Error> {
        if let Ok(ts) = i64::try_from(value.clone()) {
            let datetime = DateTime::<Utc>::from_timestamp(ts, 0)
                .ok_or_else(|| Error::new(
                    ErrorKind::InvalidOperation,
                    "invalid timestamp provided to `date`"
                ))?;

            return Ok(datetime.format(fmt).to_string().into());
        }

        let kind = value.kind();
        let attr = value.get_attr("$__toml_private_datetime");
        let string = attr.as_ref()
            .ok()
            .and_then(|v| v.as_str())
            .or_else(|| value.as_str())
            .ok_or_else(|| Error::new(
                ErrorKind::InvalidOperation,
                format!("`date` must be applied to a string or integer, found {kind}")
            ))?;

        let datetime = string.parse::<DateTime<Utc>>().map(|dt| dt.format(fmt))
            .or_else(|_| string.parse::<NaiveDateTime>().map(|dt| dt.format(fmt)))
            .or_else(|_| string.parse::<NaiveDate>().map(|d| d.format(fmt)))
            .or_else(|_| string.parse::<NaiveTime>().map(|t| t.format(fmt)))
            .map_err(|e| Error::new(
                ErrorKind::InvalidOperation,
                format!("failed to parse {string}: {e}")
            ))?;

        Ok(datetime.to_string().into())
    }

    pub fn split(value: &str, pat: &str, n: Option<usize>) -> Result<Value, Error> {
        match n {
            Some(n) => Ok(value.split(pat).nth(n).map(Value::from).unwrap_or(Value::UNDEFINED)),
            None => Ok(value.split(pat).map(Value::from).collect()),
        }
    }

    /// Seconds since the Unix epoch.
    pub fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}

impl_error_detail_with_std_error!(minijinja::Error);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn render(engine: &MiniJinjaEngine, template: &str, page: serde_json::Value) -> String {
        let site = Arc::new(json!({ "posts": [{ "title": "One" }, { "title": "Two" }] }));
        let scope = Scope { content: "<p>body</p>", page: &page, site: &site };
        engine.render("test.html", template, &scope).unwrap()
    }

    #[test]
    fn scope_globals_and_no_escaping() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::new(dir.path());
        config.settings.globals.insert("title".into(), json!("Site"));
        let engine = MiniJinjaEngine::init(&config);

        let out = render(&engine, "{{ G.title }}|{{ content }}|{{ page.title }}\n", json!({ "title": "T" }));
        assert_eq!(out, "Site|<p>body</p>|T\n");

        let out = render(&engine, "{% for p in site.posts %}{{ p.title }},{% endfor %}", json!({}));
        assert_eq!(out, "One,Two,");
    }

    #[test]
    fn includes_resolve_from_includes_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("_includes")).unwrap();
        std::fs::write(dir.path().join("_includes/nav.html"), "<nav>{{ page.title }}</nav>").unwrap();

        let engine = MiniJinjaEngine::init(&Config::new(dir.path()));
        let out = render(&engine, "{% include \"nav.html\" %}", json!({ "title": "Home" }));
        assert_eq!(out, "<nav>Home</nav>");
    }

    #[test]
    fn date_filter() {
        let engine = MiniJinjaEngine::init(&Config::new("."));
        let page = json!({ "date": "2024-01-01T00:00:00.000Z", "day": "2024-03-05", "ts": 0 });
        let out = render(&engine, "{{ page.date | date('%Y/%m/%d') }} {{ page.day | date('%b') }} {{ page.ts | date('%Y') }}", page);
        assert_eq!(out, "2024/01/01 Mar 1970");
    }

    #[test]
    fn string_filters() {
        let engine = MiniJinjaEngine::init(&Config::new("."));
        let page = json!({ "slug": "hello-big-world" });
        let out = render(&engine, "{{ page.slug | deslug }}|{{ page.slug | split('-', 1) }}|{{ page.slug | split('-') | length }}", page);
        assert_eq!(out, "hello big world|big|3");
    }

    #[test]
    fn template_errors_name_the_template() {
        let engine = MiniJinjaEngine::init(&Config::new("."));
        let site = Arc::new(json!({}));
        let scope = Scope { content: "", page: &json!({}), site: &site };
        let error = engine.render("broken.html", "{% if %}", &scope).unwrap_err();
        assert!(error.to_string().contains("broken.html"));
    }
}
