use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::path::Path;

use crate::error::Error;
use crate::util::escape_html;

/// Served for unknown paths when the project has no 404 page.
pub const NOT_FOUND_PAGE: &str = "<!DOCTYPE html>\n<html><body><p>404 - not found :(</p></body></html>\n";

/// A dev server response, independent of the HTTP library serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// A response with caching disabled and no other headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Response {
            status,
            headers: vec![("Cache-Control", "no-store".into())],
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// The value of the first header called `name`, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn html(status: u16, html: impl Into<String>) -> Self {
        Response::new(status, html.into()).with_header("Content-Type", "text/html; charset=utf-8")
    }

    /// The reload probe's answer.
    pub fn probe(last_refresh: &str) -> Self {
        let body = serde_json::json!({ "lastRefresh": last_refresh }).to_string();
        Response::new(200, body).with_header("Content-Type", "application/json")
    }

    /// The bytes of the static file at `relative`. Unknown extensions get no
    /// `Content-Type`.
    pub fn file(relative: &str, bytes: Vec<u8>) -> Self {
        let response = Response::new(200, bytes);
        match content_type(relative) {
            Some(content_type) => response.with_header("Content-Type", content_type),
            None => response,
        }
    }

    /// The built-in `404` page, passed through `finish` so the caller can
    /// add the reload client.
    pub fn not_found(finish: impl FnOnce(String) -> String) -> Self {
        Response::html(404, finish(NOT_FOUND_PAGE.to_string()))
    }

    pub fn method_not_allowed() -> Self {
        Response::new(405, "405 - method not allowed")
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_header("Allow", "GET, HEAD")
    }

    /// A `500` page describing `error` and its full chain.
    pub fn error(error: &Error) -> Self {
        Response::html(500, error_page(&error.to_string(), &error.trace()))
    }

    /// A `500` page for a caught panic.
    pub fn panic(message: &str, backtrace: &Backtrace) -> Self {
        Response::html(500, error_page(message, &backtrace.to_string()))
    }
}

/// The content type served for a static file, by extension.
pub fn content_type<P: AsRef<Path>>(path: P) -> Option<&'static str> {
    let ext = path.as_ref().extension()?.to_str()?;
    let content_type = match &*ext.to_ascii_lowercase() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        "xml" => "application/xml; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        _ => return None,
    };

    Some(content_type)
}

/// Inserts the live-reload client before the last `</body>`, or appends it
/// when there is none. The client polls `probe_path` every `interval_ms` and
/// reloads once the answer differs from `last_refresh`.
pub fn inject_reload(html: &str, probe_path: &str, interval_ms: u64, last_refresh: &str) -> String {
    let script = reload_script(probe_path, interval_ms, last_refresh);
    match html.rfind("</body>") {
        Some(i) => {
            let mut output = String::with_capacity(html.len() + script.len());
            output.push_str(&html[..i]);
            output.push_str(&script);
            output.push_str(&html[i..]);
            output
        }
        None => format!("{html}{script}"),
    }
}

fn reload_script(probe_path: &str, interval_ms: u64, last_refresh: &str) -> String {
    // JSON string literals are valid JavaScript string literals.
    let path = serde_json::Value::from(probe_path);
    let last = serde_json::Value::from(last_refresh);
    format!("<script>(function () {{\
        var last = {last};\
        setInterval(function () {{\
            fetch({path}, {{ cache: \"no-store\" }})\
                .then(function (r) {{ return r.json(); }})\
                .then(function (d) {{ if (d.lastRefresh !== last) location.reload(); }})\
                .catch(function () {{}});\
        }}, {interval_ms});\
    }})();</script>")
}

fn error_page(message: &str, trace: &str) -> String {
    format!("<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>500 - error</title></head>\n\
        <body>\n<h1>500 - error</h1>\n<pre>{}</pre>\n<h2>trace</h2>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(message), escape_html(trace))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types() {
        assert_eq!(content_type("a/b.css"), Some("text/css; charset=utf-8"));
        assert_eq!(content_type("logo.PNG"), Some("image/png"));
        assert_eq!(content_type("favicon.ico"), Some("image/x-icon"));
        assert_eq!(content_type("data.xyz"), None);
        assert_eq!(content_type("Makefile"), None);

        let response = Response::file("data.xyz", vec![1, 2, 3]);
        assert!(response.header("content-type").is_none());
        assert_eq!(response.header("cache-control"), Some("no-store"));
        assert_eq!(response.body, [1, 2, 3]);
    }

    #[test]
    fn probe_is_json() {
        let response = Response::probe("2024-01-01T00:00:00.000Z");
        let value: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(value, serde_json::json!({ "lastRefresh": "2024-01-01T00:00:00.000Z" }));
        assert_eq!(response.status, 200);
    }

    #[test]
    fn reload_script_placement() {
        let html = inject_reload("<body>a</body><body>b</body>", "/probe", 500, "t");
        assert!(html.starts_with("<body>a</body><body>b<script>"));
        assert!(html.ends_with("</script></body>"));
        assert!(html.contains("fetch(\"/probe\""));
        assert!(html.contains("var last = \"t\";"));
        assert!(html.contains("}, 500);"));

        let html = inject_reload("plain", "/probe", 500, "t");
        assert!(html.starts_with("plain<script>"));
    }

    #[test]
    fn error_pages_escape() {
        let error = crate::error::Error::from("bad <tag>");
        let response = Response::error(&error);
        assert_eq!(response.status, 500);
        let text = response.text();
        assert!(text.contains("bad &lt;tag&gt;"));
        assert!(!text.contains("<tag>"));
    }
}
