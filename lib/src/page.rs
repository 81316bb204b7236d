use serde::Serialize;
use chrono::{DateTime, NaiveDate, NaiveTime};

use crate::error::Result;
use crate::frontmatter;
use crate::markdown::{MarkdownRenderer, PlainText};
use crate::metadata::{Date, Metadata};

/// The kind of pages outside any `_<kind>/` directory.
pub const DEFAULT_KIND: &str = "page";

/// One content file, parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// `/`-separated path relative to the project root.
    pub relative_path: String,
    pub url: String,
    pub kind: String,
    pub content: String,
    pub meta: Metadata,
    /// Relative path of the sibling scope generator, if there is one.
    pub scope_generator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Html,
    Markdown,
    Text,
}

impl Format {
    fn of(relative_path: &str) -> Option<Format> {
        match relative_path.rsplit_once('.')?.1 {
            "html" => Some(Format::Html),
            "md" => Some(Format::Markdown),
            "txt" => Some(Format::Text),
            _ => None,
        }
    }
}

pub fn is_content(relative_path: &str) -> bool {
    Format::of(relative_path).is_some()
}

impl Page {
    /// Builds a page from the raw text of the content file at
    /// `relative_path`. Markdown and text bodies are converted to HTML.
    pub fn parse(
        relative_path: &str,
        raw: &str,
        markdown: &dyn MarkdownRenderer,
        scope_generator: Option<String>,
    ) -> Result<Page> {
        let (mut meta, mut content) = frontmatter::parse(raw, relative_path)?;
        let (kind, url) = url_for(relative_path);

        match Format::of(relative_path) {
            Some(Format::Markdown) => content = markdown.to_html(&content)?,
            Some(Format::Text) => content = PlainText.to_html(&content)?,
            _ => {}
        }

        if !meta.contains(Date) {
            let file_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
            if let Some(date) = date_prefix(file_name) {
                meta.insert(Date, date.format("%Y-%m-%dT00:00:00.000Z").to_string())?;
            }
        }

        Ok(Page {
            relative_path: relative_path.to_string(),
            url,
            kind,
            content,
            meta,
            scope_generator,
        })
    }

    /// The raw `date` metadata, when it is a string.
    pub fn date(&self) -> Option<&str> {
        self.meta.get_str(Date)
    }

    /// The page's date in milliseconds since the epoch, when `date` parses
    /// as an RFC 3339 timestamp or a plain `YYYY-MM-DD` date.
    pub fn timestamp(&self) -> Option<i64> {
        let date = self.date()?.trim();
        DateTime::parse_from_rfc3339(date).map(|dt| dt.timestamp_millis())
            .or_else(|_| NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp_millis()))
            .ok()
    }
}

/// Derives `(kind, url)` from a relative path.
///
/// A leading `_<kind>/` segment sets the kind and becomes `<kind>/` in the
/// URL. Markdown and text sources map to `.html`.
pub fn url_for(relative_path: &str) -> (String, String) {
    let (kind, rest) = match kind_prefix(relative_path) {
        Some((kind, rest)) => (kind, format!("{kind}/{rest}")),
        None => (DEFAULT_KIND, relative_path.to_string()),
    };

    let url = match Format::of(&rest) {
        Some(Format::Markdown | Format::Text) => {
            let (stem, _) = rest.rsplit_once('.').unwrap_or((&rest, ""));
            format!("/{stem}.html")
        }
        _ => format!("/{rest}"),
    };

    (kind.to_string(), url)
}

fn kind_prefix(relative_path: &str) -> Option<(&str, &str)> {
    let (first, rest) = relative_path.strip_prefix('_')?.split_once('/')?;
    let valid = !first.is_empty() && !first.contains(['.', '|']);
    valid.then_some((first, rest))
}

/// Parses a leading `YYYY-M(M)-D(D)-` from a file name.
fn date_prefix(file_name: &str) -> Option<NaiveDate> {
    let mut parts = file_name.splitn(4, '-');
    let mut number = |min: usize, max: usize| {
        parts.next()
            .filter(|p| (min..=max).contains(&p.len()) && p.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|p| p.parse::<u32>().ok())
    };

    let (year, month, day) = (number(4, 4)?, number(1, 2)?, number(1, 2)?);
    parts.next()?;
    NaiveDate::from_ymd_opt(year as i32, month, day)
}

/// Finds the scope generator for the content file at `relative_path`: a
/// sibling with the same stem and one of `extensions`, for which `exists`
/// returns `true`. The first extension wins.
pub fn scope_sibling<F>(relative_path: &str, extensions: &[&str], exists: F) -> Option<String>
    where F: Fn(&str) -> bool
{
    let (stem, _) = relative_path.rsplit_once('.')?;
    extensions.iter()
        .map(|ext| format!("{stem}.{ext}"))
        .find(|candidate| exists(candidate))
}
