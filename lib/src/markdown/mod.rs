mod plugin;

use std::fmt::Debug;

use pulldown_cmark::{html, Options, Parser};

use crate::error::Result;

pub use plugin::{Plugin, LineBreaks};

/// Converts markdown text to HTML.
pub trait MarkdownRenderer: Send + Sync + Debug {
    fn to_html(&self, text: &str) -> Result<String>;
}

/// CommonMark with the usual extensions, via `pulldown-cmark`.
#[derive(Debug, Clone, Copy)]
pub struct CommonMark<P = LineBreaks> {
    options: Options,
    plugin: P,
}

impl Default for CommonMark {
    fn default() -> Self {
        CommonMark::with_plugin(LineBreaks)
    }
}

impl<P: Plugin> CommonMark<P> {
    pub fn with_plugin(plugin: P) -> Self {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_HEADING_ATTRIBUTES;

        CommonMark { options, plugin }
    }
}

impl<P: Plugin + Debug> MarkdownRenderer for CommonMark<P> {
    fn to_html(&self, text: &str) -> Result<String> {
        let input = self.plugin.preprocess(text)?;
        let parser = Parser::new_ext(&input, self.options)
            .map(|event| self.plugin.remap(event));

        let mut output = String::with_capacity(input.len() * 3 / 2);
        html::push_html(&mut output, parser);
        Ok(output)
    }
}

/// Converts plain text to HTML by turning every newline into `<br>\n`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainText;

impl MarkdownRenderer for PlainText {
    fn to_html(&self, text: &str) -> Result<String> {
        Ok(text.replace("\r\n", "\n").replace('\n', "<br>\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_extensions_are_enabled() {
        let html = CommonMark::default().to_html("# Hi\n\n~~gone~~\n\n| a |\n|---|\n| b |\n").unwrap();
        assert!(html.contains("<h1>Hi</h1>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("<table>"));
    }

    #[test]
    fn explicit_breaks_get_a_newline() {
        let input = LineBreaks.preprocess("one<br>two").unwrap();
        assert_eq!(input, "one<br>\ntwo");
        assert!(matches!(LineBreaks.preprocess("plain").unwrap(), std::borrow::Cow::Borrowed(_)));
    }

    #[test]
    fn plain_text_breaks_lines() {
        assert_eq!(PlainText.to_html("a\nb\r\nc").unwrap(), "a<br>\nb<br>\nc");
    }
}
