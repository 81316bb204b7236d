use std::borrow::Cow;

use pulldown_cmark::Event;

use crate::error::Result;

/// A hook into markdown conversion: rewrite the source before parsing, or
/// the event stream before it is rendered to HTML.
pub trait Plugin: Send + Sync {
    #[inline(always)]
    fn preprocess<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        Ok(Cow::Borrowed(input))
    }

    #[inline(always)]
    fn remap<'a>(&self, event: Event<'a>) -> Event<'a> {
        event
    }
}

/// Preserves explicit `<br>` line breaks by forcing a newline after each.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineBreaks;

impl Plugin for LineBreaks {
    fn preprocess<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        match memchr::memmem::find(input.as_bytes(), b"<br>") {
            Some(_) => Ok(Cow::Owned(input.replace("<br>", "<br>\n"))),
            None => Ok(Cow::Borrowed(input)),
        }
    }
}
