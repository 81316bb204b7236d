use crate::error::{ErrorKind, Result};
use crate::metadata::Metadata;

const DELIMITER: &str = "---";

/// Splits `text` into its front matter and body.
///
/// A block opens when the first non-blank line is exactly `---` and closes
/// at the next line that is exactly `---`. Without a closing delimiter there
/// is no block: metadata is empty and the body is `text`, untouched. With a
/// block, the body is everything after the closing delimiter, trimmed.
///
/// Every line inside the block, blank ones included, must be `key: value`. The key is
/// the trimmed text before the first colon; the value is the trimmed rest
/// with one pair of matching `"` or `'` removed. Later keys overwrite
/// earlier ones. `relative_path` is only used in error messages.
pub fn parse(text: &str, relative_path: &str) -> Result<(Metadata, String)> {
    let mut lines = Lines::new(text);
    let opened = lines.by_ref()
        .find(|(line, _)| !line.trim().is_empty())
        .map_or(false, |(line, _)| is_delimiter(line));

    if !opened {
        return Ok((Metadata::new(), text.to_string()));
    }

    let mut block = vec![];
    let body_start = loop {
        match lines.next() {
            Some((line, end)) if is_delimiter(line) => break end,
            Some((line, _)) => block.push(line),
            None => return Ok((Metadata::new(), text.to_string())),
        }
    };

    let mut meta = Metadata::new();
    for line in block {
        let line = line.trim_end_matches('\r');
        let Some((key, value)) = line.split_once(':') else {
            return Err(error! {
                "invalid front matter: expected `key: value`",
                "file" => relative_path,
                "line" => line.trim(),
            }.with_kind(ErrorKind::Parse));
        };

        meta.insert_raw(key.trim(), unquote(value.trim()));
    }

    Ok((meta, text[body_start..].trim().to_string()))
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end_matches('\r') == DELIMITER
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }

    value
}

/// Lines without their `\n`, paired with the byte offset just past them.
struct Lines<'a> {
    text: &'a str,
    offset: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Lines { text, offset: 0 }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = (&'a str, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.text.get(self.offset..).filter(|r| !r.is_empty())?;
        let (line, consumed) = match memchr::memchr(b'\n', rest.as_bytes()) {
            Some(i) => (&rest[..i], i + 1),
            None => (rest, rest.len()),
        };

        self.offset += consumed;
        Some((line, self.offset))
    }
}
