//! Escaping and unescaping for HTML, URLs and JSON, plus `linkify`.
//!
//! Everything here is a pure function over its input.

use std::borrow::Cow;
use std::io;
use std::sync::LazyLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::EscapeError;

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#?)(\w+?);").expect("static regex should not panic"));

static SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x20]+").expect("static regex should not panic"));

// Scheme-prefixed or `www.` URLs. Trailing punctuation is left out of the
// match, and the only entities allowed inside are `&amp;` and `&quot;`
// because the text is escaped before matching.
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r##"\b((?:([\w-]+):(/{1,3})|www[.])(?:(?:(?:[^\s&()]|&amp;|&quot;)*(?:[^!"#$%&'()*+,.:;<=>?@\[\]^`{|}~\s]))|(?:\((?:[^\s&()]|&amp;|&quot;)*\)))+)"##,
    )
    .expect("static regex should not panic")
});

/// Bytes left as-is by `url_escape`; space is handled separately.
const URL_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// Escape `& < > " '` for use in HTML/XML text and attribute values.
pub fn xhtml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Decode named and numeric character references. Unknown or invalid
/// references are left untouched.
pub fn xhtml_unescape(value: &str) -> String {
    ENTITY_RE
        .replace_all(value, |caps: &Captures| {
            let decoded = if caps[1].is_empty() {
                named_entity(&caps[2])
            } else {
                numeric_entity(&caps[2])
            };
            match decoded {
                Some(ch) => ch.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn numeric_entity(reference: &str) -> Option<char> {
    let code = match reference.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => reference.parse().ok()?,
    };
    char::from_u32(code)
}

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "hellip" => '\u{2026}',
        "middot" => '\u{b7}',
        "deg" => '\u{b0}',
        "euro" => '\u{20ac}',
        "pound" => '\u{a3}',
        "yen" => '\u{a5}',
        "cent" => '\u{a2}',
        "sect" => '\u{a7}',
        "para" => '\u{b6}',
        "times" => '\u{d7}',
        "divide" => '\u{f7}',
        _ => return None,
    };
    Some(ch)
}

/// `", "` / `": "` separators, matching the conventional pretty-compact
/// JSON layout.
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Serialize `value` to JSON with sorted object keys.
///
/// `</` is written as `<\/` so the output can sit inside a `<script>` block.
pub fn json_encode<T>(value: &T) -> Result<String, serde_json::Error>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value)?;
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).replace("</", "<\\/"))
}

pub fn json_decode<T>(value: impl AsRef<[u8]>) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(value.as_ref())
}

/// Collapse runs of whitespace and control characters into one space.
pub fn squeeze(value: &str) -> String {
    SPACE_RE.replace_all(value, " ").trim().to_string()
}

/// Form-style URL escaping: space becomes `+`, everything outside
/// `[A-Za-z0-9_.~-]` is percent-encoded.
pub fn url_escape(value: &str) -> String {
    utf8_percent_encode(value, URL_SAFE)
        .to_string()
        .replace("%20", "+")
}

/// Reverse `url_escape`, decoding the result as UTF-8.
pub fn url_unescape(value: &str) -> Result<String, EscapeError> {
    let spaced = value.replace('+', " ");
    let decoded = percent_decode_str(&spaced).decode_utf8()?;
    Ok(decoded.into_owned())
}

/// Reverse `url_escape` without assuming any text encoding.
pub fn url_unescape_bytes(value: &str) -> Vec<u8> {
    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced).collect()
}

/// The UTF-8 bytes of `value`. Byte input is returned unchanged.
pub fn utf8<T>(value: &T) -> &[u8]
where
    T: AsRef<[u8]> + ?Sized,
{
    value.as_ref()
}

/// `value` as text. Strings pass through; bytes must be valid UTF-8.
pub fn to_unicode<T>(value: &T) -> Result<&str, EscapeError>
where
    T: AsRef<[u8]> + ?Sized,
{
    Ok(std::str::from_utf8(value.as_ref())?)
}

/// Native string form of `value`; identical to `to_unicode`.
pub fn to_basestring<T>(value: &T) -> Result<&str, EscapeError>
where
    T: AsRef<[u8]> + ?Sized,
{
    to_unicode(value)
}

/// A nested structure that may still hold undecoded bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Bytes(Vec<u8>),
    Text(String),
    List(Vec<RawValue>),
    Map(Vec<(RawValue, RawValue)>),
    Scalar(Value),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<&[u8]> for RawValue {
    fn from(value: &[u8]) -> Self {
        RawValue::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(value: Vec<u8>) -> Self {
        RawValue::Bytes(value)
    }
}

/// Decode every byte string in `value` as UTF-8, walking lists and maps.
/// Map keys become strings; non-string scalar keys use their JSON text.
pub fn recursive_unicode(value: RawValue) -> Result<Value, EscapeError> {
    Ok(match value {
        RawValue::Bytes(bytes) => Value::String(to_unicode(&bytes)?.to_string()),
        RawValue::Text(text) => Value::String(text),
        RawValue::List(items) => Value::Array(
            items
                .into_iter()
                .map(recursive_unicode)
                .collect::<Result<_, _>>()?,
        ),
        RawValue::Map(entries) => {
            let mut members = serde_json::Map::new();
            for (key, item) in entries {
                let key = match recursive_unicode(key)? {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                members.insert(key, recursive_unicode(item)?);
            }
            Value::Object(members)
        }
        RawValue::Scalar(scalar) => scalar,
    })
}

/// Extra attributes for links produced by `linkify`.
#[derive(Default)]
pub enum ExtraParams<'a> {
    #[default]
    None,
    /// Same attributes on every link, e.g. `rel="nofollow"`.
    Static(&'a str),
    /// Attributes computed from each link's `href`.
    Computed(&'a dyn Fn(&str) -> String),
}

pub struct LinkifyOptions<'a> {
    /// Clip long link text, keeping the full URL in a `title` attribute.
    pub shorten: bool,
    pub extra_params: ExtraParams<'a>,
    /// Leave `www.` matches without a scheme as plain text.
    pub require_protocol: bool,
    /// Schemes that may be linked; URLs with any other scheme stay text.
    pub permitted_protocols: &'a [&'a str],
}

impl Default for LinkifyOptions<'_> {
    fn default() -> Self {
        Self {
            shorten: false,
            extra_params: ExtraParams::None,
            require_protocol: false,
            permitted_protocols: &["http", "https"],
        }
    }
}

const LINK_MAX_LEN: usize = 30;

/// HTML-escape `text` and wrap every URL in it in an anchor tag.
pub fn linkify(text: &str, options: &LinkifyOptions<'_>) -> String {
    let escaped = xhtml_escape(text);
    URL_RE
        .replace_all(&escaped, |caps: &Captures| make_link(caps, options))
        .into_owned()
}

fn make_link(caps: &Captures, options: &LinkifyOptions<'_>) -> String {
    let url = &caps[1];
    let proto = caps.get(2).map(|m| m.as_str());

    match proto {
        None if options.require_protocol => return url.to_string(),
        Some(scheme) if !options.permitted_protocols.iter().any(|p| *p == scheme) => {
            return url.to_string()
        }
        _ => {}
    }

    let href: Cow<'_, str> = match proto {
        Some(_) => Cow::Borrowed(url),
        None => Cow::Owned(format!("http://{url}")),
    };
    let mut params = match &options.extra_params {
        ExtraParams::None => String::new(),
        ExtraParams::Static(extra) if extra.trim().is_empty() => String::new(),
        ExtraParams::Static(extra) => format!(" {}", extra.trim()),
        ExtraParams::Computed(extra) => format!(" {}", extra(href.as_ref()).trim()),
    };

    let mut shown = url.to_string();
    if options.shorten && char_len(url) > LINK_MAX_LEN {
        let proto_len = match proto {
            Some(scheme) => scheme.chars().count() + 1 + caps.get(3).map_or(0, |m| m.as_str().len()),
            None => 0,
        };
        let rest: String = url.chars().skip(proto_len).collect();
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() > 1 {
            // Host plus the start of the first path segment.
            let head: String = url.chars().take(proto_len).collect();
            let segment: String = parts[1].chars().take(8).collect();
            let segment = segment
                .split('?')
                .next()
                .unwrap_or_default()
                .split('.')
                .next()
                .unwrap_or_default();
            shown = format!("{head}{}/{segment}", parts[0]);
        }

        if char_len(&shown) * 2 > LINK_MAX_LEN * 3 {
            shown = shown.chars().take(LINK_MAX_LEN).collect();
        }

        if shown != url {
            // Never cut an entity in half.
            if let Some(amp) = shown.rfind('&') {
                if char_len(&shown[..amp]) > LINK_MAX_LEN - 5 {
                    shown.truncate(amp);
                }
            }
            shown.push_str("...");
            if char_len(&shown) >= char_len(url) {
                shown = url.to_string();
            } else {
                params.push_str(&format!(" title=\"{href}\""));
            }
        }
    }

    format!("<a href=\"{href}\"{params}>{shown}</a>")
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}
