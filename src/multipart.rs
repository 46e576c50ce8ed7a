//! Binary-safe splitting of `multipart/form-data` bodies.

use std::ops::Range;

use lazy_static::lazy_static;
use log::debug;
use memchr::memmem;
use regex::Regex;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

lazy_static! {
    static ref DISPOSITION: Regex =
        Regex::new(r"(?im)^content-disposition:[ \t]*([^\r\n]*)").expect("disposition regex");
    static ref NAME: Regex = Regex::new(r#"(?i)\bname="([^"]*)""#).expect("name regex");
    static ref FILENAME: Regex = Regex::new(r#"(?i)\bfilename="([^"]*)""#).expect("filename regex");
}

/// One segment of a multipart body. `body` borrows from the request buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart<'a> {
    pub headers: String,
    pub body: &'a [u8],
}

/// Field name and client filename taken from a part's `Content-Disposition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDisposition {
    pub name: String,
    pub filename: Option<String>,
}

/// The part picked as the uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart<'a> {
    pub filename: String,
    pub body: &'a [u8],
}

impl<'a> MultipartPart<'a> {
    pub fn disposition(&self) -> Option<ParsedDisposition> {
        parse_disposition(&self.headers)
    }
}

/// Pulls the boundary out of a `multipart/form-data` content type.
///
/// Returns `None` for any other media type or when the parameter is missing or empty.
pub fn get_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let media_type = params.next()?.trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }

    for param in params {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("boundary") {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        if value.is_empty() {
            return None;
        }
        return Some(value.to_string());
    }
    None
}

/// Ranges of `body` that hold part content, in order.
///
/// Splits at each `--boundary`, trims the CRLF the framing puts on either side,
/// drops the preamble and empty fragments, and stops at the close delimiter.
pub fn split_ranges(body: &[u8], boundary: &str) -> Vec<Range<usize>> {
    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();

    let mut starts = memmem::find_iter(body, delimiter).peekable();
    let mut ranges = Vec::new();

    while let Some(pos) = starts.next() {
        let start = pos + delimiter.len();
        let end = starts.peek().copied().unwrap_or(body.len());
        let fragment = &body[start..end];

        if fragment.starts_with(b"--") {
            break;
        }

        let mut range = start..end;
        if fragment.starts_with(CRLF) {
            range.start += CRLF.len();
        }
        if body[range.clone()].ends_with(CRLF) {
            range.end -= CRLF.len();
        }
        if !range.is_empty() {
            ranges.push(range);
        }
    }
    ranges
}

/// Splits one fragment into its header text and raw body.
///
/// `None` when the fragment has no blank line separating the two.
pub fn split_part(fragment: &[u8]) -> Option<MultipartPart<'_>> {
    let split = memmem::find(fragment, HEADER_END)?;
    Some(MultipartPart {
        headers: String::from_utf8_lossy(&fragment[..split]).into_owned(),
        body: &fragment[split + HEADER_END.len()..],
    })
}

/// Every well-formed part of `body`, malformed fragments skipped.
pub fn parse<'a>(body: &'a [u8], boundary: &str) -> Vec<MultipartPart<'a>> {
    split_ranges(body, boundary)
        .into_iter()
        .filter_map(|range| {
            let part = split_part(&body[range.clone()]);
            if part.is_none() {
                debug!("skipping malformed multipart fragment at {:?}", range);
            }
            part
        })
        .collect()
}

pub fn parse_disposition(headers: &str) -> Option<ParsedDisposition> {
    let line = DISPOSITION.captures(headers)?.get(1)?.as_str();
    let name = NAME.captures(line)?.get(1)?.as_str().to_string();
    let filename = FILENAME
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    Some(ParsedDisposition { name, filename })
}

/// First part named `field` that carries a non-empty filename.
///
/// Later parts are never decomposed once a match is found.
pub fn find_file_part<'a>(body: &'a [u8], boundary: &str, field: &str) -> Option<FilePart<'a>> {
    split_ranges(body, boundary).into_iter().find_map(|range| {
        let part = split_part(&body[range])?;
        let disposition = part.disposition()?;
        if disposition.name != field {
            return None;
        }
        match disposition.filename {
            Some(filename) if !filename.is_empty() => Some(FilePart {
                filename,
                body: part.body,
            }),
            _ => None,
        }
    })
}
