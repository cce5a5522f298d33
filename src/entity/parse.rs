// viamime – implementation of the MIME security multiparts
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Entity parser.

use super::{Entity, MessagePart, MimePart, Multipart, MultipartEncrypted, MultipartSigned};
use crate::{
    content_type::ContentType,
    header::{FieldBody, FieldName, HeaderFields},
    parse::split_line,
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str,
};
use tracing::trace;

/// Configuration for entity parsing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseConfig {
    /// Maximum nesting depth of multiparts and embedded messages.
    pub max_depth: usize,
    /// Maximum number of header fields per entity.
    pub max_header_fields: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            max_header_fields: 1000,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ParseError {
    InvalidHeaderField,
    TooManyHeaderFields,
    MissingBoundary,
    NestingTooDeep,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHeaderField => write!(f, "invalid header field"),
            Self::TooManyHeaderFields => write!(f, "too many header fields"),
            Self::MissingBoundary => write!(f, "multipart without boundary"),
            Self::NestingTooDeep => write!(f, "entities nested too deeply"),
        }
    }
}

impl Error for ParseError {}

pub(super) fn parse_entity(
    input: &[u8],
    config: &ParseConfig,
    depth: usize,
) -> Result<Entity, ParseError> {
    if depth > config.max_depth {
        return Err(ParseError::NestingTooDeep);
    }

    let (headers, body) = parse_header_block(input, config)?;

    let content_type = headers
        .get_unfolded("Content-Type")
        .and_then(|s| ContentType::parse(&s).ok());

    match content_type {
        Some(ct) if ct.is_multipart() => {
            let boundary = ct.boundary().ok_or(ParseError::MissingBoundary)?;
            if boundary.is_empty() {
                return Err(ParseError::MissingBoundary);
            }

            let multipart = parse_multipart(headers, boundary, body, config, depth)?;

            Ok(match ct.media_subtype() {
                "signed" => Entity::Signed(MultipartSigned(multipart)),
                "encrypted" => Entity::Encrypted(MultipartEncrypted(multipart)),
                _ => Entity::Multipart(multipart),
            })
        }
        Some(ct) if ct.is_mime_type("message", "rfc822") => {
            let message = if body.is_empty() {
                None
            } else {
                Some(Box::new(parse_entity(body, config, depth + 1)?))
            };
            Ok(Entity::Message(MessagePart { headers, message }))
        }
        _ => Ok(Entity::Part(MimePart::from_raw(headers, body.to_vec()))),
    }
}

// Parses the header block up to and including the blank line, returning the
// header fields and the body. Continuation lines are rejoined with CRLF.
fn parse_header_block<'a>(
    input: &'a [u8],
    config: &ParseConfig,
) -> Result<(HeaderFields, &'a [u8]), ParseError> {
    let mut headers = HeaderFields::new();
    let mut current: Option<(&[u8], Vec<u8>)> = None;

    let mut rest = input;

    while !rest.is_empty() {
        let (line, _, next) = split_line(rest);
        rest = next;

        if line.is_empty() {
            break;
        }

        if matches!(line[0], b' ' | b'\t') {
            let (_, body) = current.as_mut().ok_or(ParseError::InvalidHeaderField)?;
            body.extend(b"\r\n");
            body.extend(line);
        } else {
            if let Some((name, body)) = current.take() {
                push_field(&mut headers, name, body, config)?;
            }
            let colon = line
                .iter()
                .position(|&b| b == b':')
                .ok_or(ParseError::InvalidHeaderField)?;
            current = Some((&line[..colon], line[(colon + 1)..].to_vec()));
        }
    }

    if let Some((name, body)) = current {
        push_field(&mut headers, name, body, config)?;
    }

    Ok((headers, rest))
}

fn push_field(
    headers: &mut HeaderFields,
    name: &[u8],
    body: Vec<u8>,
    config: &ParseConfig,
) -> Result<(), ParseError> {
    if headers.len() >= config.max_header_fields {
        return Err(ParseError::TooManyHeaderFields);
    }

    let name = str::from_utf8(name).map_err(|_| ParseError::InvalidHeaderField)?;
    let name = FieldName::new(name).map_err(|_| ParseError::InvalidHeaderField)?;
    let body = FieldBody::new(body).map_err(|_| ParseError::InvalidHeaderField)?;

    headers.push(name, body);

    Ok(())
}

// Splits a multipart body at its delimiter lines (RFC 2046, section 5.1.1).
// The line break before a delimiter belongs to the delimiter, not to the
// preceding content.
fn parse_multipart(
    headers: HeaderFields,
    boundary: &str,
    body: &[u8],
    config: &ParseConfig,
    depth: usize,
) -> Result<Multipart, ParseError> {
    let delimiter = [b"--", boundary.as_bytes()].concat();

    let mut preamble = None;
    let mut parts = vec![];
    let mut epilogue = None;

    // start of the current part's content, None while in the preamble
    let mut content_start: Option<usize> = None;
    // offset of the line break preceding the current line
    let mut break_start = 0;
    let mut pos = 0;

    while pos < body.len() {
        let (line, line_break, _) = split_line(&body[pos..]);
        let next = pos + line.len() + line_break.len();

        if let Some(after) = line.strip_prefix(&delimiter[..]) {
            let (is_close, padding) = match after.strip_prefix(b"--") {
                Some(padding) => (true, padding),
                None => (false, after),
            };

            if padding.iter().all(|&b| matches!(b, b' ' | b'\t')) {
                match content_start {
                    None => {
                        if pos > 0 {
                            preamble = Some(body[..break_start].to_vec());
                        }
                    }
                    Some(start) => {
                        let end = break_start.max(start);
                        parts.push(parse_entity(&body[start..end], config, depth + 1)?);
                    }
                }

                if is_close {
                    epilogue = Some(body[(pos + line.len())..].to_vec());
                    break;
                }

                content_start = Some(next);
            }
        }

        break_start = pos + line.len();
        pos = next;
    }

    if epilogue.is_none() {
        trace!("multipart without close delimiter");
        match content_start {
            Some(start) => {
                let start = start.min(body.len());
                parts.push(parse_entity(&body[start..], config, depth + 1)?);
            }
            None => {
                if !body.is_empty() {
                    preamble = Some(body.to_vec());
                }
            }
        }
    }

    Ok(Multipart {
        headers,
        boundary: boundary.to_owned(),
        preamble,
        parts,
        epilogue,
    })
}
