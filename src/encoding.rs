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

//! Content transfer encodings.
//!
//! See RFC 2045, section 6.

use crate::{
    parse::split_line,
    util::{self, CanonicalStr},
};
use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str,
};

/// Maximum length of an encoded line, excluding the line break.
const MAX_LINE_LENGTH: usize = 76;

/// A content transfer encoding.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum TransferEncoding {
    #[default]
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
}

impl TransferEncoding {
    /// Parses a *Content-Transfer-Encoding* value. Unrecognised values are
    /// treated as the default, `7bit`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.eq_ignore_ascii_case("8bit") {
            Self::EightBit
        } else if s.eq_ignore_ascii_case("binary") {
            Self::Binary
        } else if s.eq_ignore_ascii_case("base64") {
            Self::Base64
        } else if s.eq_ignore_ascii_case("quoted-printable") {
            Self::QuotedPrintable
        } else {
            Self::SevenBit
        }
    }

    /// Encodes content for transfer in this encoding.
    pub fn encode(self, content: &[u8]) -> Vec<u8> {
        match self {
            Self::SevenBit | Self::EightBit | Self::Binary => content.to_vec(),
            Self::Base64 => encode_base64_lines(content),
            Self::QuotedPrintable => encode_quoted_printable(content),
        }
    }

    /// Decodes transfer-encoded content.
    pub fn decode(self, encoded: &[u8]) -> Result<Vec<u8>, DecodeError> {
        match self {
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(encoded.to_vec()),
            Self::Base64 => {
                let s = str::from_utf8(encoded).map_err(|_| DecodeError::Base64)?;
                util::decode_base64(s).map_err(|_| DecodeError::Base64)
            }
            Self::QuotedPrintable => decode_quoted_printable(encoded),
        }
    }
}

impl CanonicalStr for TransferEncoding {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
        }
    }
}

impl Display for TransferEncoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DecodeError {
    Base64,
    QuotedPrintable,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base64 => write!(f, "failed to decode Base64 data"),
            Self::QuotedPrintable => write!(f, "failed to decode Quoted-Printable data"),
        }
    }
}

impl Error for DecodeError {}

/// Encodes bytes as Base64 in lines of 76 characters, each terminated by
/// CRLF.
pub fn encode_base64_lines(content: &[u8]) -> Vec<u8> {
    let encoded = util::encode_base64(content);

    let mut result = Vec::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2 + 2);
    for line in encoded.as_bytes().chunks(MAX_LINE_LENGTH) {
        result.extend(line);
        result.extend(b"\r\n");
    }
    result
}

/// Encodes bytes as Quoted-Printable.
///
/// LF and CRLF are taken as line breaks and written as CRLF. Whitespace at the
/// end of a line is always encoded, so stripping trailing whitespace from the
/// output never changes the decoded content.
pub fn encode_quoted_printable(content: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(content.len() + content.len() / 8);

    let mut lines = content.split(|&b| b == b'\n').peekable();

    while let Some(line) = lines.next() {
        let is_last = lines.peek().is_none();
        if is_last {
            encode_qp_line(&mut result, line);
        } else {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            encode_qp_line(&mut result, line);
            result.extend(b"\r\n");
        }
    }

    result
}

fn encode_qp_line(result: &mut Vec<u8>, line: &[u8]) {
    let mut column = 0;

    for (i, &b) in line.iter().enumerate() {
        let last = i + 1 == line.len();

        let literal = match b {
            b'!'..=b'<' | b'>'..=b'~' => true,
            b' ' | b'\t' => !last,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // room must remain for a soft line break unless this is the end
        let limit = if last { MAX_LINE_LENGTH } else { MAX_LINE_LENGTH - 1 };
        if column + width > limit {
            result.extend(b"=\r\n");
            column = 0;
        }

        if literal {
            result.push(b);
        } else {
            result.push(b'=');
            result.push(hex_digit(b >> 4));
            result.push(hex_digit(b & 0xf));
        }
        column += width;
    }
}

fn hex_digit(n: u8) -> u8 {
    debug_assert!(n < 0x10);
    b"0123456789ABCDEF"[usize::from(n)]
}

/// Decodes Quoted-Printable content.
///
/// Trailing whitespace on each line is dropped, soft line breaks are removed,
/// and hard line breaks are kept as they appear in the input.
pub fn decode_quoted_printable(encoded: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut result = Vec::with_capacity(encoded.len());

    let mut rest = encoded;

    while !rest.is_empty() {
        let (line, line_break, next) = split_line(rest);

        let line = line.trim_end_with(|c| matches!(c, ' ' | '\t'));

        match line.strip_suffix(b"=") {
            Some(line) => decode_qp_line(&mut result, line)?,
            None => {
                decode_qp_line(&mut result, line)?;
                result.extend(line_break);
            }
        }

        rest = next;
    }

    Ok(result)
}

fn decode_qp_line(result: &mut Vec<u8>, line: &[u8]) -> Result<(), DecodeError> {
    let mut bytes = line.iter();

    while let Some(&b) = bytes.next() {
        if b == b'=' {
            let d1 = bytes.next().copied().filter(u8::is_ascii_hexdigit)
                .ok_or(DecodeError::QuotedPrintable)?;
            let d2 = bytes.next().copied().filter(u8::is_ascii_hexdigit)
                .ok_or(DecodeError::QuotedPrintable)?;
            result.push(u8_from_digits(d1, d2));
        } else {
            result.push(b);
        }
    }

    Ok(())
}

fn u8_from_digits(c1: u8, c2: u8) -> u8 {
    // Strictly speaking, only uppercase hex digits are allowed in
    // Quoted-Printable, but there is no harm in accepting lowercase, too.
    fn to_u8(c: u8) -> u8 {
        match c {
            b'0'..=b'9' => c - b'0',
            b'A'..=b'F' => c - b'A' + 0xa,
            b'a'..=b'f' => c - b'a' + 0xa,
            _ => unreachable!(),
        }
    }

    debug_assert!(c1.is_ascii_hexdigit() && c2.is_ascii_hexdigit());

    to_u8(c1) * 0x10 + to_u8(c2)
}
