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

//! Common parsing utilities.

pub const CRLF: &[u8] = b"\r\n";

// RFC 2045, section 5.1: tspecials
pub fn is_tspecial(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '='
    )
}

pub fn is_token_char(c: char) -> bool {
    c.is_ascii_graphic() && !is_tspecial(c)
}

/// Strips a leading RFC 2045 *token*, returning the token and the rest.
pub fn strip_token(input: &str) -> Option<(&str, &str)> {
    let rest = input.trim_start_matches(is_token_char);
    if rest.len() == input.len() {
        return None;
    }
    Some((&input[..(input.len() - rest.len())], rest))
}

/// Strips a leading unquoted parameter value, accepting tspecials other than
/// `;` and `(`. The value ends at whitespace.
pub fn strip_lenient_value(input: &str) -> Option<(&str, &str)> {
    let rest = input.trim_start_matches(|c: char| c.is_ascii_graphic() && !matches!(c, ';' | '(' | '"'));
    if rest.len() == input.len() {
        return None;
    }
    Some((&input[..(input.len() - rest.len())], rest))
}

/// Strips a leading RFC 5322 *quoted-string*, returning the unescaped content
/// and the rest.
pub fn strip_quoted_string(input: &str) -> Option<(String, &str)> {
    let mut chars = input.strip_prefix('"')?.char_indices();
    let mut result = String::new();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((result, &input[(i + 2)..])),
            '\\' => {
                let (_, escaped) = chars.next()?;
                result.push(escaped);
            }
            '\r' | '\n' => {}
            c => result.push(c),
        }
    }

    None
}

/// Splits a byte slice at the first line break, returning the line without
/// its terminator, the terminator, and the rest. Both CRLF and bare LF are
/// recognised.
pub fn split_line(input: &[u8]) -> (&[u8], &[u8], &[u8]) {
    match input.iter().position(|&b| b == b'\n') {
        Some(i) => {
            if i > 0 && input[i - 1] == b'\r' {
                (&input[..(i - 1)], &input[(i - 1)..=i], &input[(i + 1)..])
            } else {
                (&input[..i], &input[i..=i], &input[(i + 1)..])
            }
        }
        None => (input, &input[input.len()..], &input[input.len()..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_token_ok() {
        assert_eq!(strip_token("multipart/signed"), Some(("multipart", "/signed")));
        assert_eq!(strip_token("pgp-sha256; x"), Some(("pgp-sha256", "; x")));
        assert_eq!(strip_token("\"abc\""), None);
        assert_eq!(strip_token(""), None);
    }

    #[test]
    fn strip_lenient_value_ok() {
        assert_eq!(
            strip_lenient_value("application/pgp-signature; x"),
            Some(("application/pgp-signature", "; x"))
        );
        assert_eq!(strip_lenient_value("=-a=(c)"), Some(("=-a=", "(c)")));
        assert_eq!(strip_lenient_value("\"q\""), None);
        assert_eq!(strip_lenient_value("; x"), None);
    }

    #[test]
    fn strip_quoted_string_ok() {
        assert_eq!(
            strip_quoted_string("\"application/pgp-signature\"; x"),
            Some(("application/pgp-signature".to_owned(), "; x"))
        );
        assert_eq!(strip_quoted_string("\"a\\\"b\""), Some(("a\"b".to_owned(), "")));
        assert_eq!(strip_quoted_string("\"open"), None);
        assert_eq!(strip_quoted_string("none"), None);
    }

    #[test]
    fn split_line_ok() {
        assert_eq!(split_line(b"ab\r\ncd"), (&b"ab"[..], &b"\r\n"[..], &b"cd"[..]));
        assert_eq!(split_line(b"ab\ncd"), (&b"ab"[..], &b"\n"[..], &b"cd"[..]));
        assert_eq!(split_line(b"ab"), (&b"ab"[..], &b""[..], &b""[..]));
        assert_eq!(split_line(b"\r\n"), (&b""[..], &b"\r\n"[..], &b""[..]));
    }
}
