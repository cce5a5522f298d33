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

//! Representation of MIME header data.
//!
//! Header fields are stored in the order they were given, with their bodies
//! kept exactly as they appeared after the colon, including any leading
//! whitespace and folding. This is what makes writing a parsed entity back out
//! reproduce the original bytes.

use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    str,
};

pub type HeaderField = (FieldName, FieldBody);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeaderFieldError;

impl Display for HeaderFieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid header field")
    }
}

impl Error for HeaderFieldError {}

/// An ordered, mutable collection of header fields.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct HeaderFields(Vec<HeaderField>);

impl HeaderFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(value: Vec<(String, Vec<u8>)>) -> Result<Self, HeaderFieldError> {
        let value = value
            .into_iter()
            .map(|(name, value)| {
                let name = FieldName::new(name)?;
                let body = FieldBody::new(value)?;
                Ok((name, body))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self(value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends a header field.
    pub fn push(&mut self, name: FieldName, body: FieldBody) {
        self.0.push((name, body));
    }

    /// Returns the body of the first field with the given name.
    pub fn get(&self, name: &str) -> Option<&FieldBody> {
        self.0.iter().find(|(n, _)| *n == name).map(|(_, body)| body)
    }

    /// Returns the body of the first field with the given name as a string,
    /// with folding removed and surrounding whitespace trimmed.
    pub fn get_unfolded(&self, name: &str) -> Option<String> {
        self.get(name).map(FieldBody::unfold)
    }

    /// Replaces the body of the first field with the given name, removing any
    /// further fields of that name. If there is no such field, a new one is
    /// appended.
    ///
    /// The value is stored with a single leading space, as is customary.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), HeaderFieldError> {
        let body = FieldBody::new(format!(" {value}").into_bytes())?;

        match self.0.iter().position(|(n, _)| *n == name) {
            Some(i) => {
                self.0[i].1 = body;
                let mut index = 0;
                self.0.retain(|(n, _)| {
                    let keep = index <= i || *n != name;
                    index += 1;
                    keep
                });
            }
            None => {
                let name = FieldName::new(name)?;
                self.0.push((name, body));
            }
        }

        Ok(())
    }

    /// Removes all fields with the given name.
    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| *n != name);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.0.iter()
    }

    /// Writes the header fields, each terminated by CRLF, without the blank
    /// line separating header and body.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for (name, body) in &self.0 {
            out.extend(name.as_ref().bytes());
            out.push(b':');
            out.extend(body.as_ref());
            out.extend(b"\r\n");
        }
    }
}

impl AsRef<[HeaderField]> for HeaderFields {
    fn as_ref(&self) -> &[HeaderField] {
        &self.0
    }
}

impl From<HeaderFields> for Vec<HeaderField> {
    fn from(headers: HeaderFields) -> Self {
        headers.0
    }
}

impl Debug for HeaderFields {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// A header field name, compared case-insensitively.
#[derive(Clone, Eq)]
pub struct FieldName(Box<str>);

impl FieldName {
    pub fn new(value: impl Into<Box<str>>) -> Result<Self, HeaderFieldError> {
        let value = value.into();
        if value.is_empty() {
            return Err(HeaderFieldError);
        }
        if !value.chars().all(|c| c.is_ascii_graphic() && c != ':') {
            return Err(HeaderFieldError);
        }
        Ok(Self(value))
    }
}

impl AsRef<str> for FieldName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Debug for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl PartialEq for FieldName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl PartialEq<&str> for FieldName {
    fn eq(&self, other: &&str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq<str> for FieldName {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl Hash for FieldName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_ascii_lowercase().hash(state);
    }
}

/// A raw header field body: everything after the colon, folding included.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct FieldBody(Box<[u8]>);

impl FieldBody {
    pub fn new(value: impl Into<Box<[u8]>>) -> Result<Self, HeaderFieldError> {
        let value = value.into();
        // only folded continuation lines, no trailing CRLF; whitespace-only
        // lines are obsolete syntax but accepted (RFC 5322, section 4.2)
        if !(value.split_str("\r\n").skip(1).all(|line| line.starts_with(b" ") || line.starts_with(b"\t"))) {
            return Err(HeaderFieldError);
        }
        // no stray CR and LF
        if !(value.split_str("\r\n").all(|line| !line.contains(&b'\r') && !line.contains(&b'\n'))) {
            return Err(HeaderFieldError);
        }
        // allow all other bytes, UTF-8 not required to accomodate eg mistaken Latin 1 bytes
        Ok(Self(value))
    }

    /// Returns the body with line folding removed and surrounding whitespace
    /// trimmed. Ill-formed UTF-8 is replaced.
    pub fn unfold(&self) -> String {
        let unfolded: Vec<u8> = self.0.replace("\r\n", "");
        String::from_utf8_lossy(unfolded.trim_with(|c| matches!(c, ' ' | '\t'))).into_owned()
    }
}

impl AsRef<[u8]> for FieldBody {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for FieldBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldBody")
            .field(&self.0.as_bstr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_name_ok() {
        assert!(FieldName::new("abc").is_ok());

        assert!(FieldName::new("abc ").is_err());
        assert!(FieldName::new("a:c").is_err());
    }

    #[test]
    fn field_body_ok() {
        assert!(FieldBody::new(*b" ab\r\n\tcd ").is_ok());
        assert!(FieldBody::new(*b"\r\n\ta").is_ok());
        assert!(FieldBody::new(*b"  ").is_ok());
        assert!(FieldBody::new(*b" \r\n \r\n a").is_ok());

        assert!(FieldBody::new(*b" \r\na").is_err());
        assert!(FieldBody::new(*b" \r\n\r\n a").is_err());
        assert!(FieldBody::new(*b" \na").is_err());
        assert!(FieldBody::new(*b" abc\r\n").is_err());
    }

    #[test]
    fn field_name_debug() {
        let name = FieldName::new("Content-Type").unwrap();
        assert_eq!(format!("{name:?}"), "\"Content-Type\"");
    }

    #[test]
    fn field_body_unfold() {
        let body = FieldBody::new(*b" multipart/signed;\r\n\tprotocol=x ").unwrap();
        assert_eq!(body.unfold(), "multipart/signed;\tprotocol=x");
    }

    #[test]
    fn header_fields_set_replaces_first_and_drops_rest() {
        let mut headers = HeaderFields::from_vec(vec![
            ("Content-Type".to_owned(), b" text/plain".to_vec()),
            ("X-Other".to_owned(), b" 1".to_vec()),
            ("content-type".to_owned(), b" text/html".to_vec()),
        ])
        .unwrap();

        headers.set("CONTENT-TYPE", "image/png").unwrap();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get_unfolded("content-type").as_deref(), Some("image/png"));

        headers.set("Content-Transfer-Encoding", "base64").unwrap();

        let mut out = vec![];
        headers.write_to(&mut out);
        assert_eq!(
            out.as_bstr(),
            "Content-Type: image/png\r\nX-Other: 1\r\nContent-Transfer-Encoding: base64\r\n"
        );
    }
}
