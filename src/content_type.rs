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

//! MIME content type handling.

use crate::parse::{is_token_char, strip_lenient_value, strip_quoted_string, strip_token};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ContentTypeError;

impl Display for ContentTypeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid content type")
    }
}

impl Error for ContentTypeError {}

/// A MIME content type with its parameters.
///
/// Type and subtype are stored in lower case. Parameter names are compared
/// case-insensitively; parameters keep the order in which they were given.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentType {
    media_type: String,
    media_subtype: String,
    parameters: Vec<(String, String)>,
}

impl ContentType {
    pub fn new(media_type: impl Into<String>, media_subtype: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into().to_ascii_lowercase(),
            media_subtype: media_subtype.into().to_ascii_lowercase(),
            parameters: vec![],
        }
    }

    /// The implied content type of a part without a *Content-Type* header,
    /// see RFC 2045, section 5.2.
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "us-ascii")
    }

    /// Parses a *Content-Type* header value.
    ///
    /// Parsing is lenient: unquoted values may contain tspecials such as `/`,
    /// and a parameter that cannot be parsed is skipped up to the next `;`.
    /// RFC 5322 comments are ignored.
    pub fn parse(s: &str) -> Result<Self, ContentTypeError> {
        let s = s.trim_start();
        let (media_type, s) = strip_token(s).ok_or(ContentTypeError)?;
        let s = s.trim_start().strip_prefix('/').ok_or(ContentTypeError)?;
        let (media_subtype, mut s) = strip_token(s.trim_start()).ok_or(ContentTypeError)?;

        let mut content_type = Self::new(media_type, media_subtype);

        while let Some(rest) = skip_to_parameter(s) {
            s = match strip_parameter(rest) {
                Some((name, value, rest)) => {
                    content_type.set_parameter(name, value);
                    rest
                }
                None => rest,
            };
        }

        Ok(content_type)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn media_subtype(&self) -> &str {
        &self.media_subtype
    }

    /// Returns the combined `type/subtype` string.
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.media_type, self.media_subtype)
    }

    pub fn is_mime_type(&self, media_type: &str, media_subtype: &str) -> bool {
        self.media_type.eq_ignore_ascii_case(media_type)
            && self.media_subtype.eq_ignore_ascii_case(media_subtype)
    }

    pub fn is_multipart(&self) -> bool {
        self.media_type == "multipart"
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Sets a parameter, replacing the value of an existing parameter of the
    /// same name in place.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.parameters.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some((_, v)) => *v = value,
            None => self.parameters.push((name, value)),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter(name, value);
        self
    }

    pub fn remove_parameter(&mut self, name: &str) {
        self.parameters.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }
}

// Returns the input following the next `;`, if any.
fn skip_to_parameter(s: &str) -> Option<&str> {
    s.find(';').map(|i| &s[(i + 1)..])
}

fn strip_parameter(s: &str) -> Option<(&str, String, &str)> {
    let (name, rest) = strip_token(s.trim_start())?;
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    match strip_quoted_string(rest) {
        Some((value, rest)) => Some((name, value, rest)),
        None => {
            let (value, rest) = strip_lenient_value(rest)?;
            Some((name, value.to_owned(), rest))
        }
    }
}

impl Display for ContentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.media_type, self.media_subtype)?;

        for (name, value) in &self.parameters {
            if !value.is_empty() && value.chars().all(is_token_char) {
                write!(f, "; {name}={value}")?;
            } else {
                f.write_str("; ")?;
                f.write_str(name)?;
                f.write_str("=\"")?;
                for c in value.chars() {
                    if matches!(c, '"' | '\\') {
                        f.write_str("\\")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("\"")?;
            }
        }

        Ok(())
    }
}
