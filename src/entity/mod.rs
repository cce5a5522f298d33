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

//! The MIME entity tree.
//!
//! An [`Entity`] is one of a closed set of node kinds: a leaf part, a generic
//! multipart container, the two security multiparts `multipart/signed` and
//! `multipart/encrypted`, or a `message/rfc822` wrapper.
//!
//! Entities are parsed from and written to bytes losslessly: parsing input
//! that uses CRLF line endings and writing the result reproduces the input
//! exactly. Leaf parts keep their body in transfer-encoded form for this
//! reason.

mod parse;
mod write;

pub use parse::{ParseConfig, ParseError};

use crate::{
    content_type::ContentType,
    encoding::{DecodeError, TransferEncoding},
    header::{HeaderFieldError, HeaderFields},
    util::{self, CanonicalStr},
};
use sha2::{Digest, Sha256};
use std::{
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};

/// A MIME entity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Entity {
    /// A leaf part with content.
    Part(MimePart),
    /// A multipart container other than the security multiparts.
    Multipart(Multipart),
    /// A `multipart/signed` container.
    Signed(MultipartSigned),
    /// A `multipart/encrypted` container.
    Encrypted(MultipartEncrypted),
    /// A `message/rfc822` part wrapping an embedded message.
    Message(MessagePart),
}

impl Entity {
    /// Parses an entity from bytes using the default configuration.
    pub fn parse(input: &[u8]) -> Result<Self, ParseError> {
        Self::parse_with_config(input, &ParseConfig::default())
    }

    pub fn parse_with_config(input: &[u8], config: &ParseConfig) -> Result<Self, ParseError> {
        parse::parse_entity(input, config, 0)
    }

    pub fn headers(&self) -> &HeaderFields {
        match self {
            Self::Part(p) => &p.headers,
            Self::Multipart(m)
            | Self::Signed(MultipartSigned(m))
            | Self::Encrypted(MultipartEncrypted(m)) => &m.headers,
            Self::Message(m) => &m.headers,
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderFields {
        match self {
            Self::Part(p) => &mut p.headers,
            Self::Multipart(m)
            | Self::Signed(MultipartSigned(m))
            | Self::Encrypted(MultipartEncrypted(m)) => &mut m.headers,
            Self::Message(m) => &mut m.headers,
        }
    }

    /// Returns the content type, or the RFC 2045 default `text/plain` if the
    /// *Content-Type* header is absent or cannot be parsed.
    pub fn content_type(&self) -> ContentType {
        content_type_of(self.headers())
    }

    pub fn set_content_type(&mut self, content_type: &ContentType) -> Result<(), HeaderFieldError> {
        self.headers_mut().set("Content-Type", &content_type.to_string())
    }

    pub fn as_part(&self) -> Option<&MimePart> {
        match self {
            Self::Part(p) => Some(p),
            _ => None,
        }
    }

    /// Writes the entity to a byte buffer.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        write::write_entity(self, out);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![];
        self.write_to(&mut out);
        out
    }
}

impl From<MimePart> for Entity {
    fn from(part: MimePart) -> Self {
        Self::Part(part)
    }
}

impl From<Multipart> for Entity {
    fn from(multipart: Multipart) -> Self {
        Self::Multipart(multipart)
    }
}

impl From<MultipartSigned> for Entity {
    fn from(signed: MultipartSigned) -> Self {
        Self::Signed(signed)
    }
}

impl From<MultipartEncrypted> for Entity {
    fn from(encrypted: MultipartEncrypted) -> Self {
        Self::Encrypted(encrypted)
    }
}

impl From<MessagePart> for Entity {
    fn from(message: MessagePart) -> Self {
        Self::Message(message)
    }
}

fn content_type_of(headers: &HeaderFields) -> ContentType {
    headers
        .get_unfolded("Content-Type")
        .and_then(|s| ContentType::parse(&s).ok())
        .unwrap_or_else(ContentType::text_plain)
}

/// A leaf part.
///
/// The body is kept exactly as transferred, that is, in the encoding named by
/// the *Content-Transfer-Encoding* header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MimePart {
    headers: HeaderFields,
    body: Vec<u8>,
}

impl MimePart {
    /// Creates a part with the given content, encoded in the given transfer
    /// encoding.
    pub fn new(content_type: &ContentType, encoding: TransferEncoding, content: &[u8]) -> Self {
        let mut headers = HeaderFields::new();
        // content type and encoding formatting always yields valid field bodies
        let _ = headers.set("Content-Type", &content_type.to_string());
        if encoding != TransferEncoding::SevenBit {
            let _ = headers.set("Content-Transfer-Encoding", encoding.canonical_str());
        }

        Self {
            headers,
            body: encoding.encode(content),
        }
    }

    /// Creates a part from headers and an already transfer-encoded body.
    pub fn from_raw(headers: HeaderFields, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderFields {
        &mut self.headers
    }

    pub fn content_type(&self) -> ContentType {
        content_type_of(&self.headers)
    }

    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get_unfolded("Content-Transfer-Encoding")
            .map_or(TransferEncoding::SevenBit, |s| TransferEncoding::parse(&s))
    }

    /// Changes the transfer encoding, re-encoding the body.
    ///
    /// Setting the current encoding again leaves the part untouched.
    pub fn set_transfer_encoding(&mut self, encoding: TransferEncoding) -> Result<(), DecodeError> {
        let current = self.transfer_encoding();
        if current == encoding {
            return Ok(());
        }

        self.body = current.decode(&self.body)?;
        self.encode_raw_body(encoding);

        Ok(())
    }

    // Encodes the body as it stands, which must be unencoded content, and
    // records the new transfer encoding.
    pub(crate) fn encode_raw_body(&mut self, encoding: TransferEncoding) {
        self.body = encoding.encode(&self.body);
        // canonical encoding names are always valid field bodies
        let _ = self.headers.set("Content-Transfer-Encoding", encoding.canonical_str());
    }

    /// The body as transferred.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decodes the body according to its transfer encoding.
    pub fn decode_content(&self) -> Result<Vec<u8>, DecodeError> {
        self.transfer_encoding().decode(&self.body)
    }

    /// Replaces the content, encoding it in the current transfer encoding.
    pub fn set_content(&mut self, content: &[u8]) {
        self.body = self.transfer_encoding().encode(content);
    }
}

/// A multipart container.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Multipart {
    headers: HeaderFields,
    boundary: String,
    preamble: Option<Vec<u8>>,
    parts: Vec<Entity>,
    epilogue: Option<Vec<u8>>,
}

impl Multipart {
    /// Creates an empty `multipart/<subtype>` container with a fresh boundary.
    pub fn new(subtype: &str) -> Self {
        let boundary = generate_boundary();
        let content_type = ContentType::new("multipart", subtype)
            .with_parameter("boundary", boundary.clone());

        let mut headers = HeaderFields::new();
        // a formatted content type is always a valid field body
        let _ = headers.set("Content-Type", &content_type.to_string());

        Self {
            headers,
            boundary,
            preamble: None,
            parts: vec![],
            epilogue: None,
        }
    }

    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderFields {
        &mut self.headers
    }

    pub fn content_type(&self) -> ContentType {
        content_type_of(&self.headers)
    }

    /// Sets the content type. The boundary parameter is always kept in sync
    /// with the container's boundary.
    pub fn set_content_type(&mut self, content_type: &ContentType) -> Result<(), HeaderFieldError> {
        let mut content_type = content_type.clone();
        content_type.set_parameter("boundary", self.boundary.clone());
        self.headers.set("Content-Type", &content_type.to_string())
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[Entity] {
        &self.parts
    }

    pub fn parts_mut(&mut self) -> &mut Vec<Entity> {
        &mut self.parts
    }

    pub fn push(&mut self, entity: impl Into<Entity>) {
        self.parts.push(entity.into());
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.parts.get(index)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn preamble(&self) -> Option<&[u8]> {
        self.preamble.as_deref()
    }

    pub fn set_preamble(&mut self, preamble: Option<Vec<u8>>) {
        self.preamble = preamble;
    }

    pub fn epilogue(&self) -> Option<&[u8]> {
        self.epilogue.as_deref()
    }
}

/// A `multipart/signed` container (RFC 1847, section 2.1).
///
/// The first child is the signed content, the second the detached signature.
/// Signing and verification are found in [`MultipartSigned::sign`] and
/// [`MultipartSigned::verify`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MultipartSigned(pub(crate) Multipart);

/// A `multipart/encrypted` container (RFC 1847, section 2.2).
///
/// The first child is the protocol version part, the second the encrypted
/// payload. Encryption and decryption are found in
/// [`MultipartEncrypted::encrypt`] and [`MultipartEncrypted::decrypt`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MultipartEncrypted(pub(crate) Multipart);

macro_rules! security_multipart {
    ($name:ident, $subtype:literal) => {
        impl $name {
            /// Creates an empty container with a fresh boundary.
            pub fn new() -> Self {
                Self(Multipart::new($subtype))
            }

            pub fn into_inner(self) -> Multipart {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Deref for $name {
            type Target = Multipart;

            fn deref(&self) -> &Multipart {
                &self.0
            }
        }

        impl DerefMut for $name {
            fn deref_mut(&mut self) -> &mut Multipart {
                &mut self.0
            }
        }
    };
}

security_multipart!(MultipartSigned, "signed");
security_multipart!(MultipartEncrypted, "encrypted");

/// A `message/rfc822` part.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MessagePart {
    headers: HeaderFields,
    message: Option<Box<Entity>>,
}

impl MessagePart {
    pub fn new(message: Option<Entity>) -> Self {
        let mut headers = HeaderFields::new();
        let _ = headers.set("Content-Type", "message/rfc822");
        Self {
            headers,
            message: message.map(Box::new),
        }
    }

    pub fn headers(&self) -> &HeaderFields {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderFields {
        &mut self.headers
    }

    pub fn message(&self) -> Option<&Entity> {
        self.message.as_deref()
    }

    pub fn message_mut(&mut self) -> Option<&mut Entity> {
        self.message.as_deref_mut()
    }
}

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a fresh multipart boundary.
///
/// Boundaries start with `=-`, a sequence that cannot occur in Base64 or
/// Quoted-Printable encoded content.
pub fn generate_boundary() -> String {
    let bytes = util::random_bytes::<18>().unwrap_or_else(|_| {
        // no system randomness: derive from time and a process-wide counter
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let count = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
        let digest = Sha256::new()
            .chain_update(nanos.to_be_bytes())
            .chain_update(count.to_be_bytes())
            .chain_update(std::process::id().to_be_bytes())
            .finalize();
        let mut bytes = [0; 18];
        bytes.copy_from_slice(&digest[..18]);
        bytes
    });

    format!("=-{}", util::encode_base64(bytes))
}
