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

//! A library implementing the MIME security multiparts `multipart/signed` and
//! `multipart/encrypted` described in [RFC 1847], the envelope format shared by
//! PGP/MIME ([RFC 3156]) and S/MIME ([RFC 8551]).
//!
//! The library builds and validates the envelopes: it prepares the entity to
//! be protected, canonicalizes it, hands the canonical bytes to a
//! cryptography backend, and assembles the resulting two-part container.
//! Validation checks the envelope structure and its *protocol* parameter
//! before calling the backend to verify signatures or decrypt content.
//!
//! The cryptography itself is behind the [`CryptoContext`] trait. A complete
//! context backed by in-memory RSA, Ed25519, and X25519 keys is included as
//! [`KeyringContext`].
//!
//! # Usage
//!
//! [`MultipartSigned::sign`] and [`MultipartSigned::verify`] sign and verify,
//! [`MultipartEncrypted::encrypt`], [`MultipartEncrypted::sign_and_encrypt`],
//! and [`MultipartEncrypted::decrypt`] encrypt and decrypt. All of them take
//! an optional context; when none is given, the context registered for the
//! protocol in the process-wide [`registry`] is used.
//!
//! ```
//! use viamime::{
//!     crypto::DigestAlgorithm, Entity, KeyringContext, MultipartSigned, SignRequest, SigningKey,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let pem = std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/keys/ed25519.pem"))?;
//! let mut keyring = KeyringContext::new();
//! keyring.add_signing_key("me@example.com", SigningKey::from_pkcs8_pem(&pem)?)?;
//!
//! let mut entity = Entity::parse(b"Content-Type: text/plain\r\n\r\nHello!\r\n")?;
//! let request = SignRequest::new("me@example.com", DigestAlgorithm::Sha256);
//!
//! let signed = MultipartSigned::sign(Some(&keyring), &request, &mut entity)?;
//!
//! let results = signed.verify(Some(&keyring))?;
//! assert!(results[0].is_valid());
//! # Ok(())
//! # }
//! ```
//!
//! # Cargo features
//!
//! The feature **`sha1`** enables dependency `sha1` and thereby the insecure,
//! historic SHA-1 digest algorithm. This is a legacy compatibility feature,
//! its use is strongly discouraged.
//!
//! [RFC 1847]: https://www.rfc-editor.org/rfc/rfc1847
//! [RFC 3156]: https://www.rfc-editor.org/rfc/rfc3156
//! [RFC 8551]: https://www.rfc-editor.org/rfc/rfc8551

pub mod canonicalize;
pub mod content_type;
pub mod crypto;
pub mod encoding;
mod encrypted;
pub mod entity;
mod envelope;
pub mod header;
pub mod keyring;
mod parse;
pub mod prepare;
pub mod registry;
mod signed;
mod util;

pub use crate::{
    content_type::ContentType,
    crypto::{CryptoContext, CryptoError, Decrypted, SignatureResult, SignatureStatus, SigningKey},
    encoding::TransferEncoding,
    encrypted::{EncryptRequest, DEFAULT_ENCRYPTION_PROTOCOL},
    entity::{Entity, MessagePart, MimePart, Multipart, MultipartEncrypted, MultipartSigned},
    envelope::{EnvelopeError, MalformedKind},
    header::{FieldBody, FieldName, HeaderField, HeaderFields},
    keyring::KeyringContext,
    prepare::prepare_entity,
    registry::ContextRegistry,
    signed::{SignRequest, DEFAULT_SIGNATURE_PROTOCOL},
    util::{decode_base64, encode_base64, Base64Error, CanonicalStr},
};
