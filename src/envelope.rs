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

//! Shared envelope validation and context resolution.

use crate::{
    content_type::ContentType,
    crypto::{CryptoContext, CryptoError},
    entity::{Entity, MimePart, Multipart, ParseError},
    registry,
};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    ops::Deref,
    sync::Arc,
};
use tracing::trace;

/// The way in which an envelope's structure is unusable.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum MalformedKind {
    /// The envelope has fewer than two children.
    MissingParts,
    /// The signature child is not a leaf part.
    SignatureNotLeaf,
    /// The signature content cannot be decoded.
    UndecodableSignature,
    /// The version child is not a leaf part.
    VersionNotLeaf,
    /// The version child's type does not equal the protocol.
    VersionTypeMismatch,
    /// The ciphertext child is not a leaf part.
    CiphertextNotLeaf,
    /// The ciphertext content cannot be decoded.
    UndecodableCiphertext,
    /// The ciphertext child is not `application/octet-stream`.
    CiphertextTypeMismatch,
}

impl Display for MalformedKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingParts => write!(f, "fewer than two body parts"),
            Self::SignatureNotLeaf => write!(f, "signature is not a leaf part"),
            Self::UndecodableSignature => write!(f, "signature content cannot be decoded"),
            Self::VersionNotLeaf => write!(f, "version part is not a leaf part"),
            Self::VersionTypeMismatch => write!(f, "version part type does not match protocol"),
            Self::CiphertextNotLeaf => write!(f, "encrypted content is not a leaf part"),
            Self::UndecodableCiphertext => write!(f, "encrypted content cannot be decoded"),
            Self::CiphertextTypeMismatch => write!(f, "encrypted content is not application/octet-stream"),
        }
    }
}

/// An error that occurs when building or validating an envelope.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EnvelopeError {
    /// A required argument is empty.
    InvalidArgument(&'static str),
    /// The envelope has no usable *protocol* parameter.
    MissingProtocol,
    /// The context does not support the protocol or part type named.
    UnsupportedProtocol(String),
    MalformedEnvelope(MalformedKind),
    /// No registered context supports the protocol named.
    NoDefaultContext(String),
    /// Canonical or decrypted data is not a valid entity.
    Entity(ParseError),
    /// The cryptography context reported an error.
    Crypto(CryptoError),
}

impl Display for EnvelopeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(name) => write!(f, "invalid argument: {name}"),
            Self::MissingProtocol => write!(f, "missing protocol parameter"),
            Self::UnsupportedProtocol(p) => write!(f, "unsupported protocol: {p}"),
            Self::MalformedEnvelope(kind) => write!(f, "malformed envelope: {kind}"),
            Self::NoDefaultContext(p) => write!(f, "no cryptography context registered for {p}"),
            Self::Entity(e) => write!(f, "invalid entity: {e}"),
            Self::Crypto(e) => e.fmt(f),
        }
    }
}

impl Error for EnvelopeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Entity(e) => Some(e),
            Self::Crypto(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CryptoError> for EnvelopeError {
    fn from(error: CryptoError) -> Self {
        Self::Crypto(error)
    }
}

impl From<ParseError> for EnvelopeError {
    fn from(error: ParseError) -> Self {
        Self::Entity(error)
    }
}

/// A cryptography context, either given by the caller or looked up in the
/// process-wide registry.
pub(crate) enum ResolvedContext<'a> {
    Given(&'a dyn CryptoContext),
    Registered(Arc<dyn CryptoContext>),
}

impl ResolvedContext<'_> {
    /// Whether the context was given by the caller.
    pub(crate) fn is_given(&self) -> bool {
        matches!(self, Self::Given(_))
    }
}

impl<'a> Deref for ResolvedContext<'a> {
    type Target = dyn CryptoContext + 'a;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Given(ctx) => *ctx,
            Self::Registered(ctx) => ctx.as_ref(),
        }
    }
}

/// Returns the given context, or else the registered context for the
/// protocol.
pub(crate) fn resolve_context<'a>(
    ctx: Option<&'a dyn CryptoContext>,
    protocol: &str,
) -> Result<ResolvedContext<'a>, EnvelopeError> {
    match ctx {
        Some(ctx) => Ok(ResolvedContext::Given(ctx)),
        None => {
            trace!(protocol, "looking up default cryptography context");
            registry::lookup(protocol).map(ResolvedContext::Registered)
        }
    }
}

/// Reads the *protocol* parameter of an envelope, lower-cased.
pub(crate) fn protocol_parameter(content_type: &ContentType) -> Result<String, EnvelopeError> {
    match content_type.parameter("protocol") {
        Some(p) if !p.trim().is_empty() => Ok(p.trim().to_ascii_lowercase()),
        _ => Err(EnvelopeError::MissingProtocol),
    }
}

/// Resolves the context for an envelope's protocol and checks that it
/// supports it.
pub(crate) fn context_for_protocol<'a>(
    ctx: Option<&'a dyn CryptoContext>,
    protocol: &str,
) -> Result<ResolvedContext<'a>, EnvelopeError> {
    let ctx = resolve_context(ctx, protocol)?;
    if !ctx.supports(protocol) {
        return Err(EnvelopeError::UnsupportedProtocol(protocol.to_owned()));
    }
    Ok(ctx)
}

pub(crate) fn check_part_count(multipart: &Multipart) -> Result<(), EnvelopeError> {
    if multipart.len() < 2 {
        return Err(EnvelopeError::MalformedEnvelope(MalformedKind::MissingParts));
    }
    Ok(())
}

/// Returns the child at the index if it is a leaf part.
pub(crate) fn leaf_child(
    multipart: &Multipart,
    index: usize,
    not_leaf: MalformedKind,
) -> Result<&MimePart, EnvelopeError> {
    multipart
        .get(index)
        .and_then(Entity::as_part)
        .ok_or(EnvelopeError::MalformedEnvelope(not_leaf))
}

/// Decodes a leaf part's content.
pub(crate) fn decode_leaf(part: &MimePart, undecodable: MalformedKind) -> Result<Vec<u8>, EnvelopeError> {
    part.decode_content().map_err(|e| {
        trace!("cannot decode envelope part: {e}");
        EnvelopeError::MalformedEnvelope(undecodable)
    })
}

pub(crate) fn require_non_empty(value: &str, name: &'static str) -> Result<(), EnvelopeError> {
    if value.trim().is_empty() {
        return Err(EnvelopeError::InvalidArgument(name));
    }
    Ok(())
}
