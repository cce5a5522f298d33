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

//! Encryption and decryption of `multipart/encrypted` envelopes.

use crate::{
    canonicalize::canonicalize_for_encryption,
    content_type::ContentType,
    crypto::{CryptoContext, Decrypted, DigestAlgorithm},
    encoding::TransferEncoding,
    entity::{Entity, MimePart, MultipartEncrypted},
    envelope::{self, EnvelopeError, MalformedKind, ResolvedContext},
    prepare::prepare_entity,
};
use tracing::{debug, trace};

/// The protocol used to find a default context when none is given.
pub const DEFAULT_ENCRYPTION_PROTOCOL: &str = "application/pgp-encrypted";

/// Content of the version part of an encrypted envelope.
pub const VERSION_CONTENT: &[u8] = b"Version: 1\r\n";

/// A request for encrypting an entity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncryptRequest {
    /// The recipients, usually email addresses. Must not be empty.
    pub recipients: Vec<String>,
    /// The protocol used to look up a default context. The protocol written
    /// to the envelope is always the one named by the context.
    pub protocol: String,
}

impl EncryptRequest {
    pub fn new<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            recipients: recipients.into_iter().map(Into::into).collect(),
            protocol: DEFAULT_ENCRYPTION_PROTOCOL.into(),
        }
    }
}

impl MultipartEncrypted {
    /// Encrypts an entity for the requested recipients, producing a
    /// `multipart/encrypted` envelope.
    ///
    /// The entity is prepared for encryption in place.
    pub fn encrypt(
        ctx: Option<&dyn CryptoContext>,
        request: &EncryptRequest,
        entity: &mut Entity,
    ) -> Result<Self, EnvelopeError> {
        check_recipients(request)?;

        let ctx = envelope::resolve_context(ctx, &request.protocol)?;

        let content = prepare_content(entity);

        let ciphertext = ctx.encrypt(&request.recipients, &content)?;

        debug!(recipients = request.recipients.len(), "encrypted entity");

        build_envelope(&ctx, ciphertext)
    }

    /// Signs and encrypts an entity in a single operation, producing a
    /// `multipart/encrypted` envelope.
    pub fn sign_and_encrypt(
        ctx: Option<&dyn CryptoContext>,
        signer: &str,
        digest_algorithm: DigestAlgorithm,
        request: &EncryptRequest,
        entity: &mut Entity,
    ) -> Result<Self, EnvelopeError> {
        envelope::require_non_empty(signer, "signer")?;
        check_recipients(request)?;

        let ctx = envelope::resolve_context(ctx, &request.protocol)?;

        let content = prepare_content(entity);

        let ciphertext = ctx.sign_and_encrypt(signer, digest_algorithm, &request.recipients, &content)?;

        debug!(signer, recipients = request.recipients.len(), "signed and encrypted entity");

        build_envelope(&ctx, ciphertext)
    }

    /// The version part, the first child.
    pub fn version_part(&self) -> Option<&Entity> {
        self.get(0)
    }

    /// The encrypted content, the second child.
    pub fn encrypted_part(&self) -> Option<&Entity> {
        self.get(1)
    }

    /// Decrypts the envelope, recovering the original entity. Any signatures
    /// embedded in the encrypted content are ignored.
    pub fn decrypt(&self, ctx: Option<&dyn CryptoContext>) -> Result<Entity, EnvelopeError> {
        self.decrypt_with_signatures(ctx).map(|decrypted| decrypted.entity)
    }

    /// Decrypts the envelope, recovering the original entity together with
    /// the verification results of embedded signatures, if any.
    ///
    /// The recovered entity may itself be an envelope; it is not unwrapped.
    pub fn decrypt_with_signatures(&self, ctx: Option<&dyn CryptoContext>) -> Result<Decrypted, EnvelopeError> {
        let protocol = envelope::protocol_parameter(&self.content_type())?;

        let ctx = envelope::context_for_protocol(ctx, &protocol)?;

        envelope::check_part_count(self)?;

        let version = envelope::leaf_child(self, 0, MalformedKind::VersionNotLeaf)?;
        if version.content_type().mime_type() != protocol {
            return Err(EnvelopeError::MalformedEnvelope(MalformedKind::VersionTypeMismatch));
        }

        let encrypted = envelope::leaf_child(self, 1, MalformedKind::CiphertextNotLeaf)?;
        let ciphertext = envelope::decode_leaf(encrypted, MalformedKind::UndecodableCiphertext)?;
        if !encrypted.content_type().is_mime_type("application", "octet-stream") {
            return Err(EnvelopeError::MalformedEnvelope(MalformedKind::CiphertextTypeMismatch));
        }

        trace!(protocol, "decrypting {} bytes", ciphertext.len());

        let decrypted = ctx.decrypt(&ciphertext)?;

        debug!(
            signatures = decrypted.signatures.as_ref().map_or(0, Vec::len),
            "decrypted entity"
        );

        Ok(decrypted)
    }
}

fn check_recipients(request: &EncryptRequest) -> Result<(), EnvelopeError> {
    if request.recipients.is_empty() {
        return Err(EnvelopeError::InvalidArgument("recipients"));
    }
    Ok(())
}

fn prepare_content(entity: &mut Entity) -> Vec<u8> {
    prepare_entity(entity);
    canonicalize_for_encryption(&entity.to_bytes())
}

fn build_envelope(ctx: &ResolvedContext<'_>, ciphertext: MimePart) -> Result<MultipartEncrypted, EnvelopeError> {
    let protocol = ctx.encryption_protocol();
    let unsupported = || EnvelopeError::UnsupportedProtocol(protocol.to_owned());

    let version_type = ContentType::parse(protocol).map_err(|_| unsupported())?;
    let mut version = MimePart::new(&version_type, TransferEncoding::SevenBit, VERSION_CONTENT);
    version
        .headers_mut()
        .set("Content-Disposition", "attachment")
        .map_err(|_| unsupported())?;

    let content_type = ContentType::new("multipart", "encrypted").with_parameter("protocol", protocol);

    let mut encrypted = MultipartEncrypted::new();
    encrypted.set_content_type(&content_type).map_err(|_| unsupported())?;
    encrypted.push(version);
    encrypted.push(ciphertext);

    Ok(encrypted)
}
