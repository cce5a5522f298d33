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

//! Signing and verification of `multipart/signed` envelopes.

use crate::{
    canonicalize::canonicalize_for_signing,
    content_type::ContentType,
    crypto::{CryptoContext, DigestAlgorithm, SignatureResult},
    entity::{Entity, MultipartSigned},
    envelope::{self, EnvelopeError, MalformedKind},
    prepare::prepare_entity,
};
use tracing::{debug, trace};

/// The protocol used to find a default context when none is given.
pub const DEFAULT_SIGNATURE_PROTOCOL: &str = "application/pgp-signature";

/// A request for signing an entity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignRequest {
    /// The signer identity, usually an email address.
    pub signer: String,
    pub digest_algorithm: DigestAlgorithm,
    /// The protocol used to look up a default context. The protocol written
    /// to the envelope is always the one named by the context.
    pub protocol: String,
}

impl SignRequest {
    pub fn new(signer: impl Into<String>, digest_algorithm: DigestAlgorithm) -> Self {
        Self {
            signer: signer.into(),
            digest_algorithm,
            protocol: DEFAULT_SIGNATURE_PROTOCOL.into(),
        }
    }
}

impl MultipartSigned {
    /// Signs an entity, producing a `multipart/signed` envelope.
    ///
    /// The entity is prepared for signing in place: its leaf parts are given
    /// a 7-bit clean transfer encoding. The first child of the resulting
    /// envelope serializes to exactly the bytes that were signed.
    pub fn sign(
        ctx: Option<&dyn CryptoContext>,
        request: &SignRequest,
        entity: &mut Entity,
    ) -> Result<Self, EnvelopeError> {
        envelope::require_non_empty(&request.signer, "signer")?;

        let ctx = envelope::resolve_context(ctx, &request.protocol)?;

        prepare_entity(entity);

        let content = canonicalize_for_signing(&entity.to_bytes());
        let signed_entity = Entity::parse(&content)?;

        let signature = ctx.sign(&request.signer, request.digest_algorithm, &content)?;
        let micalg = ctx.mic_algorithm_name(request.digest_algorithm)?;

        let protocol = ctx.signature_protocol();
        let content_type = ContentType::new("multipart", "signed")
            .with_parameter("protocol", protocol)
            .with_parameter("micalg", micalg);

        let mut signed = Self::new();
        signed
            .set_content_type(&content_type)
            .map_err(|_| EnvelopeError::UnsupportedProtocol(protocol.to_owned()))?;
        signed.push(signed_entity);
        signed.push(signature);

        debug!(signer = %request.signer, protocol, "signed entity");

        Ok(signed)
    }

    /// The signed content, the first child.
    pub fn content(&self) -> Option<&Entity> {
        self.get(0)
    }

    /// The detached signature, the second child.
    pub fn signature(&self) -> Option<&Entity> {
        self.get(1)
    }

    /// Verifies the envelope's signatures.
    ///
    /// Structural problems are reported as errors before the context is
    /// called. Signatures that do not verify are not errors: they are
    /// reported in the returned results.
    pub fn verify(&self, ctx: Option<&dyn CryptoContext>) -> Result<Vec<SignatureResult>, EnvelopeError> {
        let protocol = envelope::protocol_parameter(&self.content_type())?;

        let ctx = envelope::context_for_protocol(ctx, &protocol)?;

        envelope::check_part_count(self)?;

        let signature_part = envelope::leaf_child(self, 1, MalformedKind::SignatureNotLeaf)?;
        let signature = envelope::decode_leaf(signature_part, MalformedKind::UndecodableSignature)?;

        // with a given context, the part type must be the declared protocol
        let signature_type = signature_part.content_type().mime_type();
        let accepted = if ctx.is_given() {
            signature_type.eq_ignore_ascii_case(&protocol)
        } else {
            ctx.supports(&signature_type)
        };
        if !accepted {
            return Err(EnvelopeError::UnsupportedProtocol(signature_type));
        }

        let content = self
            .content()
            .map(|entity| canonicalize_for_signing(&entity.to_bytes()))
            .unwrap_or_default();

        trace!(protocol, "verifying {} bytes of signed content", content.len());

        let results = ctx.verify(&content, &signature)?;

        for result in &results {
            debug!(signer = %result.signer, status = %result.status, "signature verified");
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_request_defaults() {
        let request = SignRequest::new("me@example.com", DigestAlgorithm::Sha256);
        assert_eq!(request.protocol, "application/pgp-signature");
    }

    #[test]
    fn sign_rejects_empty_signer() {
        let request = SignRequest::new("  ", DigestAlgorithm::Sha256);
        let mut entity = Entity::parse(b"\r\ntext").unwrap();
        let before = entity.clone();

        let result = MultipartSigned::sign(None, &request, &mut entity);

        assert_eq!(result, Err(EnvelopeError::InvalidArgument("signer")));
        assert_eq!(entity, before);
    }

    #[test]
    fn verify_missing_protocol_before_children() {
        // neither a protocol nor any children
        let input = b"Content-Type: multipart/signed; boundary=b\r\n\r\n--b--\r\n";
        let Entity::Signed(signed) = Entity::parse(input).unwrap() else {
            panic!("not multipart/signed");
        };

        assert_eq!(signed.verify(None), Err(EnvelopeError::MissingProtocol));
    }
}
