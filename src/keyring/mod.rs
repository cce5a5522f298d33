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

//! A cryptography context backed by in-memory keys.
//!
//! [`KeyringContext`] signs with RSA (PKCS#1 v1.5) or Ed25519 keys and
//! encrypts to X25519 recipient keys. Each message is encrypted with a fresh
//! content key under XChaCha20-Poly1305; the content key is wrapped for every
//! recipient using an ephemeral X25519 key agreement and HKDF-SHA256.
//!
//! Keys are associated with addresses. The local part of an address is used
//! verbatim, the domain is compared in its lower-case IDNA ASCII form, so
//! that `me@Bücher.example` and `me@xn--bcher-kva.example` name the same
//! key.
//!
//! ```
//! use viamime::{
//!     crypto::{CryptoContext, DigestAlgorithm, SigningKey},
//!     keyring::{DecryptionKey, KeyringContext},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let pem = std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/keys/ed25519.pem"))?;
//! let mut keyring = KeyringContext::new();
//! keyring.add_signing_key("me@example.com", SigningKey::from_pkcs8_pem(&pem)?)?;
//! keyring.add_secret("me@example.com", DecryptionKey::from([7; 32]))?;
//!
//! let part = keyring.sign("me@example.com", DigestAlgorithm::Sha256, b"content\r\n")?;
//! let results = keyring.verify(b"content\r\n", &part.decode_content()?)?;
//! assert!(results[0].is_valid());
//! # Ok(())
//! # }
//! ```

mod format;

pub use x25519_dalek::{PublicKey as EncryptionKey, StaticSecret as DecryptionKey};

use self::format::{Envelope, SignatureBlock};
use crate::{
    content_type::ContentType,
    crypto::{
        self, CryptoContext, CryptoError, Decrypted, DigestAlgorithm, SignatureResult,
        SignatureStatus, SigningKey, VerificationError, VerifyingKey,
    },
    encoding::TransferEncoding,
    entity::{Entity, MimePart},
    util,
};
use std::{
    collections::HashMap,
    error::Error,
    fmt::{self, Display, Formatter},
};
use tracing::{debug, trace};

/// The protocol of keyring signature parts.
pub const SIGNATURE_PROTOCOL: &str = "application/x-viamime-signature";

/// The protocol of keyring encrypted envelopes.
pub const ENCRYPTION_PROTOCOL: &str = "application/x-viamime-encrypted";

/// Configuration for a [`KeyringContext`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// The minimum size in bits of RSA keys accepted for verification. The
    /// default is 1024.
    pub min_rsa_key_bits: usize,
    /// Further protocol names the context reports as supported, for example
    /// `application/pgp-signature`. This allows registering the context as
    /// the default for those protocols.
    pub protocol_aliases: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_rsa_key_bits: 1024,
            protocol_aliases: vec![],
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct AddressError;

impl Display for AddressError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address")
    }
}

impl Error for AddressError {}

/// A normalized address that keys are filed under.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Address(String);

impl Address {
    pub fn new(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        let s = s
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(s);

        let (local_part, domain) = s.rsplit_once('@').ok_or(AddressError)?;
        if local_part.is_empty() || domain.is_empty() {
            return Err(AddressError);
        }

        let domain = idna::domain_to_ascii(domain).map_err(|_| AddressError)?;

        Ok(Self(format!("{local_part}@{domain}")))
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cryptography context holding keys in memory.
#[derive(Default)]
pub struct KeyringContext {
    config: Config,
    signing_keys: HashMap<Address, SigningKey>,
    verifying_keys: HashMap<Address, VerifyingKey>,
    secrets: HashMap<Address, DecryptionKey>,
    recipients: HashMap<Address, EncryptionKey>,
}

impl KeyringContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Adds a signing key. Its public key is added for verification, too.
    pub fn add_signing_key(&mut self, address: &str, key: SigningKey) -> Result<(), AddressError> {
        let address = Address::new(address)?;
        self.verifying_keys.insert(address.clone(), key.to_verifying_key());
        self.signing_keys.insert(address, key);
        Ok(())
    }

    pub fn add_verifying_key(&mut self, address: &str, key: VerifyingKey) -> Result<(), AddressError> {
        let address = Address::new(address)?;
        self.verifying_keys.insert(address, key);
        Ok(())
    }

    /// Adds a decryption secret. Its public key is added as a recipient key,
    /// too.
    pub fn add_secret(&mut self, address: &str, secret: DecryptionKey) -> Result<(), AddressError> {
        let address = Address::new(address)?;
        self.recipients.insert(address.clone(), EncryptionKey::from(&secret));
        self.secrets.insert(address, secret);
        Ok(())
    }

    pub fn add_recipient(&mut self, address: &str, key: EncryptionKey) -> Result<(), AddressError> {
        let address = Address::new(address)?;
        self.recipients.insert(address, key);
        Ok(())
    }

    fn sign_block(
        &self,
        signer: &str,
        digest_alg: DigestAlgorithm,
        content: &[u8],
    ) -> Result<SignatureBlock, CryptoError> {
        let key = Address::new(signer)
            .ok()
            .and_then(|address| self.signing_keys.get(&address))
            .ok_or_else(|| CryptoError::KeyNotFound(signer.into()))?;

        let digest = crypto::digest(digest_alg, [content]);
        let signature = key.sign_digest(digest_alg, &digest)?;

        trace!(signer, "created {} byte signature", signature.len());

        Ok(SignatureBlock {
            signer: signer.into(),
            algorithm: format::algorithm_name(key.to_key_type(), digest_alg),
            signature,
        })
    }

    fn verify_block(&self, block: &SignatureBlock, content: &[u8]) -> SignatureResult {
        let Some((key_type, digest_alg)) = format::parse_algorithm_name(&block.algorithm) else {
            return SignatureResult {
                signer: block.signer.clone(),
                digest_algorithm: None,
                status: SignatureStatus::Invalid(VerificationError::UnsupportedAlgorithm),
            };
        };

        let key = Address::new(&block.signer)
            .ok()
            .and_then(|address| self.verifying_keys.get(&address));

        let status = match key {
            None => SignatureStatus::Invalid(VerificationError::NoPublicKey),
            Some(key) if key.to_key_type() != key_type => {
                SignatureStatus::Invalid(VerificationError::InvalidKey)
            }
            Some(key) if key.key_size().is_some_and(|n| n < self.config.min_rsa_key_bits) => {
                SignatureStatus::Invalid(VerificationError::InsufficientKeySize)
            }
            Some(key) => {
                let digest = crypto::digest(digest_alg, [content]);
                match key.verify_digest(digest_alg, &digest, &block.signature) {
                    Ok(()) => SignatureStatus::Valid,
                    Err(e) => SignatureStatus::Invalid(e),
                }
            }
        };

        SignatureResult {
            signer: block.signer.clone(),
            digest_algorithm: Some(digest_alg),
            status,
        }
    }

    fn encrypt_plaintext(&self, recipients: &[String], plaintext: &[u8]) -> Result<MimePart, CryptoError> {
        let content_key = util::random_bytes::<32>()?;

        let keys = recipients
            .iter()
            .map(|recipient| {
                let key = Address::new(recipient)
                    .ok()
                    .and_then(|address| self.recipients.get(&address))
                    .ok_or_else(|| CryptoError::KeyNotFound(recipient.clone()))?;
                crypto::wrap_key(key, &content_key)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (nonce, payload) = crypto::seal(&content_key, plaintext)?;

        let data = Envelope { keys, nonce, payload }.to_bytes();

        Ok(MimePart::new(
            &ContentType::new("application", "octet-stream"),
            TransferEncoding::Base64,
            &data,
        ))
    }

    fn find_content_key(&self, envelope: &Envelope) -> Option<[u8; 32]> {
        self.secrets.iter().find_map(|(address, secret)| {
            envelope.keys.iter().find_map(|wrapped| {
                let key = crypto::unwrap_key(secret, wrapped).ok()?;
                trace!(%address, "found content key");
                Some(key)
            })
        })
    }
}

impl CryptoContext for KeyringContext {
    fn signature_protocol(&self) -> &str {
        SIGNATURE_PROTOCOL
    }

    fn encryption_protocol(&self) -> &str {
        ENCRYPTION_PROTOCOL
    }

    fn supports(&self, protocol: &str) -> bool {
        protocol.eq_ignore_ascii_case(SIGNATURE_PROTOCOL)
            || protocol.eq_ignore_ascii_case(ENCRYPTION_PROTOCOL)
            || self
                .config
                .protocol_aliases
                .iter()
                .any(|alias| protocol.eq_ignore_ascii_case(alias))
    }

    fn mic_algorithm_name(&self, digest_alg: DigestAlgorithm) -> Result<String, CryptoError> {
        let name = match digest_alg {
            DigestAlgorithm::Sha256 => "sha-256",
            DigestAlgorithm::Sha512 => "sha-512",
            #[cfg(feature = "sha1")]
            DigestAlgorithm::Sha1 => "sha-1",
        };
        Ok(name.into())
    }

    fn sign(
        &self,
        signer: &str,
        digest_alg: DigestAlgorithm,
        content: &[u8],
    ) -> Result<MimePart, CryptoError> {
        let block = self.sign_block(signer, digest_alg, content)?;

        let mut body = vec![];
        format::write_signatures(&mut body, &[block]);

        debug!(signer, "signed {} bytes", content.len());

        Ok(MimePart::new(
            &ContentType::new("application", "x-viamime-signature"),
            TransferEncoding::SevenBit,
            &body,
        ))
    }

    fn verify(&self, content: &[u8], signature: &[u8]) -> Result<Vec<SignatureResult>, CryptoError> {
        let blocks = format::parse_signatures(signature).map_err(|_| CryptoError::InvalidData)?;
        if blocks.is_empty() {
            return Err(CryptoError::InvalidData);
        }

        Ok(blocks
            .iter()
            .map(|block| self.verify_block(block, content))
            .collect())
    }

    fn encrypt(&self, recipients: &[String], content: &[u8]) -> Result<MimePart, CryptoError> {
        // an empty field block: no signatures
        let mut plaintext = b"\r\n".to_vec();
        plaintext.extend(content);

        self.encrypt_plaintext(recipients, &plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Decrypted, CryptoError> {
        let envelope = Envelope::from_bytes(ciphertext).map_err(|_| CryptoError::InvalidData)?;

        let content_key = self
            .find_content_key(&envelope)
            .ok_or_else(|| CryptoError::KeyNotFound("recipient".into()))?;

        let plaintext = crypto::open(&content_key, &envelope.nonce, &envelope.payload)?;

        let (block, content) = format::split_block(&plaintext).map_err(|_| CryptoError::InvalidData)?;
        let blocks = format::parse_signatures(block).map_err(|_| CryptoError::InvalidData)?;

        let entity = Entity::parse(content).map_err(|_| CryptoError::InvalidPlaintext)?;

        let signatures = if blocks.is_empty() {
            None
        } else {
            Some(
                blocks
                    .iter()
                    .map(|block| self.verify_block(block, content))
                    .collect(),
            )
        };

        Ok(Decrypted { entity, signatures })
    }

    fn sign_and_encrypt(
        &self,
        signer: &str,
        digest_alg: DigestAlgorithm,
        recipients: &[String],
        content: &[u8],
    ) -> Result<MimePart, CryptoError> {
        let block = self.sign_block(signer, digest_alg, content)?;

        let mut plaintext = vec![];
        format::write_signatures(&mut plaintext, &[block]);
        plaintext.extend(b"\r\n");
        plaintext.extend(content);

        self.encrypt_plaintext(recipients, &plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey as Ed25519SigningKey;

    fn make_keyring() -> KeyringContext {
        let mut keyring = KeyringContext::new();
        let key = SigningKey::Ed25519(Ed25519SigningKey::from_bytes(&[1; 32]));
        keyring.add_signing_key("alice@Example.COM", key).unwrap();
        keyring.add_secret("bob@example.org", DecryptionKey::from([2; 32])).unwrap();
        keyring
    }

    #[test]
    fn address_normalization() {
        assert_eq!(
            Address::new("<Me@Bücher.Example>").unwrap().as_ref(),
            "Me@xn--bcher-kva.example"
        );
        assert_eq!(Address::new("no-at-sign"), Err(AddressError));
        assert_eq!(Address::new("@example.com"), Err(AddressError));
    }

    #[test]
    fn supports_protocols_and_aliases() {
        let keyring = KeyringContext::with_config(Config {
            protocol_aliases: vec!["application/pgp-signature".into()],
            ..Default::default()
        });

        assert!(keyring.supports("Application/X-Viamime-Signature"));
        assert!(keyring.supports(ENCRYPTION_PROTOCOL));
        assert!(keyring.supports("application/PGP-signature"));
        assert!(!keyring.supports("application/pkcs7-signature"));

        let signature_type = ContentType::new("application", "x-viamime-signature");
        assert_eq!(signature_type.mime_type(), SIGNATURE_PROTOCOL);
    }

    #[test]
    fn sign_and_verify() {
        let keyring = make_keyring();

        let part = keyring.sign("alice@example.com", DigestAlgorithm::Sha512, b"text\r\n").unwrap();
        let signature = part.decode_content().unwrap();

        let results = keyring.verify(b"text\r\n", &signature).unwrap();
        assert_eq!(
            results,
            [SignatureResult {
                signer: "alice@example.com".into(),
                digest_algorithm: Some(DigestAlgorithm::Sha512),
                status: SignatureStatus::Valid,
            }]
        );

        let results = keyring.verify(b"text!\r\n", &signature).unwrap();
        assert_eq!(
            results[0].status,
            SignatureStatus::Invalid(VerificationError::VerificationFailure)
        );

        assert_eq!(
            keyring.sign("carol@example.com", DigestAlgorithm::Sha256, b"x"),
            Err(CryptoError::KeyNotFound("carol@example.com".into()))
        );
        assert_eq!(keyring.verify(b"x", b"garbage"), Err(CryptoError::InvalidData));
    }

    #[test]
    fn verify_unknown_signer() {
        let keyring = make_keyring();
        let part = keyring.sign("alice@example.com", DigestAlgorithm::Sha256, b"x").unwrap();

        let other = KeyringContext::new();
        let results = other.verify(b"x", &part.decode_content().unwrap()).unwrap();

        assert_eq!(
            results[0].status,
            SignatureStatus::Invalid(VerificationError::NoPublicKey)
        );
    }

    #[test]
    fn encrypt_and_decrypt() {
        let keyring = make_keyring();
        let recipients = ["bob@EXAMPLE.org".to_owned()];
        let content = b"Content-Type: text/plain\r\n\r\nsecret\r\n";

        let part = keyring.encrypt(&recipients, content).unwrap();
        assert_eq!(part.transfer_encoding(), TransferEncoding::Base64);
        assert!(part.content_type().is_mime_type("application", "octet-stream"));

        let decrypted = keyring.decrypt(&part.decode_content().unwrap()).unwrap();
        assert_eq!(decrypted.entity.to_bytes(), content);
        assert_eq!(decrypted.signatures, None);

        let stranger = KeyringContext::new();
        assert_eq!(
            stranger.decrypt(&part.decode_content().unwrap()).err(),
            Some(CryptoError::KeyNotFound("recipient".into()))
        );

        assert_eq!(
            keyring.encrypt(&["carol@example.com".to_owned()], content).err(),
            Some(CryptoError::KeyNotFound("carol@example.com".into()))
        );
    }
}
