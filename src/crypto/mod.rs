//! Cryptography contexts and primitives.
//!
//! A [`CryptoContext`] is the backend that actually produces and checks
//! signatures and ciphertexts. The envelope operations in this crate never
//! look inside the detached parts a context produces; they only arrange
//! canonical input and assemble the result.
//!
//! The low-level helpers in this module are used by the bundled
//! [`KeyringContext`][crate::keyring::KeyringContext].

mod ed25519;
mod hash;
mod rsa;
mod x25519;

pub use self::{
    ed25519::{read_ed25519_verifying_key, sign_ed25519, verify_ed25519},
    hash::digest,
    rsa::{read_rsa_public_key, sign_rsa, verify_rsa},
    x25519::{open, seal, unwrap_key, wrap_key, WrappedKey},
};

use crate::{
    entity::{Entity, MimePart},
    util::CanonicalStr,
};
use ::rsa::{RsaPrivateKey, RsaPublicKey};
use ed25519_dalek::{SigningKey as Ed25519SigningKey, VerifyingKey as Ed25519VerifyingKey};
use pkcs8::{der::pem::PemLabel, Document, PrivateKeyInfo};
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// A cryptography backend for one family of protocols (for example
/// PGP/MIME or S/MIME).
///
/// Contexts are shared between threads; implementations that need mutable
/// state must synchronise internally.
pub trait CryptoContext: Send + Sync {
    /// The MIME type of detached signature parts, eg
    /// `application/pgp-signature`.
    fn signature_protocol(&self) -> &str;

    /// The MIME type of encrypted envelope version parts, eg
    /// `application/pgp-encrypted`.
    fn encryption_protocol(&self) -> &str;

    /// Whether this context handles the given protocol or MIME type. Names
    /// are compared ASCII case-insensitively.
    fn supports(&self, protocol: &str) -> bool;

    /// The `micalg` parameter value for the given digest algorithm.
    fn mic_algorithm_name(&self, digest_alg: DigestAlgorithm) -> Result<String, CryptoError>;

    /// Signs canonical content, producing a detached signature part.
    fn sign(
        &self,
        signer: &str,
        digest_alg: DigestAlgorithm,
        content: &[u8],
    ) -> Result<MimePart, CryptoError>;

    /// Verifies canonical content against decoded signature data.
    fn verify(&self, content: &[u8], signature: &[u8]) -> Result<Vec<SignatureResult>, CryptoError>;

    /// Encrypts canonical content for the given recipients, producing the
    /// ciphertext part.
    fn encrypt(&self, recipients: &[String], content: &[u8]) -> Result<MimePart, CryptoError>;

    /// Decrypts decoded ciphertext data, recovering an entity.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Decrypted, CryptoError>;

    /// Signs and then encrypts canonical content in a single operation.
    fn sign_and_encrypt(
        &self,
        signer: &str,
        digest_alg: DigestAlgorithm,
        recipients: &[String],
        content: &[u8],
    ) -> Result<MimePart, CryptoError>;
}

/// The outcome of decryption.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Decrypted {
    /// The recovered entity.
    pub entity: Entity,
    /// Results for signatures embedded in the ciphertext, if it was signed.
    pub signatures: Option<Vec<SignatureResult>>,
}

/// The verification result for a single signature.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignatureResult {
    pub signer: String,
    pub digest_algorithm: Option<DigestAlgorithm>,
    pub status: SignatureStatus,
}

impl SignatureResult {
    pub fn is_valid(&self) -> bool {
        matches!(self.status, SignatureStatus::Valid)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignatureStatus {
    Valid,
    Invalid(VerificationError),
}

impl Display for SignatureStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Invalid(e) => write!(f, "invalid: {e}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
    #[cfg(feature = "sha1")]
    Sha1,
}

impl DigestAlgorithm {
    pub fn all() -> Vec<Self> {
        vec![
            Self::Sha256,
            Self::Sha512,
            #[cfg(feature = "sha1")]
            Self::Sha1,
        ]
    }

    /// Looks up a digest algorithm by its canonical name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|alg| alg.canonical_str().eq_ignore_ascii_case(name))
    }
}

impl CanonicalStr for DigestAlgorithm {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            #[cfg(feature = "sha1")]
            Self::Sha1 => "sha1",
        }
    }
}

impl Display for DigestAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyType {
    Rsa,
    Ed25519,
}

impl KeyType {
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Rsa, Self::Ed25519]
            .into_iter()
            .find(|t| t.canonical_str().eq_ignore_ascii_case(name))
    }
}

impl CanonicalStr for KeyType {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ed25519 => "ed25519",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct KeyError;

impl Display for KeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unusable key data")
    }
}

impl Error for KeyError {}

#[derive(Debug)]
pub enum SigningKey {
    Rsa(RsaPrivateKey),
    Ed25519(Ed25519SigningKey),
}

impl SigningKey {
    pub fn to_key_type(&self) -> KeyType {
        match self {
            Self::Rsa(_) => KeyType::Rsa,
            Self::Ed25519(_) => KeyType::Ed25519,
        }
    }

    /// Reads an RSA or Ed25519 private key from a PKCS#8 PEM document.
    pub fn from_pkcs8_pem(s: &str) -> Result<Self, KeyError> {
        let (label, private_key_der) = Document::from_pem(s).map_err(|_| KeyError)?;

        PrivateKeyInfo::validate_pem_label(label).map_err(|_| KeyError)?;

        let pk = PrivateKeyInfo::try_from(private_key_der.as_bytes()).map_err(|_| KeyError)?;

        if let Ok(rpk) = RsaPrivateKey::try_from(pk.clone()) {
            Ok(Self::Rsa(rpk))
        } else if let Ok(esk) = Ed25519SigningKey::try_from(pk) {
            Ok(Self::Ed25519(esk))
        } else {
            Err(KeyError)
        }
    }

    /// Signs a message digest computed with the given algorithm.
    pub fn sign_digest(&self, digest_alg: DigestAlgorithm, digest: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Rsa(k) => sign_rsa(digest_alg, k, digest),
            Self::Ed25519(k) => Ok(sign_ed25519(k, digest)),
        }
    }

    pub fn to_verifying_key(&self) -> VerifyingKey {
        match self {
            Self::Rsa(k) => VerifyingKey::Rsa(k.to_public_key()),
            Self::Ed25519(k) => VerifyingKey::Ed25519(k.verifying_key()),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VerifyingKey {
    Rsa(RsaPublicKey),
    Ed25519(Ed25519VerifyingKey),
}

impl VerifyingKey {
    pub fn to_key_type(&self) -> KeyType {
        match self {
            Self::Rsa(_) => KeyType::Rsa,
            Self::Ed25519(_) => KeyType::Ed25519,
        }
    }

    pub fn key_size(&self) -> Option<usize> {
        match self {
            Self::Rsa(public_key) => Some(self::rsa::get_public_key_size(public_key)),
            Self::Ed25519(_) => None,
        }
    }

    /// Reads a verifying key from DER data, SubjectPublicKeyInfo or the
    /// key type's raw format.
    pub fn from_key_data(key_type: KeyType, key_data: &[u8]) -> Result<Self, VerificationError> {
        match key_type {
            KeyType::Rsa => {
                let public_key = read_rsa_public_key(key_data)?;
                Ok(VerifyingKey::Rsa(public_key))
            }
            KeyType::Ed25519 => {
                let verifying_key = read_ed25519_verifying_key(key_data)?;
                Ok(VerifyingKey::Ed25519(verifying_key))
            }
        }
    }

    /// Reads an RSA or Ed25519 public key from a SubjectPublicKeyInfo PEM
    /// document.
    pub fn from_public_key_pem(s: &str) -> Result<Self, KeyError> {
        let (label, der) = Document::from_pem(s).map_err(|_| KeyError)?;
        if label != "PUBLIC KEY" {
            return Err(KeyError);
        }

        Self::from_key_data(KeyType::Rsa, der.as_bytes())
            .or_else(|_| Self::from_key_data(KeyType::Ed25519, der.as_bytes()))
            .map_err(|_| KeyError)
    }

    /// Verifies a signature over a message digest computed with the given
    /// algorithm.
    pub fn verify_digest(
        &self,
        digest_alg: DigestAlgorithm,
        digest: &[u8],
        signature_data: &[u8],
    ) -> Result<(), VerificationError> {
        match self {
            Self::Rsa(k) => verify_rsa(digest_alg, k, digest, signature_data),
            Self::Ed25519(k) => verify_ed25519(k, digest, signature_data),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationError {
    NoPublicKey,
    InvalidKey,
    InsufficientKeySize,
    InvalidSignature,
    UnsupportedAlgorithm,
    VerificationFailure,
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPublicKey => write!(f, "no public key for signer"),
            Self::InvalidKey => write!(f, "invalid key data"),
            Self::InsufficientKeySize => write!(f, "key too small"),
            Self::InvalidSignature => write!(f, "invalid signature data"),
            Self::UnsupportedAlgorithm => write!(f, "unsupported signature algorithm"),
            Self::VerificationFailure => write!(f, "signature verification failed"),
        }
    }
}

impl Error for VerificationError {}

/// An error reported by a cryptography context.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CryptoError {
    /// No key is available for the named signer or recipient.
    KeyNotFound(String),
    /// The user cancelled unlocking a key.
    Cancelled,
    /// A passphrase was given wrongly too many times.
    BadPassphrase,
    UnsupportedDigest(DigestAlgorithm),
    SigningFailure,
    EncryptionFailure,
    DecryptionFailure,
    /// Signature or ciphertext data is malformed.
    InvalidData,
    /// Recovered plaintext is not a MIME entity.
    InvalidPlaintext,
    RandomnessUnavailable,
}

impl Display for CryptoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyNotFound(id) => write!(f, "no key found for {id}"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::BadPassphrase => write!(f, "bad passphrase"),
            Self::UnsupportedDigest(alg) => write!(f, "unsupported digest algorithm {alg}"),
            Self::SigningFailure => write!(f, "signing failed"),
            Self::EncryptionFailure => write!(f, "encryption failed"),
            Self::DecryptionFailure => write!(f, "decryption failed"),
            Self::InvalidData => write!(f, "invalid cryptographic data"),
            Self::InvalidPlaintext => write!(f, "decrypted data is not a MIME entity"),
            Self::RandomnessUnavailable => write!(f, "no source of randomness available"),
        }
    }
}

impl Error for CryptoError {}

impl From<getrandom::Error> for CryptoError {
    fn from(_: getrandom::Error) -> Self {
        Self::RandomnessUnavailable
    }
}
