use crate::{crypto::CryptoError, util};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

pub const NONCE_LEN: usize = 24;

const KEY_WRAP_INFO: &[u8] = b"viamime key wrap v1";

/// A content key encrypted to one recipient.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WrappedKey {
    /// Ephemeral public key of the sender.
    pub ephemeral: [u8; 32],
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted content key, with authentication tag.
    pub ciphertext: Vec<u8>,
}

/// Encrypts a content key to a recipient's public key.
///
/// A fresh ephemeral key is agreed with the recipient key, and the key
/// encryption key derived from the shared secret with HKDF-SHA256.
pub fn wrap_key(recipient: &PublicKey, content_key: &[u8; 32]) -> Result<WrappedKey, CryptoError> {
    let ephemeral_secret = StaticSecret::from(util::random_bytes::<32>()?);
    let ephemeral = PublicKey::from(&ephemeral_secret);

    let shared_secret = ephemeral_secret.diffie_hellman(recipient);
    let kek = derive_kek(shared_secret.as_bytes(), ephemeral.as_bytes(), recipient.as_bytes())?;

    let (nonce, ciphertext) = seal(&kek, content_key)?;

    Ok(WrappedKey {
        ephemeral: ephemeral.to_bytes(),
        nonce,
        ciphertext,
    })
}

/// Recovers a content key with the recipient's secret. Fails with
/// `DecryptionFailure` when the key was not wrapped for this secret.
pub fn unwrap_key(secret: &StaticSecret, wrapped: &WrappedKey) -> Result<[u8; 32], CryptoError> {
    let ephemeral = PublicKey::from(wrapped.ephemeral);
    let recipient = PublicKey::from(secret);

    let shared_secret = secret.diffie_hellman(&ephemeral);
    let kek = derive_kek(shared_secret.as_bytes(), ephemeral.as_bytes(), recipient.as_bytes())?;

    let content_key = open(&kek, &wrapped.nonce, &wrapped.ciphertext)?;

    content_key.try_into().map_err(|_| CryptoError::InvalidData)
}

fn derive_kek(shared_secret: &[u8], ephemeral: &[u8], recipient: &[u8]) -> Result<[u8; 32], CryptoError> {
    let salt = [ephemeral, recipient].concat();
    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret);

    let mut kek = [0; 32];
    hkdf.expand(KEY_WRAP_INFO, &mut kek)
        .map_err(|_| CryptoError::EncryptionFailure)?;

    Ok(kek)
}

/// Encrypts data with XChaCha20-Poly1305 under a random nonce.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>), CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = util::random_bytes::<NONCE_LEN>()?;

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailure)?;

    Ok((nonce, ciphertext))
}

/// Decrypts and authenticates data sealed with [`seal`].
pub fn open(key: &[u8; 32], nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());

    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailure)
}
