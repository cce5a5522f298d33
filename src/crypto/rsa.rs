use crate::crypto::{CryptoError, DigestAlgorithm, VerificationError};
use rsa::{
    pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, traits::PublicKeyParts, Pkcs1v15Sign,
    RsaPrivateKey, RsaPublicKey,
};
use sha2::{Sha256, Sha512};
#[cfg(feature = "sha1")]
use sha1::Sha1;

pub fn get_public_key_size(k: &RsaPublicKey) -> usize {
    k.size() * 8
}

pub fn read_rsa_public_key(key_data: &[u8]) -> Result<RsaPublicKey, VerificationError> {
    // SubjectPublicKeyInfo is what key tooling produces by default, the bare
    // PKCS#1 RSAPublicKey form is accepted too
    let public_key = RsaPublicKey::from_public_key_der(key_data)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(key_data))
        .map_err(|_| VerificationError::InvalidKey)?;

    if get_public_key_size(&public_key) < 1024 {
        return Err(VerificationError::InsufficientKeySize);
    }

    Ok(public_key)
}

fn padding_scheme(digest_alg: DigestAlgorithm) -> Pkcs1v15Sign {
    match digest_alg {
        DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        #[cfg(feature = "sha1")]
        DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
    }
}

pub fn verify_rsa(
    digest_alg: DigestAlgorithm,
    public_key: &RsaPublicKey,
    digest: &[u8],
    signature_data: &[u8],
) -> Result<(), VerificationError> {
    public_key
        .verify(padding_scheme(digest_alg), digest, signature_data)
        .map_err(|_| VerificationError::VerificationFailure)
}

pub fn sign_rsa(
    digest_alg: DigestAlgorithm,
    private_key: &RsaPrivateKey,
    digest: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    private_key
        .sign(padding_scheme(digest_alg), digest)
        .map_err(|_| CryptoError::SigningFailure)
}
