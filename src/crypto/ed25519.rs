use crate::crypto::VerificationError;
use ed25519_dalek::{
    pkcs8::DecodePublicKey, Signature, Signer, SigningKey, Verifier, VerifyingKey,
};

pub fn read_ed25519_verifying_key(key_data: &[u8]) -> Result<VerifyingKey, VerificationError> {
    VerifyingKey::try_from(key_data)
        .or_else(|_| VerifyingKey::from_public_key_der(key_data))
        .map_err(|_| VerificationError::InvalidKey)
}

// Ed25519 signs the message digest, not the content itself, so that both key
// types sign the same input.

pub fn verify_ed25519(
    verifying_key: &VerifyingKey,
    digest: &[u8],
    signature_data: &[u8],
) -> Result<(), VerificationError> {
    let signature = Signature::from_slice(signature_data)
        .map_err(|_| VerificationError::InvalidSignature)?;

    verifying_key
        .verify(digest, &signature)
        .map_err(|_| VerificationError::VerificationFailure)
}

pub fn sign_ed25519(signing_key: &SigningKey, digest: &[u8]) -> Vec<u8> {
    signing_key.sign(digest).to_bytes().to_vec()
}
