use std::{io, sync::Mutex};
use tokio::fs;
use viamime::{
    crypto::{DigestAlgorithm, VerifyingKey},
    keyring::DecryptionKey,
    ContentType, CryptoContext, CryptoError, Decrypted, Entity, KeyringContext, MessagePart,
    MimePart, Multipart, SignatureResult, SigningKey, TransferEncoding,
};

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.org";

pub async fn read_signing_key_from_file(file_name: &str) -> io::Result<SigningKey> {
    let s = fs::read_to_string(file_name).await?;
    Ok(SigningKey::from_pkcs8_pem(&s).unwrap())
}

pub async fn read_verifying_key_from_file(file_name: &str) -> io::Result<VerifyingKey> {
    let s = fs::read_to_string(file_name).await?;
    Ok(VerifyingKey::from_public_key_pem(&s).unwrap())
}

/// A keyring where Alice signs with RSA and Bob with Ed25519, and both can
/// decrypt.
pub async fn make_keyring() -> KeyringContext {
    let mut keyring = KeyringContext::new();

    let rsa_key = read_signing_key_from_file("tests/keys/rsa2048.pem").await.unwrap();
    let ed25519_key = read_signing_key_from_file("tests/keys/ed25519.pem").await.unwrap();
    keyring.add_signing_key(ALICE, rsa_key).unwrap();
    keyring.add_signing_key(BOB, ed25519_key).unwrap();

    keyring.add_secret(ALICE, DecryptionKey::from([0x11; 32])).unwrap();
    keyring.add_secret(BOB, DecryptionKey::from([0x22; 32])).unwrap();

    keyring
}

/// A keyring that can only verify signatures, using public keys only.
pub async fn make_verifying_keyring() -> KeyringContext {
    let mut keyring = KeyringContext::new();

    let rsa_key = read_verifying_key_from_file("tests/keys/rsa2048.pub.pem").await.unwrap();
    let ed25519_key = read_verifying_key_from_file("tests/keys/ed25519.pub.pem").await.unwrap();
    keyring.add_verifying_key(ALICE, rsa_key).unwrap();
    keyring.add_verifying_key(BOB, ed25519_key).unwrap();

    keyring
}

/// A multipart/mixed entity exercising canonicalization: trailing
/// whitespace, a line starting with "From ", bare LF line breaks, non-ASCII
/// text, a binary attachment, and an embedded message.
pub fn make_entity() -> Entity {
    let mut multipart = Multipart::new("mixed");

    let text = "Hallo!\n\
        Here is some trailing whitespace:  \n\
        From here on it gets serious.\n\
        Tschüss,\n";
    let mut text_part = MimePart::new(
        &ContentType::new("text", "plain").with_parameter("charset", "utf-8"),
        TransferEncoding::EightBit,
        text.as_bytes(),
    );
    text_part.headers_mut().set("Content-Disposition", "inline").unwrap();
    multipart.push(text_part);

    multipart.push(MimePart::new(
        &ContentType::new("application", "octet-stream").with_parameter("name", "data.bin"),
        TransferEncoding::Binary,
        &(0..=255).collect::<Vec<u8>>(),
    ));

    let embedded = Entity::parse(b"Subject: forwarded\r\nContent-Type: text/plain\r\n\r\nFrom the archive  \r\n").unwrap();
    multipart.push(MessagePart::new(Some(embedded)));

    Entity::Multipart(multipart)
}

/// Finds the first leaf part in an entity tree, depth first.
pub fn first_leaf(entity: &Entity) -> Option<&MimePart> {
    match entity {
        Entity::Part(part) => Some(part),
        Entity::Multipart(m) => m.parts().iter().find_map(first_leaf),
        Entity::Signed(m) => m.parts().iter().find_map(first_leaf),
        Entity::Encrypted(m) => m.parts().iter().find_map(first_leaf),
        Entity::Message(m) => m.message().and_then(first_leaf),
    }
}

/// A context that records the content passed to it, delegating everything
/// to a keyring.
pub struct RecordingContext {
    pub inner: KeyringContext,
    pub content: Mutex<Vec<Vec<u8>>>,
}

impl RecordingContext {
    pub fn new(inner: KeyringContext) -> Self {
        Self {
            inner,
            content: Mutex::new(vec![]),
        }
    }

    pub fn recorded(&self) -> Vec<Vec<u8>> {
        self.content.lock().unwrap().clone()
    }

    fn record(&self, content: &[u8]) {
        self.content.lock().unwrap().push(content.to_vec());
    }
}

impl CryptoContext for RecordingContext {
    fn signature_protocol(&self) -> &str {
        self.inner.signature_protocol()
    }

    fn encryption_protocol(&self) -> &str {
        self.inner.encryption_protocol()
    }

    fn supports(&self, protocol: &str) -> bool {
        self.inner.supports(protocol)
    }

    fn mic_algorithm_name(&self, digest_alg: DigestAlgorithm) -> Result<String, CryptoError> {
        self.inner.mic_algorithm_name(digest_alg)
    }

    fn sign(
        &self,
        signer: &str,
        digest_alg: DigestAlgorithm,
        content: &[u8],
    ) -> Result<MimePart, CryptoError> {
        self.record(content);
        self.inner.sign(signer, digest_alg, content)
    }

    fn verify(&self, content: &[u8], signature: &[u8]) -> Result<Vec<SignatureResult>, CryptoError> {
        self.record(content);
        self.inner.verify(content, signature)
    }

    fn encrypt(&self, recipients: &[String], content: &[u8]) -> Result<MimePart, CryptoError> {
        self.record(content);
        self.inner.encrypt(recipients, content)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Decrypted, CryptoError> {
        self.inner.decrypt(ciphertext)
    }

    fn sign_and_encrypt(
        &self,
        signer: &str,
        digest_alg: DigestAlgorithm,
        recipients: &[String],
        content: &[u8],
    ) -> Result<MimePart, CryptoError> {
        self.record(content);
        self.inner.sign_and_encrypt(signer, digest_alg, recipients, content)
    }
}

/// A context that fails every operation as if the user had cancelled it.
pub struct CancellingContext;

impl CryptoContext for CancellingContext {
    fn signature_protocol(&self) -> &str {
        "application/x-cancel-signature"
    }

    fn encryption_protocol(&self) -> &str {
        "application/x-cancel-encrypted"
    }

    fn supports(&self, protocol: &str) -> bool {
        protocol.eq_ignore_ascii_case(self.signature_protocol())
            || protocol.eq_ignore_ascii_case(self.encryption_protocol())
    }

    fn mic_algorithm_name(&self, _: DigestAlgorithm) -> Result<String, CryptoError> {
        Ok("sha-256".into())
    }

    fn sign(&self, _: &str, _: DigestAlgorithm, _: &[u8]) -> Result<MimePart, CryptoError> {
        Err(CryptoError::Cancelled)
    }

    fn verify(&self, _: &[u8], _: &[u8]) -> Result<Vec<SignatureResult>, CryptoError> {
        Err(CryptoError::Cancelled)
    }

    fn encrypt(&self, _: &[String], _: &[u8]) -> Result<MimePart, CryptoError> {
        Err(CryptoError::Cancelled)
    }

    fn decrypt(&self, _: &[u8]) -> Result<Decrypted, CryptoError> {
        Err(CryptoError::BadPassphrase)
    }

    fn sign_and_encrypt(
        &self,
        _: &str,
        _: DigestAlgorithm,
        _: &[String],
        _: &[u8],
    ) -> Result<MimePart, CryptoError> {
        Err(CryptoError::Cancelled)
    }
}
