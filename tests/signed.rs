pub mod common;

use bstr::ByteSlice;
use common::{CancellingContext, RecordingContext, ALICE, BOB};
use viamime::{
    canonicalize::canonicalize_for_signing,
    crypto::{DigestAlgorithm, VerificationError},
    keyring::{Config, KeyringContext},
    ContentType, CryptoContext, CryptoError, Entity, EnvelopeError, MalformedKind, MimePart,
    Multipart, MultipartSigned, SignRequest, SignatureStatus, TransferEncoding,
};

fn sign(keyring: &dyn CryptoContext, signer: &str, entity: &mut Entity) -> MultipartSigned {
    let request = SignRequest::new(signer, DigestAlgorithm::Sha256);
    MultipartSigned::sign(Some(keyring), &request, entity).unwrap()
}

#[tokio::test]
async fn sign_and_verify_rsa() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let signed = sign(&keyring, ALICE, &mut entity);

    let content_type = signed.content_type();
    assert!(content_type.is_mime_type("multipart", "signed"));
    assert_eq!(content_type.parameter("protocol"), Some("application/x-viamime-signature"));
    assert_eq!(content_type.parameter("micalg"), Some("sha-256"));
    assert_eq!(content_type.boundary(), Some(signed.boundary()));
    assert_eq!(signed.len(), 2);

    let signature_part = signed.signature().unwrap().as_part().unwrap();
    assert!(signature_part
        .content_type()
        .is_mime_type("application", "x-viamime-signature"));

    let results = signed.verify(Some(&keyring)).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].signer, ALICE);
    assert_eq!(results[0].digest_algorithm, Some(DigestAlgorithm::Sha256));
    assert_eq!(results[0].status, SignatureStatus::Valid);
}

#[tokio::test]
async fn sign_and_verify_ed25519_sha512() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let request = SignRequest::new(BOB, DigestAlgorithm::Sha512);
    let signed = MultipartSigned::sign(Some(&keyring), &request, &mut entity).unwrap();

    assert_eq!(signed.content_type().parameter("micalg"), Some("sha-512"));

    // verification needs only the public keys
    let verifier = common::make_verifying_keyring().await;
    let results = signed.verify(Some(&verifier)).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].signer, BOB);
    assert_eq!(results[0].digest_algorithm, Some(DigestAlgorithm::Sha512));
    assert!(results[0].is_valid());
}

#[tokio::test]
async fn signed_content_serializes_to_signed_bytes() {
    let _ = tracing_subscriber::fmt::try_init();

    let ctx = RecordingContext::new(common::make_keyring().await);
    let mut entity = common::make_entity();

    let signed = sign(&ctx, ALICE, &mut entity);

    let recorded = ctx.recorded();
    assert_eq!(recorded.len(), 1);

    let signed_bytes = &recorded[0];
    let child_bytes = signed.content().unwrap().to_bytes();
    assert_eq!(child_bytes.as_bstr(), signed_bytes.as_bstr());

    // the signed bytes are the canonical form of the prepared entity
    assert_eq!(
        canonicalize_for_signing(&entity.to_bytes()).as_bstr(),
        signed_bytes.as_bstr()
    );

    // canonical form: CRLF only, no trailing whitespace, no "From " lines
    for line in signed_bytes.split_str("\r\n") {
        assert!(!line.contains(&b'\n'));
        assert!(!line.ends_with(b" ") && !line.ends_with(b"\t"));
        assert!(!line.starts_with(b"From "));
    }

    signed.verify(Some(&ctx)).unwrap();
    assert_eq!(ctx.recorded()[1].as_bstr(), signed_bytes.as_bstr());
}

#[tokio::test]
async fn sign_single_part_with_trailing_whitespace() {
    let _ = tracing_subscriber::fmt::try_init();

    let ctx = RecordingContext::new(common::make_keyring().await);
    let mut entity = Entity::Part(MimePart::new(
        &ContentType::text_plain(),
        TransferEncoding::SevenBit,
        b"hi   \n",
    ));

    let signed = sign(&ctx, ALICE, &mut entity);

    // the whitespace is protected by the Quoted-Printable encoding
    let part = entity.as_part().unwrap();
    assert_eq!(part.transfer_encoding(), TransferEncoding::QuotedPrintable);
    assert_eq!(part.body(), b"hi  =20\r\n");
    assert_eq!(part.decode_content().unwrap(), b"hi   \r\n");

    let signed_bytes = &ctx.recorded()[0];
    assert!(signed_bytes.ends_with(b"\r\n\r\nhi  =20\r\n"));

    let results = signed.verify(Some(&ctx)).unwrap();
    assert!(results[0].is_valid());
}

#[tokio::test]
async fn verify_after_transfer() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let signed = sign(&keyring, ALICE, &mut entity);
    let wire = Entity::Signed(signed).to_bytes();

    let Entity::Signed(received) = Entity::parse(&wire).unwrap() else {
        panic!("not multipart/signed");
    };
    let results = received.verify(Some(&keyring)).unwrap();
    assert!(results[0].is_valid());

    // a transport that converts line endings to LF does not break the
    // signature
    let wire = wire.replace("\r\n", "\n");
    let Entity::Signed(received) = Entity::parse(&wire).unwrap() else {
        panic!("not multipart/signed");
    };
    let results = received.verify(Some(&keyring)).unwrap();
    assert!(results[0].is_valid());
}

#[tokio::test]
async fn verify_tampered_content() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let signed = sign(&keyring, ALICE, &mut entity);
    let wire = Entity::Signed(signed).to_bytes();

    let tampered = wire.replace("it gets serious", "it gets hilarious");
    assert_ne!(tampered, wire);

    let Entity::Signed(received) = Entity::parse(&tampered).unwrap() else {
        panic!("not multipart/signed");
    };
    let results = received.verify(Some(&keyring)).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].signer, ALICE);
    assert_eq!(
        results[0].status,
        SignatureStatus::Invalid(VerificationError::VerificationFailure)
    );
}

#[tokio::test]
async fn verify_without_public_key() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let signed = sign(&keyring, ALICE, &mut entity);

    let stranger = viamime::KeyringContext::new();
    let results = signed.verify(Some(&stranger)).unwrap();

    assert_eq!(
        results[0].status,
        SignatureStatus::Invalid(VerificationError::NoPublicKey)
    );
}

#[tokio::test]
async fn verify_protocol_case_insensitive() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let mut signed = sign(&keyring, ALICE, &mut entity);

    let mut content_type = signed.content_type();
    content_type.set_parameter("protocol", "Application/X-VIAMIME-Signature");
    signed.set_content_type(&content_type).unwrap();

    let results = signed.verify(Some(&keyring)).unwrap();
    assert!(results[0].is_valid());
}

#[tokio::test]
async fn sign_unknown_signer() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let request = SignRequest::new("carol@example.net", DigestAlgorithm::Sha256);
    let result = MultipartSigned::sign(Some(&keyring), &request, &mut entity);

    assert_eq!(
        result,
        Err(EnvelopeError::Crypto(CryptoError::KeyNotFound("carol@example.net".into())))
    );
}

#[test]
fn sign_cancelled() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut entity = common::make_entity();

    let request = SignRequest::new(ALICE, DigestAlgorithm::Sha256);
    let result = MultipartSigned::sign(Some(&CancellingContext), &request, &mut entity);

    assert_eq!(result, Err(EnvelopeError::Crypto(CryptoError::Cancelled)));
}

#[tokio::test]
async fn verify_missing_protocol() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;

    let input = b"Content-Type: multipart/signed; boundary=frontier; micalg=sha-256\r\n\
        \r\n\
        --frontier\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        hello\r\n\
        --frontier--\r\n";
    let Entity::Signed(signed) = Entity::parse(input).unwrap() else {
        panic!("not multipart/signed");
    };

    assert_eq!(signed.verify(Some(&keyring)), Err(EnvelopeError::MissingProtocol));
}

#[tokio::test]
async fn verify_single_child() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;

    let input = b"Content-Type: multipart/signed; boundary=frontier;\r\n\
        \tprotocol=\"application/x-viamime-signature\"\r\n\
        \r\n\
        --frontier\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        hello\r\n\
        --frontier--\r\n";
    let Entity::Signed(signed) = Entity::parse(input).unwrap() else {
        panic!("not multipart/signed");
    };

    assert_eq!(
        signed.verify(Some(&keyring)),
        Err(EnvelopeError::MalformedEnvelope(MalformedKind::MissingParts))
    );
}

#[tokio::test]
async fn verify_unsupported_protocol() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;

    let input = b"Content-Type: multipart/signed; boundary=frontier;\r\n\
        \tprotocol=\"application/pkcs7-signature\"\r\n\
        \r\n\
        --frontier--\r\n";
    let Entity::Signed(signed) = Entity::parse(input).unwrap() else {
        panic!("not multipart/signed");
    };

    assert_eq!(
        signed.verify(Some(&keyring)),
        Err(EnvelopeError::UnsupportedProtocol("application/pkcs7-signature".into()))
    );
}

#[tokio::test]
async fn verify_signature_not_leaf() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let mut signed = sign(&keyring, ALICE, &mut entity);
    signed.parts_mut()[1] = Entity::Multipart(Multipart::new("mixed"));

    assert_eq!(
        signed.verify(Some(&keyring)),
        Err(EnvelopeError::MalformedEnvelope(MalformedKind::SignatureNotLeaf))
    );
}

#[tokio::test]
async fn verify_unsupported_signature_type() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let mut signed = sign(&keyring, ALICE, &mut entity);
    signed.parts_mut()[1] = Entity::Part(MimePart::new(
        &ContentType::new("text", "plain"),
        TransferEncoding::SevenBit,
        b"not a signature\r\n",
    ));

    assert_eq!(
        signed.verify(Some(&keyring)),
        Err(EnvelopeError::UnsupportedProtocol("text/plain".into()))
    );
}

#[tokio::test]
async fn verify_signature_type_differs_from_protocol() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut keyring = KeyringContext::with_config(Config {
        protocol_aliases: vec!["application/pgp-signature".into()],
        ..Default::default()
    });
    let signing_key = common::read_signing_key_from_file("tests/keys/rsa2048.pem").await.unwrap();
    keyring.add_signing_key(ALICE, signing_key).unwrap();
    let mut entity = common::make_entity();

    let mut signed = sign(&keyring, ALICE, &mut entity);

    let mut content_type = signed.content_type();
    content_type.set_parameter("protocol", "application/pgp-signature");
    signed.set_content_type(&content_type).unwrap();

    // the context supports both names, but the part does not carry the
    // declared protocol
    assert_eq!(
        signed.verify(Some(&keyring)),
        Err(EnvelopeError::UnsupportedProtocol("application/x-viamime-signature".into()))
    );

    signed.parts_mut()[1]
        .set_content_type(&ContentType::new("application", "pgp-signature"))
        .unwrap();

    let results = signed.verify(Some(&keyring)).unwrap();
    assert!(results[0].is_valid());
}

#[tokio::test]
async fn verify_signature_type_case_insensitive() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let mut signed = sign(&keyring, ALICE, &mut entity);
    signed.parts_mut()[1]
        .headers_mut()
        .set("Content-Type", "Application/X-VIAMIME-Signature")
        .unwrap();

    let results = signed.verify(Some(&keyring)).unwrap();
    assert!(results[0].is_valid());
}

#[tokio::test]
async fn verify_undecodable_signature() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let mut signed = sign(&keyring, ALICE, &mut entity);
    let mut headers = signed.signature().unwrap().headers().clone();
    headers.set("Content-Transfer-Encoding", "quoted-printable").unwrap();
    signed.parts_mut()[1] = Entity::Part(MimePart::from_raw(headers, b"broken=Z\r\n".to_vec()));

    assert_eq!(
        signed.verify(Some(&keyring)),
        Err(EnvelopeError::MalformedEnvelope(MalformedKind::UndecodableSignature))
    );
}

#[tokio::test]
async fn sign_nested_signed_entity() {
    let _ = tracing_subscriber::fmt::try_init();

    let keyring = common::make_keyring().await;
    let mut entity = common::make_entity();

    let inner = sign(&keyring, ALICE, &mut entity);
    let inner_bytes = Entity::Signed(inner.clone()).to_bytes();

    let mut outer = Multipart::new("mixed");
    outer.push(MimePart::new(
        &ContentType::text_plain(),
        TransferEncoding::SevenBit,
        b"Forwarding a signed message.\r\n",
    ));
    outer.push(inner);
    let mut outer = Entity::Multipart(outer);

    let signed = sign(&keyring, BOB, &mut outer);

    // the inner envelope was not touched by preparation
    let Entity::Multipart(content) = signed.content().unwrap() else {
        panic!("not multipart/mixed");
    };
    let Entity::Signed(inner) = content.get(1).unwrap() else {
        panic!("not multipart/signed");
    };
    assert_eq!(Entity::Signed(inner.clone()).to_bytes().as_bstr(), inner_bytes.as_bstr());

    let results = signed.verify(Some(&keyring)).unwrap();
    assert_eq!(results[0].signer, BOB);
    assert!(results[0].is_valid());

    let results = inner.verify(Some(&keyring)).unwrap();
    assert_eq!(results[0].signer, ALICE);
    assert!(results[0].is_valid());
}
