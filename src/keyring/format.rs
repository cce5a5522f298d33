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

//! Text formats of keyring signatures and ciphertexts.
//!
//! Both formats are a block of `Name: value` fields, one per line, with long
//! values folded onto continuation lines that begin with a space. A signature
//! part body is just such a block. Encrypted data and signed plaintext are a
//! field block, a blank line, and then raw data.

use crate::{
    crypto::{DigestAlgorithm, KeyType, WrappedKey},
    util::{self, CanonicalStr},
};
use bstr::ByteSlice;
use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    str,
};

const FOLD_WIDTH: usize = 76;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct FormatError;

impl Display for FormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "malformed keyring data")
    }
}

impl Error for FormatError {}

/// A signature as carried in a signature part or in signed plaintext.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignatureBlock {
    pub signer: String,
    /// The algorithm as given, eg `ed25519-sha256`.
    pub algorithm: String,
    pub signature: Vec<u8>,
}

/// Formats a signature algorithm name such as `rsa-sha256`.
pub fn algorithm_name(key_type: KeyType, digest_alg: DigestAlgorithm) -> String {
    format!("{}-{}", key_type.canonical_str(), digest_alg.canonical_str())
}

/// Parses a signature algorithm name. Returns `None` for algorithms not
/// supported in this build.
pub fn parse_algorithm_name(s: &str) -> Option<(KeyType, DigestAlgorithm)> {
    let (key_type, digest_alg) = s.trim().split_once('-')?;
    Some((KeyType::from_name(key_type)?, DigestAlgorithm::from_name(digest_alg)?))
}

fn push_field(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend(name.as_bytes());
    out.extend(b":");

    let mut rest = value;
    let mut first = true;
    loop {
        let width = if first { FOLD_WIDTH.saturating_sub(name.len() + 2) } else { FOLD_WIDTH - 1 };
        let split = rest.len().min(width.max(1));
        // values are ASCII; fall back to the whole rest otherwise
        let (chunk, next) = if rest.is_char_boundary(split) {
            rest.split_at(split)
        } else {
            (rest, "")
        };
        out.push(b' ');
        out.extend(chunk.as_bytes());
        out.extend(b"\r\n");
        rest = next;
        first = false;
        if rest.is_empty() {
            break;
        }
    }
}

/// Writes signature blocks as a field block, without terminating blank line.
pub fn write_signatures(out: &mut Vec<u8>, signatures: &[SignatureBlock]) {
    for sig in signatures {
        push_field(out, "Signer", &sig.signer);
        push_field(out, "Algorithm", &sig.algorithm);
        push_field(out, "Signature", &util::encode_base64(&sig.signature));
    }
}

/// Parses a field block. Continuation lines are joined without the line
/// break and the single leading space or tab.
pub fn parse_fields(block: &[u8]) -> Result<Vec<(String, String)>, FormatError> {
    let block = str::from_utf8(block).map_err(|_| FormatError)?;

    let mut fields: Vec<(String, String)> = vec![];

    for line in block.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(continuation) = line.strip_prefix([' ', '\t']) {
            let (_, value) = fields.last_mut().ok_or(FormatError)?;
            value.push_str(continuation);
        } else {
            let (name, value) = line.split_once(':').ok_or(FormatError)?;
            fields.push((name.trim().to_owned(), value.trim_start().to_owned()));
        }
    }

    for (_, value) in &mut fields {
        value.truncate(value.trim_end().len());
    }

    Ok(fields)
}

/// Reads the signature blocks in a field block. Each *Signer* field begins a
/// new signature; fields other than the three signature fields are ignored.
pub fn parse_signatures(block: &[u8]) -> Result<Vec<SignatureBlock>, FormatError> {
    let mut signatures = vec![];
    let mut current: Option<(String, Option<String>, Option<Vec<u8>>)> = None;

    for (name, value) in parse_fields(block)? {
        if name.eq_ignore_ascii_case("Signer") {
            if let Some(sig) = current.take() {
                signatures.push(finish_signature(sig)?);
            }
            current = Some((value, None, None));
        } else if name.eq_ignore_ascii_case("Algorithm") {
            let (_, algorithm, _) = current.as_mut().ok_or(FormatError)?;
            *algorithm = Some(value);
        } else if name.eq_ignore_ascii_case("Signature") {
            let (_, _, signature) = current.as_mut().ok_or(FormatError)?;
            *signature = Some(util::decode_base64(&value).map_err(|_| FormatError)?);
        }
    }

    if let Some(sig) = current {
        signatures.push(finish_signature(sig)?);
    }

    Ok(signatures)
}

fn finish_signature(
    (signer, algorithm, signature): (String, Option<String>, Option<Vec<u8>>),
) -> Result<SignatureBlock, FormatError> {
    match (algorithm, signature) {
        (Some(algorithm), Some(signature)) => Ok(SignatureBlock { signer, algorithm, signature }),
        _ => Err(FormatError),
    }
}

/// Splits data at the first blank line into field block and raw data.
pub fn split_block(data: &[u8]) -> Result<(&[u8], &[u8]), FormatError> {
    if let Some(rest) = data.strip_prefix(b"\r\n") {
        return Ok((&data[..0], rest));
    }
    let i = data.find(b"\r\n\r\n").ok_or(FormatError)?;
    Ok((&data[..(i + 2)], &data[(i + 4)..]))
}

/// Encrypted data: the wrapped content keys, and the sealed payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Envelope {
    pub keys: Vec<WrappedKey>,
    pub nonce: [u8; 24],
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![];

        for key in &self.keys {
            let value = format!(
                "{} {} {}",
                util::encode_base64(key.ephemeral),
                util::encode_base64(key.nonce),
                util::encode_base64(&key.ciphertext),
            );
            push_field(&mut out, "Key", &value);
        }
        push_field(&mut out, "Nonce", &util::encode_base64(self.nonce));
        out.extend(b"\r\n");
        out.extend(&self.payload);

        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, FormatError> {
        let (block, payload) = split_block(data)?;

        let mut keys = vec![];
        let mut nonce = None;

        for (name, value) in parse_fields(block)? {
            if name.eq_ignore_ascii_case("Key") {
                keys.push(parse_wrapped_key(&value)?);
            } else if name.eq_ignore_ascii_case("Nonce") {
                nonce = Some(decode_array(&value)?);
            }
        }

        Ok(Self {
            keys,
            nonce: nonce.ok_or(FormatError)?,
            payload: payload.to_vec(),
        })
    }
}

fn parse_wrapped_key(value: &str) -> Result<WrappedKey, FormatError> {
    let mut parts = value.split_ascii_whitespace();

    let ephemeral = decode_array(parts.next().ok_or(FormatError)?)?;
    let nonce = decode_array(parts.next().ok_or(FormatError)?)?;
    let ciphertext = util::decode_base64(parts.next().ok_or(FormatError)?).map_err(|_| FormatError)?;

    if parts.next().is_some() {
        return Err(FormatError);
    }

    Ok(WrappedKey { ephemeral, nonce, ciphertext })
}

fn decode_array<const N: usize>(s: &str) -> Result<[u8; N], FormatError> {
    util::decode_base64(s)
        .map_err(|_| FormatError)?
        .try_into()
        .map_err(|_| FormatError)
}
