use crate::crypto::DigestAlgorithm;
use sha2::{Sha256, Sha512};
#[cfg(feature = "sha1")]
use sha1::Sha1;

/// Computes the digest of the concatenation of the given slices.
pub fn digest<I, T>(digest_alg: DigestAlgorithm, slices: I) -> Box<[u8]>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    use digest::DynDigest;

    let mut hasher: Box<dyn DynDigest> = match digest_alg {
        DigestAlgorithm::Sha256 => Box::new(Sha256::default()),
        DigestAlgorithm::Sha512 => Box::new(Sha512::default()),
        #[cfg(feature = "sha1")]
        DigestAlgorithm::Sha1 => Box::new(Sha1::default()),
    };

    for bytes in slices {
        hasher.update(bytes.as_ref());
    }

    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64ct::{Base64, Encoding};

    #[test]
    fn digest_known_values() {
        let hash = digest(DigestAlgorithm::Sha256, [b"\r\n"]);
        assert_eq!(Base64::encode_string(&hash), "frcCV1k9oG9oKj3dpUqdJg1PxRT2RSN/XKdLCPjaYaY=");

        let hash = digest(DigestAlgorithm::Sha256, Vec::<&[u8]>::new());
        assert_eq!(Base64::encode_string(&hash), "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
    }

    #[test]
    fn digest_slices_concatenate() {
        let whole = digest(DigestAlgorithm::Sha512, [&b"hello world"[..]]);
        let parts = digest(DigestAlgorithm::Sha512, [&b"hello"[..], &b" "[..], &b"world"[..]]);
        assert_eq!(whole, parts);
        assert_eq!(whole.len(), 64);
    }

    #[cfg(feature = "sha1")]
    #[test]
    fn digest_known_values_sha1() {
        let hash = digest(DigestAlgorithm::Sha1, [b"\r\n"]);
        assert_eq!(Base64::encode_string(&hash), "uoq1oCgLlTqpdDX/iUbLy7J1Wic=");
    }
}
