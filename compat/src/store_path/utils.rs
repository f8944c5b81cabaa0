use crate::nixhash::{hash_string, HashAlgo};
use crate::store_path::{Error, StoreDir, StorePath, DIGEST_SIZE};

/// compress_hash takes an arbitrarily long sequence of bytes (usually
/// a hash digest), and returns a sequence of bytes of length
/// OUTPUT_SIZE.
///
/// It's calculated by rotating through the bytes in the output buffer
/// (zero- initialized), and XOR'ing with each byte of the passed
/// input. It consumes 1 byte at a time, and XOR's it with the current
/// value in the output buffer.
///
/// This mimics equivalent functionality in C++ Nix.
pub fn compress_hash<const OUTPUT_SIZE: usize>(input: &[u8]) -> [u8; OUTPUT_SIZE] {
    let mut output = [0; OUTPUT_SIZE];

    for (ii, ch) in input.iter().enumerate() {
        output[ii % OUTPUT_SIZE] ^= ch;
    }

    output
}

/// Builds the fingerprint of a literal text file with references:
///
///  - `text`
///  - references, individually prefixed by `:`
///  - the sha256 digest of the contents, as nix hex string
///  - the store dir
///  - the name
///
/// all separated by `:`.
pub fn text_fingerprint<S, I, C>(
    store_dir: &StoreDir,
    name: &str,
    content: C,
    references: I,
) -> String
where
    S: AsRef<str>,
    I: IntoIterator<Item = S>,
    C: AsRef<[u8]>,
{
    let mut s = String::from("text");

    for reference in references {
        s.push(':');
        s.push_str(reference.as_ref());
    }

    s.push(':');
    s.push_str(&hash_string(HashAlgo::Sha256, content).to_nix_hex_string());
    s.push_str(&format!(":{}:{}", store_dir, name));

    s
}

/// Build a store path for a literal text file in the store that may
/// contain references. Derivations are stored this way.
///
/// The fingerprint from [text_fingerprint] is hashed with sha256, the digest
/// compressed to 20 bytes.
pub fn build_text_path<S, I, C>(
    store_dir: &StoreDir,
    name: &str,
    content: C,
    references: I,
) -> Result<StorePath, Error>
where
    S: AsRef<str>,
    I: IntoIterator<Item = S>,
    C: AsRef<[u8]>,
{
    let fingerprint = text_fingerprint(store_dir, name, content, references);
    let digest = hash_string(HashAlgo::Sha256, fingerprint).digest;

    StorePath::from_name_and_digest(name, compress_hash::<DIGEST_SIZE>(&digest))
}
