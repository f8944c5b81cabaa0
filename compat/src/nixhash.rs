use std::fmt::Display;
use std::str::FromStr;

use data_encoding::HEXLOWER;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

/// A digest together with the algorithm that produced it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NixHash {
    pub algo: HashAlgo,
    pub digest: Vec<u8>,
}

/// This are the hash algorithms supported by cppnix.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgo {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgo {
    pub fn digest_length(&self) -> usize {
        match self {
            HashAlgo::Md5 => 16,
            HashAlgo::Sha1 => 20,
            HashAlgo::Sha256 => 32,
            HashAlgo::Sha512 => 64,
        }
    }
}

impl Display for HashAlgo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            HashAlgo::Md5 => write!(f, "md5"),
            HashAlgo::Sha1 => write!(f, "sha1"),
            HashAlgo::Sha256 => write!(f, "sha256"),
            HashAlgo::Sha512 => write!(f, "sha512"),
        }
    }
}

impl FromStr for HashAlgo {
    type Err = Error;

    fn from_str(algo_str: &str) -> Result<Self, Self::Err> {
        match algo_str {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            _ => Err(Error::InvalidAlgo(algo_str.to_string())),
        }
    }
}

/// Errors related to NixHash construction.
#[derive(Debug, Eq, PartialEq, Error)]
pub enum Error {
    #[error("invalid hash algo: {0}")]
    InvalidAlgo(String),
}

impl NixHash {
    /// Formats a [NixHash] in the Nix default hash format,
    /// which is the algo, followed by a colon, then the lower hex encoded digest.
    pub fn to_nix_hex_string(&self) -> String {
        format!("{}:{}", self.algo, HEXLOWER.encode(&self.digest))
    }
}

/// Hashes `data` with the given algorithm.
pub fn hash_string<D: AsRef<[u8]>>(algo: HashAlgo, data: D) -> NixHash {
    let data = data.as_ref();
    let digest = match algo {
        HashAlgo::Md5 => Md5::digest(data).to_vec(),
        HashAlgo::Sha1 => Sha1::digest(data).to_vec(),
        HashAlgo::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgo::Sha512 => Sha512::digest(data).to_vec(),
    };

    NixHash { algo, digest }
}

/// Splits the `hashAlgo` field of a fixed-output derivation output into the
/// algorithm and whether the hash is over the NAR serialization (`r:` prefix)
/// or the flat file.
pub fn parse_output_hash_algo(s: &str) -> Result<(HashAlgo, bool), Error> {
    match s.strip_prefix("r:") {
        Some(algo) => Ok((algo.parse()?, true)),
        None => Ok((s.parse()?, false)),
    }
}
