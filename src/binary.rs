//! Interface to the binary codec, and the semantic hash built on top of it.
//!
//! The kernel neither encodes nor decodes terms itself; a codec lives
//! outside and is handed in through [`TermCodec`]. The only operation the
//! kernel contributes is [`semantic_hash`], which fixes *what* is encoded:
//! the alpha-beta-normal form of the expression.

use crate::kernel::{alpha_beta_eval, quote};
use crate::term::Term;
use alloc::vec::Vec;
use sha2::{Digest, Sha256};

/// Multihash prefix declaring a 32-byte SHA2-256 digest.
const MULTIHASH_SHA256: [u8; 2] = [0x12, 0x20];

/// The external binary codec.
///
/// Implementations must round-trip bit-exactly: decoding an encoded term
/// yields a syntactically equal term.
pub trait TermCodec {
    type Error;

    fn encode(&self, term: &Term) -> Result<Vec<u8>, Self::Error>;
    fn decode(&self, bytes: &[u8]) -> Result<Term, Self::Error>;
}

/// Hash a term up to judgmental equality: normalize with alpha-renaming,
/// quote, encode, and digest. Two judgmentally equal expressions hash to
/// the same 34 bytes, multihash prefix included.
pub fn semantic_hash<C: TermCodec>(term: &Term, codec: &C) -> Result<[u8; 34], C::Error> {
    let normal = quote(&alpha_beta_eval(term));
    let encoded = codec.encode(&normal)?;
    let digest = Sha256::digest(&encoded);
    let mut hash = [0u8; 34];
    hash[..2].copy_from_slice(&MULTIHASH_SHA256);
    hash[2..].copy_from_slice(&digest);
    Ok(hash)
}
