//! SHA256 checksums of migration SQL, recorded on apply and verified on
//! every later run

use sha2::{Digest, Sha256};

pub fn compute_checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
