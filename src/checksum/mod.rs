//! MD5 digests as used by X3P.
//!
//! The container carries `md5checksum.hex`, a single line of the form
//! `<32 hex digits> *main.xml`.  DataLink members carry their own digest in
//! `main.xml`.  All comparisons are on lowercase hex.

use md5::{Digest, Md5};

use crate::validate::Warning;

/// Lowercase hex MD5 of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// The line written to `md5checksum.hex` for `main.xml` bytes.
pub fn checksum_line(xml: &[u8], member: &str) -> String {
    format!("{} *{}", md5_hex(xml), member)
}

/// Extract the digest from a checksum-file line: the token before the
/// first space, lowercased.
pub fn parse_checksum_line(text: &str) -> String {
    text.trim_start_matches('\u{feff}')
        .trim()
        .split(' ')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Compare a declared digest with the digest of `data`.
pub fn verify(member: &str, declared: &str, data: &[u8]) -> Result<(), Warning> {
    let declared = declared.trim().to_lowercase();
    let computed = md5_hex(data);
    if declared == computed {
        Ok(())
    } else {
        Err(Warning::ChecksumMismatch { member: member.to_owned(), declared, computed })
    }
}
