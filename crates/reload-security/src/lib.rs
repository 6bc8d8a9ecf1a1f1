mod checksum;
mod ed25519;

pub use checksum::{sha256_file_hex, sha256_hex, verify_sha256_file};
pub use ed25519::verify_ed25519_signature_hex;
