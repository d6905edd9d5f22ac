//! Content digests used as deduplication keys.

use sha2::{Digest, Sha256};

use crate::GrayImage;

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Digest of a raster: dimensions are mixed in so that equal pixel buffers
/// with different shapes do not collide.
pub fn raster_hash(image: &GrayImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update((image.width as u64).to_le_bytes());
    hasher.update((image.height as u64).to_le_bytes());
    hasher.update(&image.data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn raster_shape_changes_digest() {
        let a = GrayImage::filled(4, 2, 7);
        let b = GrayImage::filled(2, 4, 7);
        assert_ne!(raster_hash(&a), raster_hash(&b));
        assert_eq!(raster_hash(&a), raster_hash(&a.clone()));
    }
}
