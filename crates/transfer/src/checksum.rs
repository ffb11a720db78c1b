use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::TransferError;

/// Computes CRC32 of `data` and returns it in wire format.
pub fn checksum_bytes(data: &[u8]) -> String {
    encode(crc32fast::hash(data))
}

/// Computes CRC32 over several slices as if they were one buffer.
pub fn checksum_concat<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut hasher = crc32fast::Hasher::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    encode(hasher.finalize())
}

/// Decodes a wire-format checksum back into its CRC32 value.
pub fn decode_checksum(encoded: &str) -> Result<u32, TransferError> {
    let raw = STANDARD
        .decode(encoded)
        .map_err(|e| TransferError::InvalidChecksum(format!("{encoded}: {e}")))?;
    let bytes: [u8; 4] = raw.as_slice().try_into().map_err(|_| {
        TransferError::InvalidChecksum(format!("{encoded}: expected 4 bytes, got {}", raw.len()))
    })?;
    Ok(u32::from_be_bytes(bytes))
}

/// Combines per-part checksums the way S3 reports composite multipart
/// checksums: CRC32 over the concatenated raw part digests, suffixed `-N`.
pub fn composite_checksum(part_checksums: &[String]) -> Result<String, TransferError> {
    let mut hasher = crc32fast::Hasher::new();
    for checksum in part_checksums {
        hasher.update(&decode_checksum(checksum)?.to_be_bytes());
    }
    Ok(format!(
        "{}-{}",
        encode(hasher.finalize()),
        part_checksums.len()
    ))
}

/// Drops the `-N` part-count suffix from a server-reported object checksum.
pub fn strip_part_count(checksum: &str) -> &str {
    match checksum.rsplit_once('-') {
        Some((base, count)) if !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) => {
            base
        }
        _ => checksum,
    }
}

fn encode(crc: u32) -> String {
    STANDARD.encode(crc.to_be_bytes())
}
