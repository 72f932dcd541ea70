use std::hash::Hasher;
use twox_hash::XxHash64;

/// Byte length of a two-pallet-hash map prefix.
pub const PREFIX_LEN: usize = 32;

const BLAKE2_128_LEN: usize = 16;
const TWOX_64_LEN: usize = 8;

/// The `twox128` hasher Substrate uses for pallet and item names: two
/// seeded xxhash64 runs over the same input, concatenated little-endian.
pub fn twox128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for seed in 0..2u64 {
        let mut hasher = XxHash64::with_seed(seed);
        hasher.write(data);
        let offset = seed as usize * 8;
        out[offset..offset + 8].copy_from_slice(&hasher.finish().to_le_bytes());
    }
    out
}

/// Prefix shared by every entry of a storage map:
/// `twox128(pallet) ++ twox128(item)`.
pub fn storage_prefix(pallet: &str, item: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(PREFIX_LEN);
    prefix.extend_from_slice(&twox128(pallet.as_bytes()));
    prefix.extend_from_slice(&twox128(item.as_bytes()));
    prefix
}

/// Same prefix rendered the way the JSON-RPC API wants it.
pub fn storage_prefix_hex(pallet: &str, item: &str) -> String {
    format!("0x{}", hex::encode(storage_prefix(pallet, item)))
}

/// Full key for a plain (unkeyed) storage value.
pub fn plain_key_hex(pallet: &str, item: &str) -> String {
    storage_prefix_hex(pallet, item)
}

/// Strip the 32-byte map prefix off a full storage key, verifying it is
/// the prefix we asked the node for.
pub fn key_suffix<'a>(full_key: &'a [u8], prefix: &[u8]) -> eyre::Result<&'a [u8]> {
    if full_key.len() < prefix.len() || &full_key[..prefix.len()] != prefix {
        eyre::bail!(
            "Storage key 0x{} does not carry the expected prefix 0x{}",
            hex::encode(full_key),
            hex::encode(prefix)
        );
    }
    Ok(&full_key[prefix.len()..])
}

/// Skip the hash half of a `blake2_128_concat`-hashed map key, leaving the
/// SCALE-encoded key material that follows it.
pub fn strip_blake2_128_concat(hashed: &[u8]) -> eyre::Result<&[u8]> {
    if hashed.len() < BLAKE2_128_LEN {
        eyre::bail!(
            "Hashed key too short for blake2_128_concat: {} bytes",
            hashed.len()
        );
    }
    Ok(&hashed[BLAKE2_128_LEN..])
}

/// Skip the hash half of a `twox_64_concat`-hashed map key.
pub fn strip_twox_64_concat(hashed: &[u8]) -> eyre::Result<&[u8]> {
    if hashed.len() < TWOX_64_LEN {
        eyre::bail!(
            "Hashed key too short for twox_64_concat: {} bytes",
            hashed.len()
        );
    }
    Ok(&hashed[TWOX_64_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twox128_known_pallet() {
        // Prefix every Substrate chain shares, checkable against any
        // chain explorer.
        assert_eq!(
            hex::encode(twox128(b"System")),
            "26aa394eea5630e07c48ae0c9558cef7"
        );
    }

    #[test]
    fn test_storage_prefix_system_account() {
        assert_eq!(
            storage_prefix_hex("System", "Account"),
            "0x26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9"
        );
    }

    #[test]
    fn test_plain_key_timestamp_now() {
        assert_eq!(
            plain_key_hex("Timestamp", "Now"),
            "0xf0c365c3cf59d671eb72da0e7a4113c49f1f0515f462cdcf84e0f1d6045dfcbb"
        );
    }

    #[test]
    fn test_key_suffix_checks_prefix() {
        let prefix = storage_prefix("VaultRegistry", "Vaults");
        let mut key = prefix.clone();
        key.extend_from_slice(&[0xaa; 20]);
        assert_eq!(key_suffix(&key, &prefix).unwrap(), &[0xaa; 20]);

        let other = storage_prefix("System", "Account");
        assert!(key_suffix(&key, &other).is_err());
    }

    #[test]
    fn test_strip_concat_hashers() {
        let mut hashed = vec![0u8; 16];
        hashed.extend_from_slice(&7u32.to_le_bytes());
        assert_eq!(strip_blake2_128_concat(&hashed).unwrap(), &7u32.to_le_bytes());
        assert!(strip_blake2_128_concat(&[0u8; 10]).is_err());

        let mut hashed = vec![0u8; 8];
        hashed.extend_from_slice(&9u32.to_le_bytes());
        assert_eq!(strip_twox_64_concat(&hashed).unwrap(), &9u32.to_le_bytes());
        assert!(strip_twox_64_concat(&[0u8; 4]).is_err());
    }
}
