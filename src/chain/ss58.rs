use blake2::{Blake2b512, Digest};

/// Domain separator mixed into every SS58 checksum.
const CHECKSUM_PREAMBLE: &[u8] = b"SS58PRE";

/// Encode a 32-byte public key as an SS58 address under a network prefix.
/// Prefixes below 64 take one byte; parachain registry prefixes (Interlay
/// 2032, Kintsugi 2092) use the two-byte form.
pub fn encode(prefix: u16, pubkey: &[u8; 32]) -> String {
    let mut data = Vec::with_capacity(36);
    if prefix < 64 {
        data.push(prefix as u8);
    } else {
        let ident = prefix & 0b0011_1111_1111_1111;
        data.push(((ident & 0b0000_0000_1111_1100) >> 2) as u8 | 0b0100_0000);
        data.push(((ident >> 8) as u8) | (((ident & 0b11) as u8) << 6));
    }
    data.extend_from_slice(pubkey);

    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREAMBLE);
    hasher.update(&data);
    let checksum = hasher.finalize();
    data.extend_from_slice(&checksum[..2]);

    bs58::encode(data).into_string()
}

/// Decode an SS58 address back into its network prefix and public key,
/// verifying the checksum.
pub fn decode(address: &str) -> eyre::Result<(u16, [u8; 32])> {
    let data = bs58::decode(address)
        .into_vec()
        .map_err(|e| eyre::eyre!("Invalid base58 in address '{}': {}", address, e))?;

    let (prefix_len, prefix) = match data.first() {
        Some(&first) if first < 64 => (1, first as u16),
        Some(&first) if first < 128 => {
            let second = *data
                .get(1)
                .ok_or_else(|| eyre::eyre!("Address '{}' too short", address))?;
            let lower = ((first & 0b0011_1111) << 2) | (second >> 6);
            let upper = second & 0b0011_1111;
            (2, lower as u16 | ((upper as u16) << 8))
        }
        _ => eyre::bail!("Address '{}' has an unsupported prefix byte", address),
    };

    if data.len() != prefix_len + 32 + 2 {
        eyre::bail!(
            "Address '{}' has unexpected length {} for a 32-byte key",
            address,
            data.len()
        );
    }

    let body_end = data.len() - 2;
    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREAMBLE);
    hasher.update(&data[..body_end]);
    let checksum = hasher.finalize();
    if checksum[..2] != data[body_end..] {
        eyre::bail!("Address '{}' failed its checksum", address);
    }

    let mut pubkey = [0u8; 32];
    pubkey.copy_from_slice(&data[prefix_len..body_end]);
    Ok((prefix, pubkey))
}
