/// Forward-only reader over SCALE-encoded bytes.
///
/// Storage values come back from the node as raw SCALE; every decoder in
/// this crate walks them through a `Cursor` so bounds checks live in one
/// place.
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take the next `n` bytes, or fail if the value is truncated.
    pub fn take(&mut self, n: usize) -> eyre::Result<&'a [u8]> {
        if self.remaining() < n {
            eyre::bail!(
                "Truncated SCALE value: wanted {} bytes at offset {}, {} left",
                n,
                self.pos,
                self.remaining()
            );
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> eyre::Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u32_le(&mut self) -> eyre::Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn u64_le(&mut self) -> eyre::Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn u128_le(&mut self) -> eyre::Result<u128> {
        let bytes = self.take(16)?;
        Ok(u128::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn i128_le(&mut self) -> eyre::Result<i128> {
        let bytes = self.take(16)?;
        Ok(i128::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Decode a compact-encoded unsigned integer. The two low bits of the
    /// first byte select the mode: single byte, two bytes, four bytes, or
    /// big-integer with an explicit length.
    pub fn compact_u128(&mut self) -> eyre::Result<u128> {
        let first = self.u8()?;
        let value = match first & 0b11 {
            0b00 => (first >> 2) as u128,
            0b01 => {
                let second = self.u8()?;
                (u16::from_le_bytes([first, second]) >> 2) as u128
            }
            0b10 => {
                let rest = self.take(3)?;
                (u32::from_le_bytes([first, rest[0], rest[1], rest[2]]) >> 2) as u128
            }
            _ => {
                let len = (first >> 2) as usize + 4;
                if len > 16 {
                    eyre::bail!("Compact integer of {} bytes exceeds u128", len);
                }
                let mut buf = [0u8; 16];
                buf[..len].copy_from_slice(self.take(len)?);
                u128::from_le_bytes(buf)
            }
        };
        Ok(value)
    }

    pub fn compact_len(&mut self) -> eyre::Result<usize> {
        let value = self.compact_u128()?;
        usize::try_from(value).map_err(|_| eyre::eyre!("Compact length {} out of range", value))
    }

    /// Decode a `Vec<u8>`: compact length followed by that many bytes.
    pub fn byte_vec(&mut self) -> eyre::Result<&'a [u8]> {
        let len = self.compact_len()?;
        self.take(len)
    }

    /// Decode an `Option<T>` given a decoder for `T`.
    pub fn option<T>(
        &mut self,
        decode: impl FnOnce(&mut Self) -> eyre::Result<T>,
    ) -> eyre::Result<Option<T>> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(decode(self)?)),
            tag => eyre::bail!("Invalid Option tag {:#04x}", tag),
        }
    }
}
