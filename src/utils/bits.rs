use crate::error::{Result, UdpHlsError};

/// Big-endian bit reader over a byte slice.
///
/// Covers what SPS and ADTS header parsing need: fixed-width fields and the
/// exp-Golomb codes (`ue(v)` / `se(v)`) of H.264.
///
/// ```
/// use udphls::utils::BitReader;
///
/// let data = [0b1011_0011];
/// let mut reader = BitReader::new(&data);
/// assert!(reader.read_bit().unwrap());
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = self
            .data
            .get(self.position / 8)
            .ok_or_else(|| UdpHlsError::Codec("bitstream exhausted".into()))?;
        let bit = (byte >> (7 - self.position % 8)) & 1;
        self.position += 1;
        Ok(bit == 1)
    }

    /// Reads `n` bits (at most 32) as an unsigned big-endian number.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(UdpHlsError::Codec(format!("cannot read {} bits at once", n)));
        }
        if n as usize > self.remaining() {
            return Err(UdpHlsError::Codec("bitstream exhausted".into()));
        }
        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Ok(value as u32)
    }

    /// Unsigned exp-Golomb code.
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0u32;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(UdpHlsError::Codec("malformed exp-Golomb code".into()));
            }
        }
        let suffix = self.read_bits(leading_zeros)? as u64;
        Ok(((1u64 << leading_zeros) - 1 + suffix) as u32)
    }

    /// Signed exp-Golomb code: odd codes map to positive values.
    pub fn read_se(&mut self) -> Result<i32> {
        let code = self.read_ue()? as i64;
        let magnitude = (code + 1) / 2;
        let value = if code % 2 == 1 { magnitude } else { -magnitude };
        Ok(value as i32)
    }

    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(UdpHlsError::Codec("bitstream exhausted".into()));
        }
        self.position += n;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.position
    }
}
