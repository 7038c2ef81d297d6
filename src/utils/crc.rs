/// CRC-32/MPEG-2 as used by PSI sections (ISO/IEC 13818-1 annex A).
///
/// Polynomial 0x04C11DB7, initial value 0xFFFFFFFF, no reflection, no final xor.
/// Running the checksum over a whole section including its trailing CRC field
/// yields zero when the section is intact.
const CRC32_MPEG2_POLY: u32 = 0x04C1_1DB7;

const CRC32_MPEG2_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ CRC32_MPEG2_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// MPEG-2 CRC32 calculator for PAT/PMT sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32Mpeg2;

impl Crc32Mpeg2 {
    /// Computes the checksum of `data`.
    ///
    /// ```
    /// use udphls::utils::Crc32Mpeg2;
    ///
    /// assert_eq!(Crc32Mpeg2::checksum(&[0x01, 0x01]), 0xD66F_B816);
    /// ```
    pub fn checksum(data: &[u8]) -> u32 {
        data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
            let index = ((crc >> 24) ^ byte as u32) & 0xFF;
            (crc << 8) ^ CRC32_MPEG2_TABLE[index as usize]
        })
    }

    /// Returns true when `section` (CRC field included) carries a valid checksum.
    pub fn verify(section: &[u8]) -> bool {
        section.len() >= 4 && Self::checksum(section) == 0
    }
}
