/**
 * Fixtures shared by unit tests
 */

/// SOI, APP0 (JFIF), a stub scan and EOI: enough structure for segment parsers.
pub fn bare_jpeg() -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    bytes.extend_from_slice(b"JFIF\0");
    bytes.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    bytes.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
    bytes.extend_from_slice(&[0x12, 0x34, 0x56]);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}
