//! Whole-lump LZMA decoding
//!
//! A compressed lump starts with a 17 byte header: the `LZMA` identifier,
//! the decompressed size, the compressed size and the five LZMA property
//! bytes. The raw LZMA stream follows. Lumps without the identifier hold
//! their records directly.

use byteorder::{LittleEndian, ReadBytesExt};
use std::borrow::Cow;
use std::io::{BufReader, Cursor, Read};

use crate::error::{Error, Result};
use crate::header::LumpId;

/// Identifier bytes of a compressed lump, in file order
pub const LZMA_MAGIC: [u8; 4] = *b"LZMA";

/// Size of the compression header preceding the LZMA stream
pub const LZMA_HEADER_SIZE: usize = 17;

/// Header in front of a compressed lump payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzmaHeader {
    /// Size of the lump after decompression
    pub actual_size: u32,
    /// Size of the LZMA stream following the header
    pub lzma_size: u32,
    /// LZMA coder properties
    pub properties: [u8; 5],
}

impl LzmaHeader {
    /// Read the compression header at the start of a lump
    ///
    /// Returns `Ok(None)` when the identifier does not match, meaning the lump
    /// is stored raw. A lump carrying the identifier but too short to hold the
    /// rest of the header is an error.
    pub fn detect(data: &[u8]) -> Result<Option<Self>> {
        if !is_compressed(data) {
            return Ok(None);
        }
        if data.len() < LZMA_HEADER_SIZE {
            return Err(Error::compression(format!(
                "truncated LZMA header: {} of {} bytes",
                data.len(),
                LZMA_HEADER_SIZE
            )));
        }

        let mut reader = &data[4..LZMA_HEADER_SIZE];
        let actual_size = reader.read_u32::<LittleEndian>()?;
        let lzma_size = reader.read_u32::<LittleEndian>()?;
        let mut properties = [0u8; 5];
        reader.read_exact(&mut properties)?;

        Ok(Some(Self {
            actual_size,
            lzma_size,
            properties,
        }))
    }
}

/// Whether a lump payload starts with the compression identifier
pub fn is_compressed(data: &[u8]) -> bool {
    data.starts_with(&LZMA_MAGIC)
}

/// Decode a lump payload, decompressing it when it carries the LZMA header
///
/// Raw payloads are returned borrowed. `max_size` bounds the declared
/// decompressed size.
pub fn decode_lump(id: LumpId, data: &[u8], max_size: usize) -> Result<Cow<'_, [u8]>> {
    let Some(header) = LzmaHeader::detect(data)? else {
        return Ok(Cow::Borrowed(data));
    };

    if id.is_segmented() {
        return Err(Error::SegmentedLump(id));
    }

    let actual_size = header.actual_size as usize;
    if actual_size > max_size {
        return Err(Error::LimitExceeded(format!(
            "lump {} decompresses to {} bytes, limit is {}",
            id, actual_size, max_size
        )));
    }

    let available = data.len() - LZMA_HEADER_SIZE;
    let lzma_size = header.lzma_size as usize;
    if lzma_size > available {
        return Err(Error::compression(format!(
            "lump {} declares {} compressed bytes but only {} follow the header",
            id, lzma_size, available
        )));
    }

    let payload = &data[LZMA_HEADER_SIZE..LZMA_HEADER_SIZE + lzma_size];
    let output = decompress(&header, payload)?;

    if output.len() != actual_size {
        return Err(Error::compression(format!(
            "lump {} decompressed to {} bytes, header declares {}",
            id,
            output.len(),
            actual_size
        )));
    }

    log::debug!(
        "Decompressed lump {}: {} -> {} bytes",
        id,
        lzma_size,
        actual_size
    );

    Ok(Cow::Owned(output))
}

/// Decompress a raw LZMA stream described by a lump compression header
fn decompress(header: &LzmaHeader, payload: &[u8]) -> Result<Vec<u8>> {
    // lzma-rs expects the .lzma container: properties then the 64-bit unpacked size
    let mut stream = Vec::with_capacity(13 + payload.len());
    stream.extend_from_slice(&header.properties);
    stream.extend_from_slice(&u64::from(header.actual_size).to_le_bytes());
    stream.extend_from_slice(payload);

    let mut input = BufReader::new(Cursor::new(stream));
    let mut output = Vec::with_capacity(header.actual_size as usize);

    match lzma_rs::lzma_decompress(&mut input, &mut output) {
        Ok(()) => Ok(output),
        Err(e) => {
            log::error!("LZMA decompression failed: {:?}", e);
            log::debug!(
                "First 16 bytes of stream: {:02X?}",
                &payload[..16.min(payload.len())]
            );
            Err(Error::compression(format!(
                "LZMA decompression failed: {:?}",
                e
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::lzma_wrap;
    use proptest::prelude::*;

    #[test]
    fn test_raw_lump_is_borrowed() {
        let data = b"plain lump bytes, no header here";
        let decoded = decode_lump(LumpId::Planes, data, usize::MAX).unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(&*decoded, data);
    }

    #[test]
    fn test_compressed_lump_round_trip() {
        let original: Vec<u8> = (0..4096u32).flat_map(|i| (i % 97).to_le_bytes()).collect();
        let wrapped = lzma_wrap(&original);

        let header = LzmaHeader::detect(&wrapped).unwrap().unwrap();
        assert_eq!(header.actual_size as usize, original.len());
        assert_eq!(header.lzma_size as usize, wrapped.len() - LZMA_HEADER_SIZE);

        let decoded = decode_lump(LumpId::Nodes, &wrapped, usize::MAX).unwrap();
        assert!(matches!(decoded, Cow::Owned(_)));
        assert_eq!(&*decoded, &original[..]);
    }

    #[test]
    fn test_segmented_lumps_are_rejected() {
        let wrapped = lzma_wrap(b"zip bytes");
        assert!(matches!(
            decode_lump(LumpId::PakFile, &wrapped, usize::MAX),
            Err(Error::SegmentedLump(LumpId::PakFile))
        ));
        assert!(matches!(
            decode_lump(LumpId::GameLump, &wrapped, usize::MAX),
            Err(Error::SegmentedLump(LumpId::GameLump))
        ));

        // Uncompressed payloads pass through untouched
        let raw = decode_lump(LumpId::PakFile, b"PK\x03\x04", usize::MAX).unwrap();
        assert_eq!(&*raw, b"PK\x03\x04");
    }

    #[test]
    fn test_declared_size_limit() {
        let wrapped = lzma_wrap(&[7u8; 1024]);
        assert!(matches!(
            decode_lump(LumpId::Faces, &wrapped, 512),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_inconsistent_sizes_fail() {
        let mut wrapped = lzma_wrap(&[1u8; 256]);

        // Compressed size larger than the buffer
        let mut truncated = wrapped.clone();
        truncated.truncate(LZMA_HEADER_SIZE + 2);
        assert!(matches!(
            decode_lump(LumpId::Edges, &truncated, usize::MAX),
            Err(Error::Compression(_))
        ));

        // Declared decompressed size larger than the stream produces
        wrapped[4..8].copy_from_slice(&100_000u32.to_le_bytes());
        assert!(decode_lump(LumpId::Edges, &wrapped, usize::MAX).is_err());
    }

    #[test]
    fn test_short_identified_lump_is_not_raw() {
        let data = b"LZMA\x10\0\0\0\x04\0\0\0XYZW";
        assert!(is_compressed(data));
        assert!(matches!(
            decode_lump(LumpId::Planes, data, usize::MAX),
            Err(Error::Compression(_))
        ));

        // The bare identifier is still a compressed lump
        assert!(matches!(
            decode_lump(LumpId::Planes, b"LZMA", usize::MAX),
            Err(Error::Compression(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_raw_selection_is_deterministic(
            data in proptest::collection::vec(any::<u8>(), 0..256)
        ) {
            prop_assume!(data.len() < 4 || data[..4] != LZMA_MAGIC);
            let first = decode_lump(LumpId::Vertexes, &data, usize::MAX).unwrap();
            let second = decode_lump(LumpId::Vertexes, &data, usize::MAX).unwrap();
            prop_assert!(matches!(first, Cow::Borrowed(_)));
            prop_assert_eq!(&*first, &data[..]);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_identifier_always_selects_decompression(
            tail in proptest::collection::vec(any::<u8>(), 0..256)
        ) {
            let mut data = LZMA_MAGIC.to_vec();
            data.extend_from_slice(&tail);
            match decode_lump(LumpId::Vertexes, &data, 1 << 16) {
                Ok(decoded) => prop_assert!(matches!(decoded, Cow::Owned(_))),
                Err(e) => prop_assert!(
                    matches!(e, Error::Compression(_) | Error::LimitExceeded(_)),
                    "unexpected error {:?}",
                    e
                ),
            }
        }
    }
}
