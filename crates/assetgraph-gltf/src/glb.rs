//! GLB binary container.

use assetgraph_core::{AssetError, Result};

/// GLB magic number, "glTF" in little-endian.
pub const GLB_MAGIC: u32 = 0x46546C67;
/// GLB container version.
pub const GLB_VERSION: u32 = 2;
/// JSON chunk type, "JSON" in little-endian.
const CHUNK_JSON: u32 = 0x4E4F534A;
/// Binary chunk type, "BIN\0" in little-endian.
const CHUNK_BIN: u32 = 0x004E4942;

/// The chunks of a GLB file.
#[derive(Debug, Clone, Copy)]
pub struct Glb<'a> {
    pub json: &'a [u8],
    pub bin: Option<&'a [u8]>,
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Whether `data` starts with the GLB magic.
pub fn is_glb(data: &[u8]) -> bool {
    data.len() >= 4 && read_u32(data, 0) == GLB_MAGIC
}

/// Split a GLB file into its JSON and binary chunks.
pub fn parse(data: &[u8]) -> Result<Glb<'_>> {
    if data.len() < 12 {
        return Err(AssetError::invalid("GLB file too short"));
    }
    if read_u32(data, 0) != GLB_MAGIC {
        return Err(AssetError::invalid("invalid GLB magic"));
    }
    let version = read_u32(data, 4);
    if version != GLB_VERSION {
        return Err(AssetError::Unsupported(format!(
            "GLB version {} not supported",
            version
        )));
    }
    let total = (read_u32(data, 8) as usize).min(data.len());

    let mut offset = 12;
    let mut json = None;
    let mut bin = None;

    while offset + 8 <= total {
        let length = read_u32(data, offset) as usize;
        let kind = read_u32(data, offset + 4);
        offset += 8;

        let end = offset
            .checked_add(length)
            .filter(|&end| end <= total)
            .ok_or_else(|| AssetError::invalid("GLB chunk extends past end of file"))?;

        match kind {
            CHUNK_JSON if json.is_none() => json = Some(&data[offset..end]),
            CHUNK_BIN if bin.is_none() => bin = Some(&data[offset..end]),
            _ => {}
        }

        // Chunks are 4-byte aligned.
        offset = (end + 3) & !3;
    }

    let json = json.ok_or_else(|| AssetError::invalid("GLB missing JSON chunk"))?;
    Ok(Glb { json, bin })
}

/// Assemble a GLB file from a JSON chunk and an optional binary chunk.
pub fn write(json: &[u8], bin: &[u8]) -> Vec<u8> {
    let json_padding = (4 - json.len() % 4) % 4;
    let bin_padding = (4 - bin.len() % 4) % 4;
    let has_bin = !bin.is_empty();

    let total = 12
        + 8
        + json.len()
        + json_padding
        + if has_bin { 8 + bin.len() + bin_padding } else { 0 };

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());

    out.extend_from_slice(&((json.len() + json_padding) as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(json);
    out.extend(std::iter::repeat(b' ').take(json_padding));

    if has_bin {
        out.extend_from_slice(&((bin.len() + bin_padding) as u32).to_le_bytes());
        out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
        out.extend_from_slice(bin);
        out.extend(std::iter::repeat(0u8).take(bin_padding));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_parse() {
        let json = br#"{"asset":{"version":"2.0"}}"#;
        let glb = write(json, &[1, 2, 3]);
        assert!(is_glb(&glb));
        assert_eq!(glb.len() % 4, 0);
        assert_eq!(read_u32(&glb, 8) as usize, glb.len());

        let parsed = parse(&glb).unwrap();
        assert_eq!(std::str::from_utf8(parsed.json).unwrap().trim_end(), std::str::from_utf8(json).unwrap());
        assert_eq!(&parsed.bin.unwrap()[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_rejects_truncated_and_foreign_data() {
        assert!(!is_glb(b"{}"));
        assert!(parse(b"glTF").is_err());

        let mut glb = write(b"{}  ", &[]);
        glb[4] = 1;
        assert!(matches!(parse(&glb), Err(AssetError::Unsupported(_))));

        let mut glb = write(b"{}  ", &[]);
        glb[12] = 0xFF;
        assert!(parse(&glb).is_err());
    }
}
