//! Fixtures partagées : GeoTIFF float32 construits en mémoire

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Construit un GeoTIFF float32 little-endian à strip unique.
///
/// Géoréférencé en Lambert 93 : origine (700000, 6600000), pixel de 1 m,
/// EPSG:2154, nodata -9999.
pub fn build_geotiff(width: u32, height: u32, pixels: &[f32], deflate: bool) -> Vec<u8> {
    let mut out = vec![0u8; 8];

    let raw: Vec<u8> = pixels.iter().flat_map(|v| v.to_le_bytes()).collect();
    let chunk = if deflate {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&raw).unwrap();
        enc.finish().unwrap()
    } else {
        raw
    };
    let chunk_offset = out.len() as u32;
    out.extend_from_slice(&chunk);

    let scale_offset = out.len() as u32;
    for v in [1.0f64, 1.0, 0.0] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    let tiepoint_offset = out.len() as u32;
    for v in [0.0f64, 0.0, 0.0, 700000.0, 6600000.0, 0.0] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    let geokeys_offset = out.len() as u32;
    for v in [1u16, 1, 0, 1, 3072, 0, 1, 2154] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    let nodata_offset = out.len() as u32;
    out.extend_from_slice(b"-9999\0");

    // (tag, dtype, count, valeur/offset), triés par tag
    let entries: Vec<(u16, u16, u32, u32)> = vec![
        (256, 4, 1, width),
        (257, 4, 1, height),
        (258, 3, 1, 32),
        (259, 3, 1, if deflate { 8 } else { 1 }),
        (273, 4, 1, chunk_offset),
        (278, 4, 1, height),
        (279, 4, 1, chunk.len() as u32),
        (339, 3, 1, 3),
        (33550, 12, 3, scale_offset),
        (33922, 12, 6, tiepoint_offset),
        (34735, 3, 8, geokeys_offset),
        (42113, 2, 6, nodata_offset),
    ];

    let ifd_offset = out.len() as u32;
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, dtype, count, value) in entries {
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&dtype.to_le_bytes());
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&0u32.to_le_bytes());

    out[0] = b'I';
    out[1] = b'I';
    out[2..4].copy_from_slice(&42u16.to_le_bytes());
    out[4..8].copy_from_slice(&ifd_offset.to_le_bytes());
    out
}
