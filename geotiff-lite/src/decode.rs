//! Assemblage des pixels depuis les strips ou les tuiles

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::TiffError;
use crate::ifd::{self, tags, ByteOrder, IfdEntry};
use crate::raster::Raster;

/// Compressions supportées : aucune (1) et DEFLATE (8, 32946)
const COMPRESSION_NONE: u32 = 1;
const COMPRESSION_DEFLATE: u32 = 8;
const COMPRESSION_DEFLATE_OLD: u32 = 32946;

/// Décode le premier IFD en un raster float32.
pub fn decode_ifd(data: &[u8], bo: ByteOrder, entries: &[IfdEntry]) -> Result<Raster, TiffError> {
    let width = ifd::scalar_u32(data, bo, entries, tags::IMAGE_WIDTH) as usize;
    let height = ifd::scalar_u32(data, bo, entries, tags::IMAGE_LENGTH) as usize;
    let compression = match ifd::scalar_u32(data, bo, entries, tags::COMPRESSION) {
        0 => COMPRESSION_NONE, // tag absent : pas de compression
        c => c,
    };
    let bits_per_sample = ifd::scalar_u32(data, bo, entries, tags::BITS_PER_SAMPLE);
    let sample_format = match ifd::scalar_u32(data, bo, entries, tags::SAMPLE_FORMAT) {
        0 => 1, // défaut TIFF : entier non signé
        f => f,
    };

    if width == 0 || height == 0 {
        return Err(TiffError::unsupported("zero image dimensions"));
    }
    if bits_per_sample != 32 {
        return Err(TiffError::unsupported(format!(
            "expected 32 bits/sample, got {bits_per_sample}"
        )));
    }
    if sample_format != 3 {
        return Err(TiffError::unsupported(format!(
            "expected float sample format (3), got {sample_format}"
        )));
    }
    if !matches!(
        compression,
        COMPRESSION_NONE | COMPRESSION_DEFLATE | COMPRESSION_DEFLATE_OLD
    ) {
        return Err(TiffError::unsupported(format!(
            "compression type {compression}"
        )));
    }

    let nodata = ifd::read_ascii(data, bo, ifd::find(entries, tags::GDAL_NODATA))
        .and_then(|s| s.trim().parse::<f32>().ok());

    let mut raster = Raster::filled(width, height, nodata);

    // Organisation en tuiles si TileWidth est présent, sinon en strips
    if ifd::find(entries, tags::TILE_WIDTH).is_some() {
        fill_tiled(data, bo, entries, compression, &mut raster)?;
    } else {
        fill_stripped(data, bo, entries, compression, &mut raster)?;
    }

    Ok(raster)
}

/// Remplit le raster depuis une organisation en tuiles.
fn fill_tiled(
    data: &[u8],
    bo: ByteOrder,
    entries: &[IfdEntry],
    compression: u32,
    raster: &mut Raster,
) -> Result<(), TiffError> {
    let tw = ifd::scalar_u32(data, bo, entries, tags::TILE_WIDTH) as usize;
    let th = ifd::scalar_u32(data, bo, entries, tags::TILE_LENGTH) as usize;
    if tw == 0 || th == 0 {
        return Err(TiffError::unsupported("zero tile dimensions"));
    }

    let offsets = ifd::read_u32_array(data, bo, ifd::find(entries, tags::TILE_OFFSETS))
        .ok_or(TiffError::Truncated("tile offsets"))?;
    let byte_counts = ifd::read_u32_array(data, bo, ifd::find(entries, tags::TILE_BYTE_COUNTS))
        .ok_or(TiffError::Truncated("tile byte counts"))?;
    if offsets.is_empty() {
        return Err(TiffError::unsupported("no tile offsets"));
    }

    let tiles_x = raster.width.div_ceil(tw);
    let tiles_y = raster.height.div_ceil(th);

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let idx = ty * tiles_x + tx;
            if idx >= offsets.len() {
                break;
            }
            let bc = byte_counts.get(idx).copied().unwrap_or(0);
            let raw = decompress_chunk(data, offsets[idx], bc, compression)?;
            write_tile(&raw, bo, tx * tw, ty * th, tw, th, raster);
        }
    }
    Ok(())
}

/// Copie une tuile décompressée dans le raster, en rognant les bords.
fn write_tile(
    raw: &[u8],
    bo: ByteOrder,
    start_x: usize,
    start_y: usize,
    tw: usize,
    th: usize,
    raster: &mut Raster,
) {
    for row in 0..th {
        let y = start_y + row;
        if y >= raster.height {
            break;
        }
        for col in 0..tw {
            let x = start_x + col;
            if x >= raster.width {
                continue;
            }
            let idx = row * tw + col;
            if (idx + 1) * 4 > raw.len() {
                continue;
            }
            raster.data[y * raster.width + x] = bo.f32(&raw[idx * 4..]);
        }
    }
}

/// Remplit le raster depuis une organisation en strips.
fn fill_stripped(
    data: &[u8],
    bo: ByteOrder,
    entries: &[IfdEntry],
    compression: u32,
    raster: &mut Raster,
) -> Result<(), TiffError> {
    let rows_per_strip = match ifd::scalar_u32(data, bo, entries, tags::ROWS_PER_STRIP) as usize {
        0 => raster.height,
        r => r,
    };

    let offsets = ifd::read_u32_array(data, bo, ifd::find(entries, tags::STRIP_OFFSETS))
        .ok_or(TiffError::Truncated("strip offsets"))?;
    let byte_counts = ifd::read_u32_array(data, bo, ifd::find(entries, tags::STRIP_BYTE_COUNTS))
        .ok_or(TiffError::Truncated("strip byte counts"))?;
    if offsets.is_empty() {
        return Err(TiffError::unsupported("no strip offsets"));
    }

    let mut y = 0usize;
    for (i, &off) in offsets.iter().enumerate() {
        let bc = byte_counts.get(i).copied().unwrap_or(0);
        let raw = decompress_chunk(data, off, bc, compression)?;

        let rows = rows_per_strip.min(raster.height - y);
        let mut n = rows * raster.width;
        if raw.len() < n * 4 {
            n = raw.len() / 4;
        }
        for j in 0..n {
            raster.data[y * raster.width + j] = bo.f32(&raw[j * 4..]);
        }
        y += rows;
        if y >= raster.height {
            break;
        }
    }
    Ok(())
}

/// Extrait un chunk du buffer et le décompresse si nécessaire.
fn decompress_chunk(
    data: &[u8],
    offset: u32,
    byte_count: u32,
    compression: u32,
) -> Result<Vec<u8>, TiffError> {
    let off = offset as usize;
    let bc = byte_count as usize;
    if off + bc > data.len() {
        return Err(TiffError::ChunkOutOfBounds {
            offset: off,
            count: bc,
            len: data.len(),
        });
    }
    let chunk = &data[off..off + bc];

    match compression {
        COMPRESSION_NONE => Ok(chunk.to_vec()),
        COMPRESSION_DEFLATE | COMPRESSION_DEFLATE_OLD => {
            let mut out = Vec::new();
            ZlibDecoder::new(chunk).read_to_end(&mut out)?;
            Ok(out)
        }
        other => Err(TiffError::unsupported(format!("compression type {other}"))),
    }
}
