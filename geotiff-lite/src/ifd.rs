//! Lecture de l'en-tête TIFF et des entrées IFD
//!
//! Seul le premier IFD est lu. Les valeurs dont la taille totale
//! (`type_size * count`) tient dans 4 octets sont stockées en ligne dans le
//! champ offset de l'entrée ; sinon ce champ pointe dans le buffer.

use crate::error::TiffError;

/// Tags TIFF et GeoTIFF utilisés par le décodeur
pub mod tags {
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GDAL_NODATA: u16 = 42113;
}

/// Types de données TIFF
mod dtypes {
    pub const BYTE: u16 = 1;
    pub const ASCII: u16 = 2;
    pub const SHORT: u16 = 3;
    pub const LONG: u16 = 4;
    pub const FLOAT: u16 = 11;
    pub const DOUBLE: u16 = 12;
}

/// Ordre des octets du fichier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    #[inline]
    pub fn u16(self, buf: &[u8]) -> u16 {
        let b: [u8; 2] = buf[..2].try_into().unwrap();
        match self {
            Self::Little => u16::from_le_bytes(b),
            Self::Big => u16::from_be_bytes(b),
        }
    }

    #[inline]
    pub fn u32(self, buf: &[u8]) -> u32 {
        let b: [u8; 4] = buf[..4].try_into().unwrap();
        match self {
            Self::Little => u32::from_le_bytes(b),
            Self::Big => u32::from_be_bytes(b),
        }
    }

    #[inline]
    pub fn f32(self, buf: &[u8]) -> f32 {
        f32::from_bits(self.u32(buf))
    }

    #[inline]
    pub fn f64(self, buf: &[u8]) -> f64 {
        let b: [u8; 8] = buf[..8].try_into().unwrap();
        match self {
            Self::Little => f64::from_le_bytes(b),
            Self::Big => f64::from_be_bytes(b),
        }
    }

    /// Ré-encode le champ offset sur 4 octets pour relire les valeurs en ligne
    #[inline]
    pub fn encode_u32(self, v: u32) -> [u8; 4] {
        match self {
            Self::Little => v.to_le_bytes(),
            Self::Big => v.to_be_bytes(),
        }
    }
}

/// Une entrée du répertoire IFD (12 octets dans le fichier)
#[derive(Debug, Clone, Copy)]
pub struct IfdEntry {
    pub tag: u16,
    pub dtype: u16,
    pub count: u32,
    pub value_or_offset: u32,
}

impl IfdEntry {
    /// Taille d'un élément du type de l'entrée, en octets
    pub fn type_size(&self) -> usize {
        match self.dtype {
            dtypes::BYTE | dtypes::ASCII => 1,
            dtypes::SHORT => 2,
            dtypes::LONG | dtypes::FLOAT => 4,
            dtypes::DOUBLE => 8,
            _ => 1,
        }
    }

    /// Taille totale de la valeur (`type_size * count`)
    pub fn payload_size(&self) -> usize {
        self.type_size() * self.count as usize
    }

    /// Vrai si la valeur tient dans le champ offset
    pub fn is_inline(&self) -> bool {
        self.payload_size() <= 4
    }
}

/// Vérifie l'en-tête TIFF et retourne l'ordre des octets et l'offset du
/// premier IFD.
pub fn parse_header(data: &[u8]) -> Result<(ByteOrder, u32), TiffError> {
    if data.len() < 8 {
        return Err(TiffError::Truncated("header shorter than 8 bytes"));
    }
    let bo = match &data[..2] {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return Err(TiffError::InvalidByteOrder),
    };
    let magic = bo.u16(&data[2..]);
    if magic != 42 {
        return Err(TiffError::BadMagic(magic));
    }
    Ok((bo, bo.u32(&data[4..])))
}

/// Lit toutes les entrées du premier IFD.
pub fn parse_entries(data: &[u8], bo: ByteOrder, offset: u32) -> Result<Vec<IfdEntry>, TiffError> {
    let offset = offset as usize;
    if offset + 2 > data.len() {
        return Err(TiffError::Truncated("IFD offset out of range"));
    }
    let count = bo.u16(&data[offset..]) as usize;
    let mut entries = Vec::with_capacity(count);

    let mut pos = offset + 2;
    for _ in 0..count {
        if pos + 12 > data.len() {
            return Err(TiffError::Truncated("IFD entry out of range"));
        }
        entries.push(IfdEntry {
            tag: bo.u16(&data[pos..]),
            dtype: bo.u16(&data[pos + 2..]),
            count: bo.u32(&data[pos + 4..]),
            value_or_offset: bo.u32(&data[pos + 8..]),
        });
        pos += 12;
    }
    Ok(entries)
}

/// Retrouve une entrée par tag.
pub fn find<'a>(entries: &'a [IfdEntry], tag: u16) -> Option<&'a IfdEntry> {
    entries.iter().find(|e| e.tag == tag)
}

/// Valeur scalaire d'un tag SHORT/LONG (0 si absent).
pub fn scalar_u32(data: &[u8], bo: ByteOrder, entries: &[IfdEntry], tag: u16) -> u32 {
    read_u32_array(data, bo, find(entries, tag))
        .and_then(|v| v.first().copied())
        .unwrap_or(0)
}

/// Lit un tableau de SHORT/LONG, en ligne ou via offset.
pub fn read_u32_array(data: &[u8], bo: ByteOrder, entry: Option<&IfdEntry>) -> Option<Vec<u32>> {
    let e = entry?;
    let n = e.count as usize;
    let elem = e.type_size();

    let inline_buf;
    let src: &[u8] = if e.is_inline() {
        inline_buf = bo.encode_u32(e.value_or_offset);
        &inline_buf
    } else {
        let off = e.value_or_offset as usize;
        if off + e.payload_size() > data.len() {
            return None;
        }
        &data[off..]
    };

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let v = match e.dtype {
            dtypes::SHORT => bo.u16(&src[i * elem..]) as u32,
            _ => bo.u32(&src[i * elem..]),
        };
        out.push(v);
    }
    Some(out)
}

/// Lit un tableau de DOUBLE (toujours via offset, 8 octets par valeur).
pub fn read_f64_array(data: &[u8], bo: ByteOrder, entry: Option<&IfdEntry>) -> Option<Vec<f64>> {
    let e = entry?;
    let n = e.count as usize;
    let off = e.value_or_offset as usize;
    if off + n * 8 > data.len() {
        return None;
    }
    Some((0..n).map(|i| bo.f64(&data[off + i * 8..])).collect())
}

/// Lit une chaîne ASCII terminée par NUL (tag GDAL_NODATA).
pub fn read_ascii(data: &[u8], bo: ByteOrder, entry: Option<&IfdEntry>) -> Option<String> {
    let e = entry?;

    let inline_buf;
    let src: &[u8] = if e.is_inline() {
        inline_buf = bo.encode_u32(e.value_or_offset);
        &inline_buf[..e.payload_size().min(4)]
    } else {
        let off = e.value_or_offset as usize;
        if off >= data.len() {
            return None;
        }
        let end = (off + e.count as usize).min(data.len());
        &data[off..end]
    };

    let nul = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    std::str::from_utf8(&src[..nul]).ok().map(|s| s.to_string())
}
