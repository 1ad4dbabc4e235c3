//! Types d'erreurs pour le crate geotiff-lite

use thiserror::Error;

/// Erreurs pouvant survenir lors du décodage d'un GeoTIFF
#[derive(Debug, Error)]
pub enum TiffError {
    /// Marqueur d'ordre des octets invalide (ni `II` ni `MM`)
    #[error("invalid byte order marker")]
    InvalidByteOrder,

    /// Nombre magique différent de 42
    #[error("not a TIFF file (magic={0})")]
    BadMagic(u16),

    /// Fichier tronqué (IFD ou valeur hors du buffer)
    #[error("truncated TIFF: {0}")]
    Truncated(&'static str),

    /// Forme d'image non supportée par ce décodeur
    #[error("unsupported TIFF: {0}")]
    Unsupported(String),

    /// Offset de chunk (strip ou tuile) hors du buffer
    #[error("chunk out of bounds (offset={offset} count={count} len={len})")]
    ChunkOutOfBounds {
        offset: usize,
        count: usize,
        len: usize,
    },

    /// Erreur de décompression DEFLATE
    #[error("DEFLATE error: {0}")]
    Deflate(#[from] std::io::Error),
}

impl TiffError {
    /// Crée une erreur pour une forme non supportée
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported(reason.into())
    }
}
