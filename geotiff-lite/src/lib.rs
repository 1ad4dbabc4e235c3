//! # geotiff-lite
//!
//! Décodeur GeoTIFF float32 minimal et autonome, pensé pour les dalles
//! altimétriques (MNS/MNT) servies par les flux WMS de l'IGN.
//!
//! ## Features
//!
//! - Organisation en strips et en tuiles, premier IFD uniquement
//! - Compressions : aucune et DEFLATE (zlib)
//! - Géoréférencement : ModelPixelScale + ModelTiepoint, GeoKeys EPSG
//! - NoData depuis le tag ASCII GDAL_NODATA
//!
//! ## Usage
//!
//! ```rust,ignore
//! let raster = geotiff_lite::decode(&bytes)?;
//! println!("{}x{} EPSG:{}", raster.width, raster.height, raster.epsg);
//! ```

pub mod error;
pub mod raster;

mod decode;
mod geokeys;
mod ifd;

pub use error::TiffError;
pub use raster::Raster;

/// Décode un GeoTIFF float32 depuis un buffer mémoire.
///
/// # Errors
///
/// Retourne `TiffError` si le buffer n'est pas un TIFF float32 32 bits en
/// strips ou en tuiles, si la compression n'est ni absente ni DEFLATE, ou si
/// un offset pointe hors du buffer.
pub fn decode(data: &[u8]) -> Result<Raster, TiffError> {
    let (bo, first_ifd) = ifd::parse_header(data)?;
    let entries = ifd::parse_entries(data, bo, first_ifd)?;

    let mut raster = decode::decode_ifd(data, bo, &entries)?;

    if let Some(bbox) = geokeys::extract_bbox(data, bo, &entries, raster.width, raster.height) {
        raster.bbox = bbox;
    }
    raster.epsg = geokeys::extract_epsg(data, bo, &entries);

    Ok(raster)
}
