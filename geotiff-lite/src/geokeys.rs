//! Extraction du géoréférencement depuis les tags GeoTIFF
//!
//! L'emprise est assemblée depuis ModelPixelScale (33550) et
//! ModelTiepoint (33922) ; le code EPSG depuis le GeoKeyDirectory (34735).

use crate::ifd::{self, tags, ByteOrder, IfdEntry};

/// ProjectedCSTypeGeoKey
const KEY_PROJECTED_CS: u32 = 3072;
/// GeographicTypeGeoKey (repli quand la clé projetée est absente)
const KEY_GEOGRAPHIC_TYPE: u32 = 2048;

/// Emprise native `[xmin, ymin, xmax, ymax]` depuis scale + tiepoint.
///
/// `x_min = tie_x - tie_i * scale_x`, `y_max = tie_y + tie_j * scale_y`,
/// puis `x_max = x_min + w * scale_x` et `y_min = y_max - h * scale_y`.
pub fn extract_bbox(
    data: &[u8],
    bo: ByteOrder,
    entries: &[IfdEntry],
    width: usize,
    height: usize,
) -> Option<[f64; 4]> {
    let scales = ifd::read_f64_array(data, bo, ifd::find(entries, tags::MODEL_PIXEL_SCALE))?;
    let tiepoints = ifd::read_f64_array(data, bo, ifd::find(entries, tags::MODEL_TIEPOINT))?;
    if scales.len() < 2 || tiepoints.len() < 6 {
        return None;
    }

    let (scale_x, scale_y) = (scales[0], scales[1]);
    let (tie_i, tie_j) = (tiepoints[0], tiepoints[1]);
    let (tie_x, tie_y) = (tiepoints[3], tiepoints[4]);

    let x_min = tie_x - tie_i * scale_x;
    let y_max = tie_y + tie_j * scale_y;
    let x_max = x_min + width as f64 * scale_x;
    let y_min = y_max - height as f64 * scale_y;

    Some([x_min, y_min, x_max, y_max])
}

/// Code EPSG depuis le GeoKeyDirectory (0 si absent).
///
/// Le répertoire commence par `[version, revision, minor, nb_clés]` puis des
/// groupes de 4 : `[key_id, loc, count, valeur]`. Seules les clés stockées en
/// ligne (`loc == 0`) sont lues.
pub fn extract_epsg(data: &[u8], bo: ByteOrder, entries: &[IfdEntry]) -> u32 {
    let keys = match ifd::read_u32_array(data, bo, ifd::find(entries, tags::GEO_KEY_DIRECTORY)) {
        Some(k) if k.len() > 4 => k,
        _ => return 0,
    };

    let n_keys = keys[3] as usize;
    let mut epsg = 0u32;

    for k in 0..n_keys {
        let base = 4 + k * 4;
        if base + 3 >= keys.len() {
            break;
        }
        let key_id = keys[base];
        let loc = keys[base + 1];
        let value = keys[base + 3];

        if loc != 0 {
            continue;
        }
        match key_id {
            KEY_PROJECTED_CS => return value,
            KEY_GEOGRAPHIC_TYPE if epsg == 0 => epsg = value,
            _ => {}
        }
    }
    epsg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifd::IfdEntry;

    fn f64_bytes(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_bbox_from_scale_and_tiepoint() {
        // scale = [0.5, 0.5, 0], tiepoint = [0, 0, 0, 700000, 6600000, 0]
        let mut data = vec![0u8; 128];
        data[8..32].copy_from_slice(&f64_bytes(&[0.5, 0.5, 0.0]));
        data[32..80].copy_from_slice(&f64_bytes(&[0.0, 0.0, 0.0, 700000.0, 6600000.0, 0.0]));

        let entries = vec![
            IfdEntry {
                tag: tags::MODEL_PIXEL_SCALE,
                dtype: 12,
                count: 3,
                value_or_offset: 8,
            },
            IfdEntry {
                tag: tags::MODEL_TIEPOINT,
                dtype: 12,
                count: 6,
                value_or_offset: 32,
            },
        ];

        let bbox = extract_bbox(&data, ByteOrder::Little, &entries, 100, 200).unwrap();
        assert_eq!(bbox, [700000.0, 6600000.0 - 100.0, 700000.0 + 50.0, 6600000.0]);
    }

    #[test]
    fn test_epsg_projected_wins_over_geographic() {
        // Répertoire avec GeographicType=4326 puis ProjectedCS=2154
        let keys: Vec<u32> = vec![
            1, 1, 0, 2, // header
            2048, 0, 1, 4326, // GeographicTypeGeoKey
            3072, 0, 1, 2154, // ProjectedCSTypeGeoKey
        ];
        let mut data = vec![0u8; 8];
        for k in &keys {
            data.extend_from_slice(&(*k as u16).to_le_bytes());
        }
        let entries = vec![IfdEntry {
            tag: tags::GEO_KEY_DIRECTORY,
            dtype: 3,
            count: keys.len() as u32,
            value_or_offset: 8,
        }];

        assert_eq!(extract_epsg(&data, ByteOrder::Little, &entries), 2154);
    }

    #[test]
    fn test_epsg_geographic_fallback() {
        let keys: Vec<u32> = vec![1, 1, 0, 1, 2048, 0, 1, 4326];
        let mut data = vec![0u8; 8];
        for k in &keys {
            data.extend_from_slice(&(*k as u16).to_le_bytes());
        }
        let entries = vec![IfdEntry {
            tag: tags::GEO_KEY_DIRECTORY,
            dtype: 3,
            count: keys.len() as u32,
            value_or_offset: 8,
        }];

        assert_eq!(extract_epsg(&data, ByteOrder::Little, &entries), 4326);
    }

    #[test]
    fn test_epsg_absent() {
        assert_eq!(extract_epsg(&[], ByteOrder::Little, &[]), 0);
    }
}
