use crate::domain::Dimension;
use crate::error::{Error, Result};

/// Coordinate reprojection seam.
///
/// The pipeline only ever asks for one transformation (WGS84 lat/lon into
/// world-mercator meters), so the built-in [`WorldMercator`] covers it;
/// callers with other CRS pairs plug in their own implementation.
pub trait Reproject {
    /// Transform a flat coordinate array from `src` to `dst`.
    ///
    /// Input groups are `(lat, lon)` or `(lat, lon, z)` depending on `dim`;
    /// output groups are `(x, y)` or `(x, y, z)` with z passed through.
    fn reproject(&self, coords: &[f64], dim: Dimension, src: &str, dst: &str) -> Result<Vec<f64>>;
}

/// Spherical world-mercator projection from WGS84 (EPSG:4326) to
/// EPSG:3395-style meters.
///
/// Uses the spherical approximation:
/// - x = R * lon_rad
/// - y = R * ln(tan(pi/4 + lat_rad / 2))
///
/// This avoids pulling in a full proj binding while staying consistent for
/// joins, since every layer of a session goes through the same transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldMercator;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

fn crs_code(crs: &str) -> &str {
    crs.strip_prefix("EPSG:").unwrap_or(crs)
}

impl Reproject for WorldMercator {
    fn reproject(&self, coords: &[f64], dim: Dimension, src: &str, dst: &str) -> Result<Vec<f64>> {
        let (src, dst) = (crs_code(src), crs_code(dst));

        if src == dst {
            return Ok(coords.to_vec());
        }
        if src != "4326" || dst != "3395" {
            return Err(Error::InvalidArgument(format!(
                "unsupported reprojection {src} -> {dst}"
            )));
        }

        let step = dim.size();
        let mut out = Vec::with_capacity(coords.len());

        for chunk in coords.chunks_exact(step) {
            let (lat, lon) = (chunk[0], chunk[1]);
            let x = EARTH_RADIUS_M * lon.to_radians();
            let y = EARTH_RADIUS_M
                * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
                    .tan()
                    .ln();
            out.push(x);
            out.push(y);
            if step == 3 {
                out.push(chunk[2]);
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_when_same_crs() {
        let coords = vec![37.77, -122.41];
        let out = WorldMercator
            .reproject(&coords, Dimension::Two, "3395", "3395")
            .unwrap();
        assert_eq!(out, coords);
    }

    #[test]
    fn test_equator_origin() {
        let out = WorldMercator
            .reproject(&[0.0, 0.0], Dimension::Two, "4326", "EPSG:3395")
            .unwrap();
        assert!(out[0].abs() < 1e-9);
        assert!(out[1].abs() < 1e-9);
    }

    #[test]
    fn test_one_degree_longitude() {
        // 1 degree of longitude at the equator ≈ 111.32 km
        let out = WorldMercator
            .reproject(&[0.0, 1.0], Dimension::Two, "4326", "3395")
            .unwrap();
        assert!((out[0] - 111_319.49).abs() < 1.0);
    }

    #[test]
    fn test_z_passes_through() {
        let out = WorldMercator
            .reproject(&[0.0, 0.0, 42.5], Dimension::Three, "4326", "3395")
            .unwrap();
        assert_eq!(out[2], 42.5);
    }

    #[test]
    fn test_unsupported_pair() {
        assert!(
            WorldMercator
                .reproject(&[0.0, 0.0], Dimension::Two, "4326", "32633")
                .is_err()
        );
    }
}
