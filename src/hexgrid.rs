// src/hexgrid.rs
//
// Adapter seam for the discrete global grid. The rest of the pipeline only
// talks to the `HexGrid` trait; `H3Grid` implements it over h3o. Densities
// use the published nominal (average) hexagon area per resolution, not the
// per-cell exact area, so re-aggregation of the same inputs is stable across
// library versions.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use geo::Centroid;
use geo_types::{Coord, Geometry, LineString, Point, Polygon};
use h3o::{CellIndex, LatLng, Resolution};

use crate::models::CellId;

/// Resolutions the pipeline aggregates at, coarse to fine
pub const SUPPORTED_RESOLUTIONS: [u8; 4] = [7, 8, 9, 10];

/// Average hexagon area in km² per H3 resolution 0..=15
const NOMINAL_AREAS_KM2: [f64; 16] = [
    4_357_449.416078381,
    609_788.441794133,
    86_801.780398997,
    12_393.434655088,
    1_770.347654491,
    252.903858182,
    36.129062164,
    5.161293360,
    0.737327598,
    0.105332513,
    0.015047502,
    0.002149643,
    0.000307092,
    0.000043870,
    0.000006267,
    0.000000895,
];

/// The discrete-grid primitive as the pipeline consumes it. Grid math is
/// never reimplemented here; any external API variance stays behind this
/// one seam.
pub trait HexGrid: Send + Sync {
    /// Cell containing a geographic point at the given resolution
    fn cell_from_point(&self, lat: f64, lon: f64, resolution: u8) -> Result<CellId>;

    /// Nominal cell area for a resolution, used for density normalization
    fn cell_area_km2(&self, resolution: u8) -> Result<f64>;

    /// Boundary ring of a cell, closed (first vertex repeated last)
    fn cell_boundary(&self, cell: &CellId) -> Result<Polygon<f64>>;

    /// Resolution encoded in a cell id
    fn cell_resolution(&self, cell: &CellId) -> Result<u8>;
}

/// H3 implementation of the grid primitive.
#[derive(Debug, Default, Clone, Copy)]
pub struct H3Grid;

impl H3Grid {
    fn parse_cell(cell: &CellId) -> Result<CellIndex> {
        cell.0
            .parse::<CellIndex>()
            .map_err(|e| anyhow!("invalid cell id '{}': {}", cell.0, e))
    }

    fn parse_resolution(resolution: u8) -> Result<Resolution> {
        Resolution::try_from(resolution)
            .map_err(|e| anyhow!("unsupported resolution {}: {}", resolution, e))
    }
}

impl HexGrid for H3Grid {
    fn cell_from_point(&self, lat: f64, lon: f64, resolution: u8) -> Result<CellId> {
        // h3o wraps out-of-range coordinates instead of rejecting them
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(anyhow!("coordinate ({}, {}) out of range", lat, lon));
        }
        let coord = LatLng::new(lat, lon)
            .map_err(|e| anyhow!("invalid coordinate ({}, {}): {}", lat, lon, e))?;
        let cell = coord.to_cell(Self::parse_resolution(resolution)?);
        Ok(CellId(cell.to_string()))
    }

    fn cell_area_km2(&self, resolution: u8) -> Result<f64> {
        NOMINAL_AREAS_KM2
            .get(resolution as usize)
            .copied()
            .ok_or_else(|| anyhow!("unsupported resolution {}", resolution))
    }

    fn cell_boundary(&self, cell: &CellId) -> Result<Polygon<f64>> {
        let index = Self::parse_cell(cell)?;
        let mut ring: Vec<Coord<f64>> = index
            .boundary()
            .iter()
            .map(|v| Coord { x: v.lng(), y: v.lat() })
            .collect();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        Ok(Polygon::new(LineString::from(ring), vec![]))
    }

    fn cell_resolution(&self, cell: &CellId) -> Result<u8> {
        let index = Self::parse_cell(cell)?;
        Ok(u8::from(index.resolution()))
    }
}

/// Representative point for cell assignment: the centroid for lines and
/// polygons, the point itself otherwise. Degenerate geometry (an empty
/// line, say) has no centroid and yields None; such entities keep an empty
/// cell set and sit out of aggregation.
pub fn representative_point(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    geometry.centroid()
}

/// Cell ids for one point across all requested resolutions.
pub fn cells_for_point(
    grid: &dyn HexGrid,
    point: &Point<f64>,
    resolutions: &[u8],
) -> Result<BTreeMap<u8, CellId>> {
    let mut cells = BTreeMap::new();
    for &resolution in resolutions {
        let cell = grid
            .cell_from_point(point.y(), point.x(), resolution)
            .with_context(|| format!("cell assignment at resolution {}", resolution))?;
        cells.insert(resolution, cell);
    }
    Ok(cells)
}

/// Materializes boundary polygons for a set of cells, for visualization
/// debugging. Unparseable ids are skipped.
pub fn materialize_cells(
    grid: &dyn HexGrid,
    cells: &[CellId],
) -> Vec<(CellId, Polygon<f64>)> {
    cells
        .iter()
        .filter_map(|cell| {
            grid.cell_boundary(cell)
                .ok()
                .map(|polygon| (cell.clone(), polygon))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KYIV_LAT: f64 = 50.4501;
    const KYIV_LON: f64 = 30.5234;

    #[test]
    fn test_cell_from_point_is_deterministic() {
        let grid = H3Grid;
        let a = grid.cell_from_point(KYIV_LAT, KYIV_LON, 9).unwrap();
        let b = grid.cell_from_point(KYIV_LAT, KYIV_LON, 9).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 15);
    }

    #[test]
    fn test_cell_resolution_round_trip() {
        let grid = H3Grid;
        for resolution in SUPPORTED_RESOLUTIONS {
            let cell = grid
                .cell_from_point(KYIV_LAT, KYIV_LON, resolution)
                .unwrap();
            assert_eq!(grid.cell_resolution(&cell).unwrap(), resolution);
        }
    }

    #[test]
    fn test_invalid_inputs_are_errors() {
        let grid = H3Grid;
        assert!(grid.cell_from_point(95.0, 30.0, 9).is_err());
        assert!(grid.cell_from_point(50.0, 181.0, 9).is_err());
        assert!(grid.cell_from_point(f64::NAN, 30.0, 9).is_err());
        assert!(grid.cell_from_point(KYIV_LAT, KYIV_LON, 16).is_err());
        assert!(grid.cell_resolution(&CellId("not a cell".to_string())).is_err());
    }

    #[test]
    fn test_nominal_areas_decrease_with_resolution() {
        let grid = H3Grid;
        for resolution in 1u8..=15 {
            let coarser = grid.cell_area_km2(resolution - 1).unwrap();
            let finer = grid.cell_area_km2(resolution).unwrap();
            assert!(coarser > finer);
        }
        assert!(grid.cell_area_km2(16).is_err());
    }

    #[test]
    fn test_boundary_is_closed_ring() {
        let grid = H3Grid;
        let cell = grid.cell_from_point(KYIV_LAT, KYIV_LON, 8).unwrap();
        let polygon = grid.cell_boundary(&cell).unwrap();
        let ring = polygon.exterior();
        assert!(ring.0.len() >= 6);
        assert_eq!(ring.0.first(), ring.0.last());
    }

    #[test]
    fn test_representative_point() {
        let point = Geometry::Point(Point::new(KYIV_LON, KYIV_LAT));
        let rep = representative_point(&point).unwrap();
        assert_eq!(rep, Point::new(KYIV_LON, KYIV_LAT));

        let line = Geometry::LineString(LineString::from(vec![
            (30.0, 50.0),
            (31.0, 50.0),
        ]));
        let rep = representative_point(&line).unwrap();
        assert!((rep.x() - 30.5).abs() < 1e-9);
    }

    #[test]
    fn test_cells_for_point_covers_all_resolutions() {
        let grid = H3Grid;
        let point = Point::new(KYIV_LON, KYIV_LAT);
        let cells = cells_for_point(&grid, &point, &SUPPORTED_RESOLUTIONS).unwrap();
        assert_eq!(cells.len(), SUPPORTED_RESOLUTIONS.len());
        for resolution in SUPPORTED_RESOLUTIONS {
            assert!(cells.contains_key(&resolution));
        }
    }

    #[test]
    fn test_materialize_skips_unparseable_ids() {
        let grid = H3Grid;
        let good_a = grid.cell_from_point(KYIV_LAT, KYIV_LON, 9).unwrap();
        let good_b = grid.cell_from_point(KYIV_LAT + 0.1, KYIV_LON, 9).unwrap();
        let cells = vec![good_a.clone(), CellId("garbage".to_string()), good_b];

        let materialized = materialize_cells(&grid, &cells);
        assert_eq!(materialized.len(), 2);
        assert_eq!(materialized[0].0, good_a);
        assert!(materialized[0].1.exterior().0.len() >= 6);
    }
}
