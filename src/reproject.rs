//! Geometry reprojection through OSR.

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use geo::{Coord, LineString, MultiPolygon, Polygon};

use crate::error::Result;

/// CONUS Albers, the SRS of the elevation rasters.
pub const DEFAULT_SRS: &str = "epsg:5070";
pub const WGS84: &str = "epsg:4326";

fn spatial_ref(definition: &str) -> Result<SpatialRef> {
    let mut srs = SpatialRef::from_definition(definition)?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

/// Transform every vertex of `geometry` from `from_srs` to `to_srs`. Axis
/// order is always x/longitude first.
pub fn reproject(geometry: &MultiPolygon<f64>, from_srs: &str, to_srs: &str) -> Result<MultiPolygon<f64>> {
    let transform = CoordTransform::new(&spatial_ref(from_srs)?, &spatial_ref(to_srs)?)?;

    let ring = |ring: &LineString<f64>| -> Result<LineString<f64>> {
        let mut xs: Vec<f64> = ring.coords().map(|c| c.x).collect();
        let mut ys: Vec<f64> = ring.coords().map(|c| c.y).collect();
        let mut zs = vec![0.0; xs.len()];
        transform.transform_coords(&mut xs, &mut ys, &mut zs)?;
        Ok(xs.into_iter().zip(ys).map(|(x, y)| Coord { x, y }).collect())
    };

    let polygons = geometry
        .iter()
        .map(|polygon| {
            let exterior = ring(polygon.exterior())?;
            let interiors = polygon.interiors().iter().map(&ring).collect::<Result<Vec<_>>>()?;
            Ok(Polygon::new(exterior, interiors))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(MultiPolygon::new(polygons))
}
