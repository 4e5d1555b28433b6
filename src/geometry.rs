//! Geometry input helpers.
//!
//! Analysis polygons arrive as GeoJSON from the request layer. Everything
//! downstream works on `MultiPolygon<f64>`; a single polygon becomes a
//! one-member multi-polygon.

use geo::{BoundingRect, Geometry, MultiPolygon, Rect};
use geojson::GeoJson;

use crate::error::{GeopError, Result};

/// Parse a GeoJSON Geometry, Feature or FeatureCollection into a
/// multi-polygon. Every feature of a collection must be polygonal.
pub fn parse_geojson(input: &str) -> Result<MultiPolygon<f64>> {
    let geojson: GeoJson = input.parse()?;
    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::Geometry(geometry) => vec![geometry],
        GeoJson::Feature(feature) => vec![feature
            .geometry
            .ok_or_else(|| GeopError::invalid_geometry("feature has no geometry"))?],
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .map(|f| {
                f.geometry
                    .ok_or_else(|| GeopError::invalid_geometry("feature has no geometry"))
            })
            .collect::<Result<_>>()?,
    };

    let mut polygons = Vec::new();
    for geometry in geometries {
        let geometry: Geometry<f64> = geometry.try_into()?;
        polygons.extend(to_multi_polygon(geometry)?.0);
    }
    if polygons.is_empty() {
        return Err(GeopError::invalid_geometry("no polygons in input"));
    }
    Ok(MultiPolygon::new(polygons))
}

/// Accept polygonal geometries only.
pub fn to_multi_polygon(geometry: Geometry<f64>) -> Result<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(multi) => Ok(multi),
        Geometry::Rect(rect) => Ok(MultiPolygon::new(vec![rect.to_polygon()])),
        Geometry::GeometryCollection(collection) => {
            let mut polygons = Vec::new();
            for g in collection {
                polygons.extend(to_multi_polygon(g)?.0);
            }
            Ok(MultiPolygon::new(polygons))
        }
        other => Err(GeopError::invalid_geometry(format!(
            "expected a polygon, found {}",
            geometry_type_name(&other)
        ))),
    }
}

/// Bounding box of a non-empty geometry with finite coordinates.
pub fn bounds(geometry: &MultiPolygon<f64>) -> Result<Rect<f64>> {
    let rect = geometry
        .bounding_rect()
        .ok_or_else(|| GeopError::invalid_geometry("geometry is empty"))?;
    let (min, max) = (rect.min(), rect.max());
    if !(min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()) {
        return Err(GeopError::invalid_geometry("geometry has non-finite coordinates"));
    }
    Ok(rect)
}

fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
