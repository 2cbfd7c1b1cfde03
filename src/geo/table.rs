use geo_types::Geometry;
use geojson::{Feature, FeatureCollection, JsonObject};
use geozero::geo_types::GeoWriter;
use geozero::wkb::{process_wkb_type_geom, WkbDialect};
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

use crate::error::{PadError, PadResult};
use crate::sql::{QueryResult, Scalar};

/// High bits EWKB sets on the type word for Z, M and an embedded SRID
const EWKB_FLAGS: u32 = 0xE000_0000;

/// A query result whose rows each carry a decoded shape
#[derive(Debug, Clone, Serialize)]
pub struct GeoTable {
    result: QueryResult,
    #[serde(skip)]
    shapes: Vec<Geometry<f64>>,
    geometry_index: usize,
}

impl GeoTable {
    /// Decode column `geometry_index` of every row.
    ///
    /// Any cell that is not valid WKB (including NULL) fails the whole table.
    pub fn decode(result: QueryResult, geometry_index: usize) -> PadResult<Self> {
        let mut shapes = Vec::with_capacity(result.rows.len());
        for (row, cells) in result.rows.iter().enumerate() {
            let cell = cells
                .get(geometry_index)
                .ok_or_else(|| PadError::decode_error("row has no geometry cell", row))?;
            shapes.push(decode_cell(cell, row)?);
        }

        debug!("Decoded {} geometries", shapes.len());
        Ok(Self {
            result,
            shapes,
            geometry_index,
        })
    }

    /// The underlying tabular result
    pub fn result(&self) -> &QueryResult {
        &self.result
    }

    pub fn shapes(&self) -> &[Geometry<f64>] {
        &self.shapes
    }

    /// Number of map features, always equal to the row count
    pub fn feature_count(&self) -> usize {
        self.shapes.len()
    }

    /// Build a GeoJSON feature collection. Every column except `geometry`
    /// becomes a feature property.
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .result
            .rows
            .iter()
            .zip(&self.shapes)
            .map(|(row, shape)| {
                let mut properties = JsonObject::new();
                for (i, (column, cell)) in self.result.columns.iter().zip(row).enumerate() {
                    if i != self.geometry_index {
                        properties.insert(column.clone(), cell.to_json());
                    }
                }
                Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::from(shape))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

fn decode_cell(cell: &Scalar, row: usize) -> PadResult<Geometry<f64>> {
    let decoded = match cell {
        Scalar::Blob(bytes) => decode_wkb(bytes),
        // hex-encoded WKB, as ST_AsHEXWKB and some exports produce
        Scalar::Text(text) => match hex::decode(text.trim()) {
            Ok(bytes) => decode_wkb(&bytes),
            Err(_) => Err("expected WKB, found text that is not hex".to_string()),
        },
        Scalar::Null => Err("geometry is NULL".to_string()),
        other => Err(format!("expected WKB, found {}", other)),
    };
    decoded.map_err(|message| PadError::decode_error(message, row))
}

/// Decode one WKB or EWKB value. The whole buffer must be consumed.
fn decode_wkb(bytes: &[u8]) -> Result<Geometry<f64>, String> {
    let dialect = match type_word(bytes) {
        Some(word) if word & EWKB_FLAGS != 0 => WkbDialect::Ewkb,
        _ => WkbDialect::Wkb,
    };

    let mut cursor = Cursor::new(bytes);
    let mut writer = GeoWriter::new();
    process_wkb_type_geom(&mut cursor, &mut writer, dialect).map_err(|e| e.to_string())?;

    let trailing = bytes.len().saturating_sub(cursor.position() as usize);
    if trailing > 0 {
        return Err(format!("{} trailing bytes after geometry", trailing));
    }
    writer
        .take_geometry()
        .ok_or_else(|| "empty geometry".to_string())
}

/// Geometry type word following the byte-order marker
fn type_word(bytes: &[u8]) -> Option<u32> {
    let word: [u8; 4] = bytes.get(1..5)?.try_into().ok()?;
    match bytes[0] {
        0 => Some(u32::from_be_bytes(word)),
        1 => Some(u32::from_le_bytes(word)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::testing::{header, put_f64, put_u32, square};
    use crate::sql::testing::point_wkb;
    use geo_types::point;

    fn result_with(columns: &[&str], rows: Vec<Vec<Scalar>>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            row_count: rows.len(),
            rows,
            truncated: false,
        }
    }

    fn single(bytes: Vec<u8>) -> PadResult<Geometry<f64>> {
        let table = GeoTable::decode(result_with(&["geometry"], vec![vec![Scalar::Blob(bytes)]]), 0)?;
        Ok(table.shapes()[0].clone())
    }

    #[test]
    fn test_decodes_every_row() {
        let result = result_with(
            &["geometry", "manager_name"],
            vec![
                vec![Scalar::Blob(point_wkb(-110.0, 40.0)), Scalar::Text("NPS".into())],
                vec![Scalar::Blob(square(-105.0, 38.0, 0.5)), Scalar::Text("USFS".into())],
            ],
        );
        let table = GeoTable::decode(result, 0).unwrap();
        assert_eq!(table.feature_count(), 2);
        assert_eq!(table.shapes()[0], Geometry::Point(point!(x: -110.0, y: 40.0)));
        assert!(matches!(table.shapes()[1], Geometry::Polygon(_)));
    }

    #[test]
    fn test_big_endian_point() {
        let mut bytes = Vec::new();
        header(&mut bytes, true, 1);
        put_f64(&mut bytes, true, 1.5);
        put_f64(&mut bytes, true, -2.0);
        assert_eq!(single(bytes).unwrap(), Geometry::Point(point!(x: 1.5, y: -2.0)));
    }

    #[test]
    fn test_iso_z_point_keeps_xy() {
        let mut bytes = Vec::new();
        header(&mut bytes, false, 1001);
        for v in [1.0, 2.0, 3.0] {
            put_f64(&mut bytes, false, v);
        }
        assert_eq!(single(bytes).unwrap(), Geometry::Point(point!(x: 1.0, y: 2.0)));
    }

    #[test]
    fn test_ewkb_with_srid() {
        let mut bytes = Vec::new();
        header(&mut bytes, false, 1 | 0x2000_0000);
        put_u32(&mut bytes, false, 4326);
        put_f64(&mut bytes, false, 7.0);
        put_f64(&mut bytes, false, 8.0);
        assert_eq!(single(bytes).unwrap(), Geometry::Point(point!(x: 7.0, y: 8.0)));
    }

    #[test]
    fn test_multipolygon() {
        let mut bytes = Vec::new();
        header(&mut bytes, false, 6);
        put_u32(&mut bytes, false, 2);
        bytes.extend(square(0.0, 0.0, 1.0));
        bytes.extend(square(5.0, 5.0, 2.0));
        match single(bytes).unwrap() {
            Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 2),
            other => panic!("expected multipolygon, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_and_trailing_bytes() {
        let truncated = point_wkb(1.0, 2.0)[..12].to_vec();
        assert!(matches!(single(truncated), Err(PadError::Decode { row: 0, .. })));

        let mut trailing = point_wkb(1.0, 2.0);
        trailing.push(0);
        match single(trailing) {
            Err(PadError::Decode { message, .. }) => assert!(message.contains("1 trailing bytes")),
            other => panic!("expected decode error, got {:?}", other),
        }

        assert!(single(Vec::new()).is_err());
    }

    #[test]
    fn test_bad_cell_fails_whole_table() {
        let result = result_with(
            &["geometry"],
            vec![
                vec![Scalar::Blob(point_wkb(0.0, 0.0))],
                vec![Scalar::Blob(vec![1, 2, 3])],
            ],
        );
        match GeoTable::decode(result, 0) {
            Err(PadError::Decode { row, .. }) => assert_eq!(row, 1),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_geometry_is_decode_error() {
        let result = result_with(&["geometry"], vec![vec![Scalar::Null]]);
        assert!(matches!(
            GeoTable::decode(result, 0),
            Err(PadError::Decode { row: 0, .. })
        ));
    }

    #[test]
    fn test_hex_text_accepted() {
        let hex: String = point_wkb(1.0, 2.0).iter().map(|b| format!("{:02X}", b)).collect();
        let result = result_with(&["geometry"], vec![vec![Scalar::Text(hex)]]);
        assert_eq!(GeoTable::decode(result, 0).unwrap().feature_count(), 1);

        let result = result_with(&["geometry"], vec![vec![Scalar::Text("POINT (1 2)".into())]]);
        assert!(GeoTable::decode(result, 0).is_err());
    }

    #[test]
    fn test_feature_collection_properties() {
        let result = result_with(
            &["manager_name", "geometry", "gap_code"],
            vec![vec![
                Scalar::Text("FWS".into()),
                Scalar::Blob(point_wkb(-90.0, 30.0)),
                Scalar::Int(1),
            ]],
        );
        let table = GeoTable::decode(result, 1).unwrap();
        let fc = table.to_feature_collection();
        assert_eq!(fc.features.len(), 1);

        let feature = &fc.features[0];
        let props = feature.properties.as_ref().unwrap();
        assert_eq!(props.get("manager_name"), Some(&serde_json::json!("FWS")));
        assert_eq!(props.get("gap_code"), Some(&serde_json::json!(1)));
        assert!(!props.contains_key("geometry"));

        let json = serde_json::to_value(&fc).unwrap();
        assert_eq!(json["features"][0]["geometry"]["type"], "Point");
        assert_eq!(
            json["features"][0]["geometry"]["coordinates"],
            serde_json::json!([-90.0, 30.0])
        );
    }
}
