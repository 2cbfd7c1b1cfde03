pub mod map;

use std::io::Write;

use crate::core::config::MapConfig;
use crate::error::{PadError, PadResult};
use crate::geo::GeoTable;
use crate::pipeline::QueryOutcome;
use crate::sql::format_results_as_table;

pub use map::MapRenderer;

/// Caption shown under a map
pub fn caption(geo: &GeoTable) -> String {
    format!("matching features: {}", geo.feature_count())
}

/// Writes query outcomes for a terminal user
#[derive(Debug, Clone)]
pub struct Presenter {
    map: MapRenderer,
    geojson: bool,
}

impl Presenter {
    /// With `geojson` set, geometry results are printed as a
    /// FeatureCollection instead of being written to the map page.
    pub fn new(config: &MapConfig, geojson: bool) -> Self {
        Self {
            map: MapRenderer::new(config),
            geojson,
        }
    }

    /// Echo the SQL a turn is about to run
    pub fn present_sql<W: Write>(&self, out: &mut W, sql: &str) -> PadResult<()> {
        if !self.geojson {
            writeln!(out, "SQL: {}", sql)?;
        }
        Ok(())
    }

    pub fn present<W: Write>(&self, out: &mut W, outcome: &QueryOutcome) -> PadResult<()> {
        if let (true, Some(geo)) = (self.geojson, outcome.geo()) {
            writeln!(out, "{}", self.map.geojson(geo)?)?;
            return Ok(());
        }

        writeln!(out, "{}", format_results_as_table(outcome.result()))?;

        if let Some(geo) = outcome.geo() {
            let path = self.map.write(geo)?;
            writeln!(out, "map: {}", path.display())?;
            writeln!(out, "{}", caption(geo))?;
        }
        Ok(())
    }

    pub fn present_error<W: Write>(&self, out: &mut W, err: &PadError) -> PadResult<()> {
        writeln!(out, "Error: {}", err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::QueryPipeline;
    use crate::sql::testing::{fixture_config, write_fixture};
    use tempfile::tempdir;

    fn presenter(dir: &std::path::Path, geojson: bool) -> Presenter {
        let config = MapConfig {
            output: dir.join("map.html"),
            ..Default::default()
        };
        Presenter::new(&config, geojson)
    }

    #[test]
    fn test_plain_table_has_no_map() {
        let dir = tempdir().unwrap();
        let path = write_fixture(dir.path(), 3);
        let mut pipeline = QueryPipeline::open(&fixture_config(&path), 0).unwrap();
        let outcome = pipeline.run_query("select manager_name from pad limit 1", 25).unwrap();

        let mut out = Vec::new();
        let presenter = presenter(dir.path(), false);
        presenter.present_sql(&mut out, "select manager_name from pad limit 1").unwrap();
        presenter.present(&mut out, &outcome).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("SQL: select manager_name"));
        assert!(text.contains("Manager 0"));
        assert!(!text.contains("matching features"));
        assert!(!dir.path().join("map.html").exists());
    }

    #[test]
    fn test_geometry_result_writes_map_and_caption() {
        let dir = tempdir().unwrap();
        let path = write_fixture(dir.path(), 60);
        let mut pipeline = QueryPipeline::open(&fixture_config(&path), 0).unwrap();
        let sql = "select geometry, manager_name from pad where gap_code in (1,2) limit 100";
        let outcome = pipeline.run_query(sql, 25).unwrap();

        let mut out = Vec::new();
        presenter(dir.path(), false).present(&mut out, &outcome).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("matching features: 25"));
        assert!(dir.path().join("map.html").exists());
    }

    #[test]
    fn test_geojson_mode_prints_collection() {
        let dir = tempdir().unwrap();
        let path = write_fixture(dir.path(), 4);
        let mut pipeline = QueryPipeline::open(&fixture_config(&path), 0).unwrap();
        let outcome = pipeline.run_query("select id, geometry from pad", 25).unwrap();

        let mut out = Vec::new();
        let presenter = presenter(dir.path(), true);
        presenter.present_sql(&mut out, "select id, geometry from pad").unwrap();
        presenter.present(&mut out, &outcome).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"].as_array().unwrap().len(), 4);
        assert!(!dir.path().join("map.html").exists());
    }

    #[test]
    fn test_error_output() {
        let dir = tempdir().unwrap();
        let err = PadError::execution_error("Catalog Error: Table with name nowhere does not exist!", "select * from nowhere");

        let mut out = Vec::new();
        presenter(dir.path(), false).present_error(&mut out, &err).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Error: Catalog Error"));
        assert!(text.contains("does not exist"));
    }
}
