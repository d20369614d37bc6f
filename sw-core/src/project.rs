use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ConfigError;
use crate::evalscript;
use crate::geo::{BoundingBox, Coordinate, GridSpec};

/// Embedded station catalogue for every built-in project.
///
/// Columns: `project_id,station_id,name,lat,lng,grid_bbox,grid_shape` where
/// the optional `grid_bbox` is `min_x;min_y;max_x;max_y` and `grid_shape`
/// is `{cols}x{rows}`.
pub static STATIONS_CSV: &str = include_str!("../../fixtures/stations.csv");

/// Which derived-index calculator and which secondary bands apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectKind {
    Snow,
    WaterQuality,
    Vineyard,
}

impl ProjectKind {
    /// The optical index fetched for every cell.
    pub fn optical_index(&self) -> IndexKind {
        match self {
            ProjectKind::Snow => IndexKind::Ndsi,
            ProjectKind::WaterQuality => IndexKind::Ndci,
            ProjectKind::Vineyard => IndexKind::NdviNdmi,
        }
    }

    /// Vineyards add a Sentinel-1 backscatter series per cell.
    pub fn uses_radar(&self) -> bool {
        matches!(self, ProjectKind::Vineyard)
    }

    /// Point-mode buffer in km. Lakes use a wider box to stay above the
    /// aggregation resolution limit over open water.
    pub fn point_buffer_km(&self) -> f64 {
        match self {
            ProjectKind::WaterQuality => 1.0,
            ProjectKind::Snow | ProjectKind::Vineyard => 0.5,
        }
    }
}

/// A band-math product requested from the statistics API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Ndsi,
    Ndci,
    NdviNdmi,
    Radar,
}

impl IndexKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Ndsi => "NDSI",
            IndexKind::Ndci => "NDCI",
            IndexKind::NdviNdmi => "NDVI/NDMI",
            IndexKind::Radar => "RADAR",
        }
    }

    pub fn evalscript(&self) -> &'static str {
        match self {
            IndexKind::Ndsi => evalscript::NDSI,
            IndexKind::Ndci => evalscript::NDCI,
            IndexKind::NdviNdmi => evalscript::NDVI_NDMI,
            IndexKind::Radar => evalscript::RADAR_VV_DB,
        }
    }

    pub fn collection(&self) -> &'static str {
        match self {
            IndexKind::Radar => "sentinel-1-grd",
            _ => "sentinel-2-l2a",
        }
    }

    /// Output id carrying the index bands in the statistics response.
    pub fn output_id(&self) -> &'static str {
        match self {
            IndexKind::NdviNdmi => "INDICES",
            _ => "index",
        }
    }

    /// Band holding a secondary value, if the script emits one.
    pub fn secondary_band(&self) -> Option<&'static str> {
        match self {
            IndexKind::NdviNdmi => Some("B1"),
            _ => None,
        }
    }

    /// Legal range a mean is clamped into. Backscatter in dB is unbounded.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        match self {
            IndexKind::Radar => None,
            _ => Some((-1.0, 1.0)),
        }
    }

    /// Extra `processing` options for the data source.
    pub fn processing(&self) -> Option<serde_json::Value> {
        match self {
            IndexKind::Radar => Some(json!({
                "backCoeff": "GAMMA0_TERRAIN",
                "orthorectify": true
            })),
            _ => None,
        }
    }
}

/// A station: static configuration, immutable at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringPoint {
    pub id: String,
    pub name: String,
    pub location: Coordinate,
    /// Explicit outer box and shape for area-averaged analysis
    pub grid: Option<GridSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: ProjectKind,
    pub stations: Vec<MonitoringPoint>,
}

impl Project {
    /// The station whose weather stands in for the whole project.
    pub fn representative_station(&self) -> Option<&MonitoringPoint> {
        self.stations.first()
    }

    pub fn station(&self, station_id: &str) -> Option<&MonitoringPoint> {
        self.stations.iter().find(|s| s.id == station_id)
    }
}

/// (id, name, kind, description)
const PROJECT_DEFINITIONS: [(&str, &str, ProjectKind, &str); 5] = [
    (
        "snow-watch",
        "Alpine Snow Watch",
        ProjectKind::Snow,
        "Snow cover (NDSI) at three altitudes around the Matterhorn.",
    ),
    (
        "maggiore-lake",
        "Lake Maggiore (IT/CH)",
        ProjectKind::WaterQuality,
        "8-point chlorophyll (NDCI) analysis of Lake Maggiore.",
    ),
    (
        "sniardwy-lake",
        "Lake Sniardwy (PL)",
        ProjectKind::WaterQuality,
        "10-point chlorophyll (NDCI) analysis of Lake Sniardwy.",
    ),
    (
        "tuscany-vineyard",
        "Tuscany (Chianti Classico)",
        ProjectKind::Vineyard,
        "NDVI, NDMI and radar backscatter for Chianti Classico vineyards.",
    ),
    (
        "bordeaux-vineyard",
        "Bordeaux (Saint-Emilion)",
        ProjectKind::Vineyard,
        "NDVI, NDMI and radar backscatter for Saint-Emilion vineyards.",
    ),
];

/// All configured projects.
#[derive(Debug, Clone)]
pub struct Catalogue {
    pub projects: Vec<Project>,
}

impl Catalogue {
    /// Build the catalogue from the embedded station fixture.
    pub fn builtin() -> Result<Catalogue, ConfigError> {
        Catalogue::from_csv(STATIONS_CSV)
    }

    /// Build the built-in projects with stations taken from `csv_object`.
    ///
    /// Rows naming a project that is not defined are rejected so typos in
    /// the fixture surface at startup instead of as an empty dashboard.
    pub fn from_csv(csv_object: &str) -> Result<Catalogue, ConfigError> {
        let mut projects: Vec<Project> = PROJECT_DEFINITIONS
            .iter()
            .map(|(id, name, kind, description)| Project {
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                kind: *kind,
                stations: Vec::new(),
            })
            .collect();

        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_object.as_bytes());
        for (line, row) in rdr.records().enumerate() {
            let record = row.map_err(|e| ConfigError::InvalidCatalogue(e.to_string()))?;
            let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");
            let project_id = field(0);
            let station_id = field(1);
            if station_id.is_empty() {
                return Err(ConfigError::InvalidCatalogue(format!(
                    "row {} has no station id",
                    line + 1
                )));
            }
            let lat = parse_coordinate(field(3), station_id, "lat")?;
            let lng = parse_coordinate(field(4), station_id, "lng")?;
            let grid = parse_grid(station_id, field(5), field(6))?;
            let project = projects
                .iter_mut()
                .find(|p| p.id == project_id)
                .ok_or_else(|| ConfigError::UnknownProject(project_id.to_string()))?;
            project.stations.push(MonitoringPoint {
                id: station_id.to_string(),
                name: field(2).to_string(),
                location: Coordinate { lat, lng },
                grid,
            });
        }

        let catalogue = Catalogue { projects };
        catalogue.validate()?;
        Ok(catalogue)
    }

    /// Every project has stations and station ids are unique across the
    /// catalogue, since they double as cache keys.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for project in &self.projects {
            if project.stations.is_empty() {
                return Err(ConfigError::NoStations(project.id.clone()));
            }
            for station in &project.stations {
                if !seen.insert(station.id.as_str()) {
                    return Err(ConfigError::InvalidCatalogue(format!(
                        "duplicate station id {}",
                        station.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn find(&self, project_id: &str) -> Result<&Project, ConfigError> {
        self.projects
            .iter()
            .find(|p| p.id == project_id)
            .ok_or_else(|| ConfigError::UnknownProject(project_id.to_string()))
    }

    /// Find a station and the project it belongs to.
    pub fn find_station(&self, station_id: &str) -> Result<(&Project, &MonitoringPoint), ConfigError> {
        self.projects
            .iter()
            .find_map(|p| p.station(station_id).map(|s| (p, s)))
            .ok_or_else(|| ConfigError::UnknownStation(station_id.to_string()))
    }
}

fn parse_coordinate(value: &str, station_id: &str, axis: &str) -> Result<f64, ConfigError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            ConfigError::InvalidCatalogue(format!("{station_id}: invalid {axis} '{value}'"))
        })
}

fn parse_grid(station_id: &str, bbox: &str, shape: &str) -> Result<Option<GridSpec>, ConfigError> {
    if bbox.is_empty() && shape.is_empty() {
        return Ok(None);
    }
    let invalid = |reason: String| ConfigError::InvalidGrid {
        point: station_id.to_string(),
        reason,
    };
    let edges = bbox
        .split(';')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|_| invalid(format!("unparsable bbox '{bbox}'")))?;
    if edges.len() != 4 {
        return Err(invalid(format!("bbox '{bbox}' needs four edges")));
    }
    let (cols, rows) = shape
        .split_once('x')
        .and_then(|(c, r)| Some((c.trim().parse::<u32>().ok()?, r.trim().parse::<u32>().ok()?)))
        .ok_or_else(|| invalid(format!("unparsable shape '{shape}'")))?;
    GridSpec::new(
        station_id,
        BoundingBox::new(edges[0], edges[1], edges[2], edges[3]),
        cols,
        rows,
    )
    .map(Some)
}
