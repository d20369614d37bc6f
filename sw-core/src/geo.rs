//! Geo-cell resolver: turns a monitoring point into the bounding boxes
//! used as the spatial unit of every gateway query and cache entry.
//!
//! Point mode buffers the coordinate by `buffer_km / 111.32` degrees on
//! both axes. No `cos(latitude)` correction is applied to longitude, so
//! cells are slightly narrower in metres than they are tall; the buffer
//! per project kind is sized with that in mind.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::project::{MonitoringPoint, Project};

/// Kilometres per degree of latitude used for buffer conversion.
pub const KM_PER_DEGREE: f64 = 111.32;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

/// A WGS84 bounding box, x = longitude, y = latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Square box of `buffer_km` around a coordinate.
    pub fn around(point: Coordinate, buffer_km: f64) -> Self {
        let buffer = buffer_km / KM_PER_DEGREE;
        Self::new(
            point.lng - buffer,
            point.lat - buffer,
            point.lng + buffer,
            point.lat + buffer,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Interiors overlap; boxes that only share an edge do not.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x < other.max_x
            && self.max_x > other.min_x
            && self.min_y < other.max_y
            && self.max_y > other.min_y
    }

    /// `[min_x, min_y, max_x, max_y]`, the order the statistics API expects.
    pub fn as_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }

    fn is_valid(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite()) && self.width() > 0.0 && self.height() > 0.0
    }
}

/// An explicit outer box split into `cols * rows` equal sub-cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    bbox: BoundingBox,
    cols: u32,
    rows: u32,
}

impl GridSpec {
    pub fn new(point_id: &str, bbox: BoundingBox, cols: u32, rows: u32) -> Result<Self, ConfigError> {
        if cols == 0 || rows == 0 {
            return Err(ConfigError::InvalidGrid {
                point: point_id.to_string(),
                reason: format!("grid shape {cols}x{rows} has no cells"),
            });
        }
        if !bbox.is_valid() {
            return Err(ConfigError::InvalidGrid {
                point: point_id.to_string(),
                reason: format!("degenerate bounding box {:?}", bbox.as_array()),
            });
        }
        Ok(Self { bbox, cols, rows })
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn shape(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    /// Column edge `i` of `cols`. The last edge is the outer edge itself so
    /// neighbouring cells share bit-identical boundaries.
    fn x_edge(&self, i: u32) -> f64 {
        if i == self.cols {
            self.bbox.max_x
        } else {
            self.bbox.min_x + self.bbox.width() * f64::from(i) / f64::from(self.cols)
        }
    }

    /// Row edge `i`, counted from the northern edge.
    fn y_edge(&self, i: u32) -> f64 {
        if i == self.rows {
            self.bbox.min_y
        } else {
            self.bbox.max_y - self.bbox.height() * f64::from(i) / f64::from(self.rows)
        }
    }
}

/// The spatial query unit: a cache key plus the box it covers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisCell {
    pub cell_id: String,
    pub station_id: String,
    pub bbox: BoundingBox,
}

/// Resolve the analysis cells of one monitoring point.
///
/// A point without a grid yields a single cell keyed by the point id.
/// A gridded point yields `cols * rows` cells keyed `{point}_{row*cols+col}`,
/// row 0 being the northernmost band.
pub fn resolve_cells(point: &MonitoringPoint, project: &Project) -> Vec<AnalysisCell> {
    match &point.grid {
        None => vec![AnalysisCell {
            cell_id: point.id.clone(),
            station_id: point.id.clone(),
            bbox: BoundingBox::around(point.location, project.kind.point_buffer_km()),
        }],
        Some(grid) => {
            let (cols, rows) = grid.shape();
            let mut cells = Vec::with_capacity((cols * rows) as usize);
            for row in 0..rows {
                for col in 0..cols {
                    cells.push(AnalysisCell {
                        cell_id: format!("{}_{}", point.id, row * cols + col),
                        station_id: point.id.clone(),
                        bbox: BoundingBox::new(
                            grid.x_edge(col),
                            grid.y_edge(row + 1),
                            grid.x_edge(col + 1),
                            grid.y_edge(row),
                        ),
                    });
                }
            }
            cells
        }
    }
}
