use super::{GeometryProvider, LayerProperties, ProvidedShape};
use crate::error::LayoutError;
use geo::{LineString, Polygon};
use kurbo::{Affine, Point};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Instance nesting deeper than this is treated as recursive.
const MAX_HIERARCHY_DEPTH: usize = 64;

/// In-memory hierarchical layout: cells holding shapes and placed instances
/// of other cells. Coordinates are integer database units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layout {
    /// Design name, used as the job source name.
    #[serde(default)]
    pub name: String,
    /// Database unit in µm.
    #[serde(default = "default_dbu")]
    pub dbu: f64,
    /// Cell being converted; `None` when nothing is open.
    #[serde(default)]
    pub top_cell: Option<String>,
    #[serde(default)]
    pub layers: Vec<LayerProperties>,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

fn default_dbu() -> f64 {
    0.001
}

/// A named cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub name: String,
    #[serde(default)]
    pub shapes: Vec<LayoutShape>,
    #[serde(default)]
    pub instances: Vec<Instance>,
}

/// A simple polygon on one layer, with an optional `dose` property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutShape {
    pub layer: u32,
    pub datatype: u32,
    pub points: Vec<(i64, i64)>,
    #[serde(default)]
    pub dose: Option<f64>,
}

/// A placement of another cell, with an optional `dose` property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub cell: String,
    #[serde(default = "identity")]
    pub transform: Affine,
    #[serde(default)]
    pub dose: Option<f64>,
}

fn identity() -> Affine {
    Affine::IDENTITY
}

impl Cell {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shapes: Vec::new(),
            instances: Vec::new(),
        }
    }

    /// Add a polygon in database units.
    pub fn add_polygon(
        &mut self,
        layer: &LayerProperties,
        points: Vec<(i64, i64)>,
        dose: Option<f64>,
    ) {
        self.shapes.push(LayoutShape {
            layer: layer.layer,
            datatype: layer.datatype,
            points,
            dose,
        });
    }

    /// Place `cell` with `transform` (in database units).
    pub fn add_instance(&mut self, cell: impl Into<String>, transform: Affine, dose: Option<f64>) {
        self.instances.push(Instance {
            cell: cell.into(),
            transform,
            dose,
        });
    }
}

impl Layout {
    /// Create an empty layout with the given database unit (µm).
    pub fn new(name: impl Into<String>, dbu: f64) -> Self {
        Self {
            name: name.into(),
            dbu,
            top_cell: None,
            layers: Vec::new(),
            cells: Vec::new(),
        }
    }

    /// Load a layout from a JSON file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, LayoutError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| LayoutError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut layout: Layout =
            serde_json::from_slice(&bytes).map_err(|source| LayoutError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if layout.name.is_empty() {
            layout.name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("layout")
                .to_string();
        }
        Ok(layout)
    }

    /// Register a layer, returning its properties for shape insertion.
    pub fn add_layer(&mut self, layer: u32, datatype: u32) -> LayerProperties {
        let props = LayerProperties::new(layer, datatype);
        if !self.layers.contains(&props) {
            self.layers.push(props.clone());
        }
        props
    }

    /// Add a cell, replacing any cell of the same name, and return it for filling.
    pub fn add_cell(&mut self, cell: Cell) -> &mut Cell {
        self.cells.retain(|c| c.name != cell.name);
        self.cells.push(cell);
        let last = self.cells.len() - 1;
        &mut self.cells[last]
    }

    /// Get a cell by name.
    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.name == name)
    }

    /// Get a mutable reference to a cell by name.
    pub fn cell_mut(&mut self, name: &str) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.name == name)
    }

    /// Mark `name` as the cell to convert.
    pub fn set_top_cell(&mut self, name: impl Into<String>) {
        self.top_cell = Some(name.into());
    }

    fn collect_shapes<'a>(
        &'a self,
        cell_name: &'a str,
        layer: &LayerProperties,
        transform: Affine,
        inherited_dose: Option<f64>,
        stack: &mut Vec<&'a str>,
        out: &mut Vec<ProvidedShape>,
    ) -> Result<(), LayoutError> {
        if stack.contains(&cell_name) || stack.len() >= MAX_HIERARCHY_DEPTH {
            return Err(LayoutError::RecursiveHierarchy(cell_name.to_string()));
        }
        let cell = self
            .cell(cell_name)
            .ok_or_else(|| LayoutError::UnknownCell(cell_name.to_string()))?;
        stack.push(cell_name);

        for shape in &cell.shapes {
            if shape.layer != layer.layer || shape.datatype != layer.datatype {
                continue;
            }
            let ring: Vec<(f64, f64)> = shape
                .points
                .iter()
                .map(|&(x, y)| {
                    let p = transform * Point::new(x as f64, y as f64);
                    (p.x * self.dbu, p.y * self.dbu)
                })
                .collect();
            out.push(ProvidedShape {
                polygon: Polygon::new(LineString::from(ring), Vec::new()),
                dose: shape.dose.or(inherited_dose),
            });
        }

        for instance in &cell.instances {
            self.collect_shapes(
                &instance.cell,
                layer,
                transform * instance.transform,
                instance.dose.or(inherited_dose),
                stack,
                out,
            )?;
        }

        stack.pop();
        Ok(())
    }
}

impl GeometryProvider for Layout {
    fn active_cell(&self) -> Option<String> {
        self.top_cell.clone()
    }

    fn database_unit(&self) -> f64 {
        self.dbu
    }

    fn source_name(&self) -> String {
        if self.name.is_empty() {
            "layout".to_string()
        } else {
            self.name.clone()
        }
    }

    fn layers(&self) -> Vec<LayerProperties> {
        self.layers.clone()
    }

    fn shapes_on(&self, layer: &LayerProperties) -> Result<Vec<ProvidedShape>, LayoutError> {
        let Some(top) = self.top_cell.as_deref() else {
            return Ok(Vec::new());
        };
        let mut shapes = Vec::new();
        let mut stack = Vec::new();
        self.collect_shapes(top, layer, Affine::IDENTITY, None, &mut stack, &mut shapes)?;
        Ok(shapes)
    }
}
