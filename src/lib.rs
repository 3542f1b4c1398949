//! Convert an SVG map of administrative regions into a TypeScript data table.
//!
//! Every `<path>` element carrying an `id`, a `name` and a `d` attribute is a
//! region. Label positions are taken from the `<circle>` children of the group
//! with `id="label_points"`, matched to regions by `id`. The result is a
//! TypeScript module exporting an interface and a `Record` keyed by region
//! name:
//!
//! ```text
//! export const NIGERIA_MAP_DATA: Record<string, StateMapData> = {
//!   "Lagos": {
//!     id: "LA",
//!     name: "Lagos",
//!     path: "M 10,10 L 20,20 Z",
//!     x: 512.5,
//!     y: 300.0
//!   },
//! };
//! ```
//!
//! Path data is carried through verbatim, it is never interpreted.
//!
//! You can optionally get serde 1 support for the record types by enabling the
//! `serde` feature.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

use std::convert;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, trace, warn};
use tempfile::NamedTempFile;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod config;
mod error;
mod render;
pub mod svg;

pub use crate::config::{Config, ParseOptions, RenderOptions};
pub use crate::config::{
    DEFAULT_CONST_NAME, DEFAULT_DESTINATION_PATH, DEFAULT_LABEL_GROUP_ID, DEFAULT_SOURCE_PATH,
    DEFAULT_TYPE_NAME,
};
pub use crate::error::Error;
pub use crate::render::render;

/// A `CoordinatePair` consists of an x and y coordinate.
#[derive(Debug, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoordinatePair {
    pub x: f64,
    pub y: f64,
}

impl CoordinatePair {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl convert::From<(f64, f64)> for CoordinatePair {
    fn from(val: (f64, f64)) -> Self {
        Self { x: val.0, y: val.1 }
    }
}

/// The drawable geometry of one region.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShapeRecord {
    pub id: String,
    /// The name as written in the drawing, possibly with surrounding whitespace.
    pub name: String,
    /// Path drawing commands, byte for byte as found in the `d` attribute.
    pub path: String,
    /// Where the region's label goes. `None` until a label marker matched.
    pub label: Option<CoordinatePair>,
}

impl ShapeRecord {
    /// Build a record from a shape element. Unless `id`, `name` and `d` are
    /// all present and non-empty, the element is handed back unchanged.
    pub fn from_raw(raw: svg::RawShape) -> Result<Self, svg::RawShape> {
        match raw {
            svg::RawShape {
                id: Some(id),
                name: Some(name),
                path: Some(path),
            } if !id.is_empty() && !name.is_empty() && !path.is_empty() => Ok(Self {
                id,
                name,
                path,
                label: None,
            }),
            incomplete => Err(incomplete),
        }
    }

    /// The trimmed name under which the region is exported.
    pub fn key(&self) -> &str {
        self.name.trim()
    }

    pub fn x(&self) -> f64 {
        self.label.map_or(0.0, |label| label.x)
    }

    pub fn y(&self) -> f64 {
        self.label.map_or(0.0, |label| label.y)
    }
}

/// A label position for the region with the same `id`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelRecord {
    pub id: String,
    pub position: CoordinatePair,
}

impl LabelRecord {
    /// Parse the `cx`/`cy` attributes of a label marker.
    ///
    /// A missing, non-numeric or non-finite coordinate is an error.
    pub fn parse(id: &str, cx: Option<&str>, cy: Option<&str>) -> Result<Self, Error> {
        let x = parse_coordinate(id, "cx", cx)?;
        let y = parse_coordinate(id, "cy", cy)?;
        Ok(Self {
            id: id.to_string(),
            position: CoordinatePair::new(x, y),
        })
    }
}

fn parse_coordinate(id: &str, attribute: &'static str, value: Option<&str>) -> Result<f64, Error> {
    let invalid = || Error::InvalidCoordinate {
        id: id.to_string(),
        attribute,
        value: value.unwrap_or_default().to_string(),
    };
    let number: f64 = value.ok_or_else(invalid)?.trim().parse().map_err(|_| invalid())?;
    if number.is_finite() {
        Ok(number)
    } else {
        Err(invalid())
    }
}

/// Regions keyed by trimmed name, in the order they were first discovered.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapData {
    entries: IndexMap<String, ShapeRecord>,
    shapes: usize,
}

impl MapData {
    /// Key the shapes by their trimmed name.
    ///
    /// When two shapes share a name the later one replaces the earlier one
    /// but keeps its position.
    pub fn from_shapes<I>(shapes: I) -> Self
    where
        I: IntoIterator<Item = ShapeRecord>,
    {
        let mut data = Self::default();
        for shape in shapes {
            data.shapes += 1;
            let key = shape.key().to_string();
            let new_id = shape.id.clone();
            if let Some(previous) = data.entries.insert(key, shape) {
                warn!(
                    "Region name {:?} is used by shapes {:?} and {:?}, keeping the latter",
                    previous.key(),
                    previous.id,
                    new_id
                );
            }
        }
        data
    }

    /// Number of exported entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of shape records that went into this map, including ones that
    /// were replaced by a later shape with the same name.
    pub fn shape_count(&self) -> usize {
        self.shapes
    }

    pub fn get(&self, name: &str) -> Option<&ShapeRecord> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ShapeRecord)> {
        self.entries.iter().map(|(key, shape)| (key.as_str(), shape))
    }
}

/// Outcome of a successful [`convert`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Summary {
    /// Number of shape records processed.
    pub shapes: usize,
    /// Number of entries written, lower than `shapes` if names collided.
    pub entries: usize,
    pub destination: PathBuf,
}

/// Parse an SVG string into region map data.
pub fn parse(svg: &str, options: &ParseOptions) -> Result<MapData, Error> {
    trace!("parse");

    let extraction = svg::extract(svg, &options.label_group_id)?;

    // Keyed by id while merging labels
    let mut shapes: IndexMap<String, ShapeRecord> = IndexMap::new();
    for raw in extraction.shapes {
        match ShapeRecord::from_raw(raw) {
            Ok(shape) => {
                shapes.insert(shape.id.clone(), shape);
            }
            Err(raw) => debug!("parse: Skipping incomplete shape {:?}", raw),
        }
    }
    trace!("parse: Found {} shapes", shapes.len());

    if !extraction.label_group_found {
        debug!(
            "parse: No label group {:?}, all labels stay at (0, 0)",
            options.label_group_id
        );
    }
    for marker in &extraction.markers {
        let id = match marker.id.as_deref() {
            Some(id) => id,
            None => continue,
        };
        if let Some(shape) = shapes.get_mut(id) {
            let label = LabelRecord::parse(id, marker.cx.as_deref(), marker.cy.as_deref())?;
            shape.label = Some(label.position);
        } else {
            trace!("parse: Discarding label marker {:?} without shape", id);
        }
    }

    Ok(MapData::from_shapes(shapes.into_values()))
}

fn read_source(path: &Path) -> Result<String, Error> {
    let bytes = fs::read(path).map_err(|source| Error::SourceNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes)
        .map_err(|e| Error::MalformedSource(format!("Source is not valid UTF-8: {}", e)))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Replace `path` with `contents`.
///
/// The text goes to a temporary file next to the destination first, which is
/// then renamed over it. A failed write leaves any existing file untouched.
/// A symlinked destination keeps its link, the file it points to is replaced.
fn write_destination(path: &Path, contents: &str) -> Result<(), Error> {
    let failure = |source: std::io::Error| Error::WriteFailure {
        path: path.to_path_buf(),
        source,
    };
    fs::create_dir_all(parent_dir(path)).map_err(failure)?;

    let target = match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => fs::canonicalize(path).map_err(failure)?,
        _ => path.to_path_buf(),
    };
    let existing = fs::metadata(&target).ok();

    #[allow(unused_mut)]
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Temporary files are private by default. Ask for 0o666 like any
        // newly created file, the umask applies on creation.
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let mut file: NamedTempFile = builder.tempfile_in(parent_dir(&target)).map_err(failure)?;
    file.write_all(contents.as_bytes()).map_err(failure)?;
    if let Some(meta) = existing {
        file.as_file()
            .set_permissions(meta.permissions())
            .map_err(failure)?;
    }

    trace!("write_destination: Persisting to {}", target.display());
    file.persist(&target).map_err(|e| failure(e.error))?;
    Ok(())
}

/// Convert the SVG map at `config.source_path` into a TypeScript module at
/// `config.destination_path`.
///
/// Nothing is written unless reading, parsing and rendering all succeeded.
pub fn convert(config: &Config) -> Result<Summary, Error> {
    trace!("convert");

    let svg = read_source(&config.source_path)?;
    let data = parse(&svg, &config.parse)?;
    let output = render(&data, &config.render);
    write_destination(&config.destination_path, &output)?;

    debug!(
        "convert: Wrote {} entries to {}",
        data.len(),
        config.destination_path.display()
    );
    Ok(Summary {
        shapes: data.shape_count(),
        entries: data.len(),
        destination: config.destination_path.clone(),
    })
}
