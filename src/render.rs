//! TypeScript output.

use std::fmt;

use log::trace;

use crate::config::RenderOptions;
use crate::{MapData, ShapeRecord};

/// Fields of the exported interface, in output order.
const FIELDS: &[(&str, &str)] = &[
    ("id", "string"),
    ("name", "string"),
    ("path", "string"),
    ("x", "number"),
    ("y", "number"),
];

/// A string literal, escaped the way JSON escapes strings.
struct Quoted<'a>(&'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let literal = serde_json::to_string(self.0).map_err(|_| fmt::Error)?;
        f.write_str(&literal)
    }
}

/// A numeric literal. Coordinates that were never set are written as `0`.
struct Number(Option<f64>);

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            // Debug keeps the fractional part of whole numbers (`300.0`)
            Some(value) => write!(f, "{:?}", value),
            None => f.write_str("0"),
        }
    }
}

struct Entry<'a> {
    key: &'a str,
    shape: &'a ShapeRecord,
}

impl fmt::Display for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.shape.label;
        writeln!(f, "  {}: {{", Quoted(self.key))?;
        writeln!(f, "    id: {},", Quoted(&self.shape.id))?;
        writeln!(f, "    name: {},", Quoted(self.key))?;
        writeln!(f, "    path: {},", Quoted(&self.shape.path))?;
        writeln!(f, "    x: {},", Number(label.map(|l| l.x)))?;
        writeln!(f, "    y: {}", Number(label.map(|l| l.y)))?;
        writeln!(f, "  }},")
    }
}

struct Module<'a> {
    type_name: &'a str,
    const_name: &'a str,
    entries: Vec<Entry<'a>>,
}

impl fmt::Display for Module<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "export interface {} {{", self.type_name)?;
        for (field, ty) in FIELDS {
            writeln!(f, "  {}: {};", field, ty)?;
        }
        writeln!(f, "}}")?;
        writeln!(f)?;
        writeln!(
            f,
            "export const {}: Record<string, {}> = {{",
            self.const_name, self.type_name
        )?;
        for entry in &self.entries {
            write!(f, "{}", entry)?;
        }
        writeln!(f, "}};")
    }
}

/// Render map data as a TypeScript module.
///
/// The module exports an interface named `options.type_name` and a constant
/// named `options.const_name` that maps region names to records. Entries keep
/// the order of `data`. All strings are escaped, so quotes or backslashes in
/// path data cannot break the output.
pub fn render(data: &MapData, options: &RenderOptions) -> String {
    trace!("render: {} entries", data.len());
    let module = Module {
        type_name: &options.type_name,
        const_name: &options.const_name,
        entries: data
            .iter()
            .map(|(key, shape)| Entry { key, shape })
            .collect(),
    };
    module.to_string()
}
