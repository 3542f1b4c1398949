use std::path::PathBuf;

/// Where the map drawing is read from when no input is given.
pub const DEFAULT_SOURCE_PATH: &str = "src/assets/images/nigeria_map.svg";

/// Where the generated TypeScript module is written when no output is given.
pub const DEFAULT_DESTINATION_PATH: &str = "src/lib/mapData.ts";

/// The `id` of the group holding the label marker circles.
pub const DEFAULT_LABEL_GROUP_ID: &str = "label_points";

pub const DEFAULT_TYPE_NAME: &str = "StateMapData";
pub const DEFAULT_CONST_NAME: &str = "NIGERIA_MAP_DATA";

/// Options for the extraction step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub label_group_id: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            label_group_id: DEFAULT_LABEL_GROUP_ID.to_string(),
        }
    }
}

/// Identifiers used in the generated TypeScript module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Name of the exported record interface.
    pub type_name: String,
    /// Name of the exported mapping constant.
    pub const_name: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            type_name: DEFAULT_TYPE_NAME.to_string(),
            const_name: DEFAULT_CONST_NAME.to_string(),
        }
    }
}

/// Everything a single conversion run needs.
///
/// `Config::default()` points at the fixed locations used by the front-end
/// project. Tests and callers with other layouts use [`Config::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub parse: ParseOptions,
    pub render: RenderOptions,
}

impl Config {
    pub fn new<S, D>(source_path: S, destination_path: D) -> Self
    where
        S: Into<PathBuf>,
        D: Into<PathBuf>,
    {
        Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            parse: ParseOptions::default(),
            render: RenderOptions::default(),
        }
    }

    pub fn with_label_group_id(mut self, id: impl Into<String>) -> Self {
        self.parse.label_group_id = id.into();
        self
    }

    pub fn with_type_name(mut self, name: impl Into<String>) -> Self {
        self.render.type_name = name.into();
        self
    }

    pub fn with_const_name(mut self, name: impl Into<String>) -> Self {
        self.render.const_name = name.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_PATH, DEFAULT_DESTINATION_PATH)
    }
}
