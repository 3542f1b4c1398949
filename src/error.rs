use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("SVG file not found at {}: {source}", path.display())]
    SourceNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("SVG parse error: {0}")]
    MalformedSource(String),
    #[error("Invalid {attribute} coordinate {value:?} on label marker {id:?}")]
    InvalidCoordinate {
        id: String,
        attribute: &'static str,
        value: String,
    },
    #[error("Could not write map data to {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
