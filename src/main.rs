use svg2mapdata::{Config, Summary, DEFAULT_DESTINATION_PATH, DEFAULT_SOURCE_PATH};

pub const HELP: &str = "svg2mapdata

USAGE:
    svg2mapdata [OPTIONS] [INPUT [OUTPUT]]

OPTIONS:
    -h, --help\t\tPrint this message

Reads the SVG map at INPUT and writes a TypeScript module with the path and
label point of every region to OUTPUT.

Defaults:
    INPUT\t\tsrc/assets/images/nigeria_map.svg
    OUTPUT\t\tsrc/lib/mapData.ts

Set RUST_LOG=debug for details about skipped shapes and labels.";

fn main() {
    env_logger::init();

    let mut paths = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", HELP);
                return;
            }
            flag if flag.starts_with('-') => {
                eprintln!("Unknown option: {}\n\n{}", flag, HELP);
                std::process::exit(1);
            }
            _ => paths.push(arg),
        }
    }
    if paths.len() > 2 {
        eprintln!("Too many arguments\n\n{}", HELP);
        std::process::exit(1);
    }

    let mut paths = paths.into_iter();
    let config = Config::new(
        paths.next().unwrap_or_else(|| DEFAULT_SOURCE_PATH.to_string()),
        paths.next().unwrap_or_else(|| DEFAULT_DESTINATION_PATH.to_string()),
    );

    match svg2mapdata::convert(&config) {
        Ok(summary) => println!("{}", success_line(&summary)),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

/// Reports the number of regions processed, and how many were written when
/// name collisions dropped some.
fn success_line(summary: &Summary) -> String {
    let mut line = format!(
        "Successfully generated map data at {} ({} regions",
        summary.destination.display(),
        summary.shapes
    );
    if summary.entries != summary.shapes {
        line.push_str(&format!(", {} written after name collisions", summary.entries));
    }
    line.push(')');
    line
}
