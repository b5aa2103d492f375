//! Content sniffing: binary signatures plus an SVG grammar check.

pub mod detector;
pub mod svg;

pub use detector::{TypeSniffer, detect_file};
pub use svg::{is_svg, is_svg_file};
