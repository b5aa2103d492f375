//! Domain entity definitions.

mod fetch;
mod flags;
mod payload;
mod sniffed_type;

pub use fetch::FetchResult;
pub use flags::{ProxyFlags, Rendition, TransformKind};
pub use payload::{ByteStream, ImagePayload, PayloadData};
pub use sniffed_type::{
    ANIMATION_CONVERTIBLE_TYPES, BROWSER_SAFE_TYPES, CONVERTIBLE_TYPES, MIME_OCTET_STREAM,
    MIME_SVG, MIME_XML, SniffedType, canonical_mime, is_browser_safe,
};
