//! Request flags and the transform they select.

use bitflags::bitflags;

bitflags! {
    /// Boolean switches carried by an inbound proxy request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProxyFlags: u8 {
        /// Custom emoji rendition (height 128).
        const EMOJI = 1 << 0;
        /// Avatar rendition (height 320).
        const AVATAR = 1 << 1;
        /// First frame only.
        const STATIC = 1 << 2;
        /// Small preview (200x200).
        const PREVIEW = 1 << 3;
        /// Monochrome notification badge.
        const BADGE = 1 << 4;
        /// Serve a placeholder on failure. Not a transform.
        const FALLBACK = 1 << 5;
    }
}

impl ProxyFlags {
    /// Flags that require a convertible source type.
    pub const CONVERSIONS: Self = Self::EMOJI
        .union(Self::AVATAR)
        .union(Self::STATIC)
        .union(Self::PREVIEW)
        .union(Self::BADGE);

    /// Looks up a flag by its query-string name.
    #[must_use]
    pub fn from_query_key(name: &str) -> Option<Self> {
        match name {
            "emoji" => Some(Self::EMOJI),
            "avatar" => Some(Self::AVATAR),
            "static" => Some(Self::STATIC),
            "preview" => Some(Self::PREVIEW),
            "badge" => Some(Self::BADGE),
            "fallback" => Some(Self::FALLBACK),
            _ => None,
        }
    }

    /// Returns true if any conversion flag is set.
    #[must_use]
    pub const fn requests_conversion(self) -> bool {
        self.intersects(Self::CONVERSIONS)
    }
}

/// Height bound used by a sized rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rendition {
    /// Custom emoji.
    Emoji,
    /// User avatar.
    Avatar,
}

impl Rendition {
    /// Maximum output height in pixels.
    #[must_use]
    pub const fn max_height(self) -> u32 {
        match self {
            Self::Emoji => 128,
            Self::Avatar => 320,
        }
    }
}

/// The single transform selected for a request.
///
/// Flags are prioritised, never combined. The order of the match in
/// [`TransformKind::select`] is part of the security contract: `badge`
/// must be decided before any SVG handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Emoji or avatar rendition. `still` keeps only the first frame.
    Sized {
        /// Which height bound applies.
        rendition: Rendition,
        /// First frame only.
        still: bool,
    },
    /// First frame fit into 498x422.
    Still,
    /// Fit into 200x200.
    Preview,
    /// 96x96 monochrome badge.
    Badge,
    /// No conversion flag: SVG rasterisation, rejection or passthrough,
    /// decided by the sniffed type.
    Original,
}

impl TransformKind {
    /// Picks the transform for a flag set. First match wins.
    #[must_use]
    pub fn select(flags: ProxyFlags) -> Self {
        let still = flags.contains(ProxyFlags::STATIC);
        if flags.contains(ProxyFlags::EMOJI) {
            Self::Sized {
                rendition: Rendition::Emoji,
                still,
            }
        } else if flags.contains(ProxyFlags::AVATAR) {
            Self::Sized {
                rendition: Rendition::Avatar,
                still,
            }
        } else if still {
            Self::Still
        } else if flags.contains(ProxyFlags::PREVIEW) {
            Self::Preview
        } else if flags.contains(ProxyFlags::BADGE) {
            Self::Badge
        } else {
            Self::Original
        }
    }
}
