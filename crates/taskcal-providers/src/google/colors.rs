//! Google Calendar event color palette.
//!
//! Events carry a `colorId` from 1 to 11. Local events store a hex color;
//! a hex value outside the palette is sent as the default color.

/// Color used when a local hex value has no exact palette match.
pub const DEFAULT_COLOR_ID: &str = "7";

/// One palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteColor {
    /// Google's `colorId`.
    pub id: &'static str,
    /// Lowercase `#rrggbb`.
    pub hex: &'static str,
    /// Name shown in Google Calendar.
    pub name: &'static str,
}

/// The eleven event colors.
pub const PALETTE: [PaletteColor; 11] = [
    PaletteColor { id: "1", hex: "#7986cb", name: "Lavender" },
    PaletteColor { id: "2", hex: "#33b679", name: "Sage" },
    PaletteColor { id: "3", hex: "#8e24aa", name: "Grape" },
    PaletteColor { id: "4", hex: "#e67c73", name: "Flamingo" },
    PaletteColor { id: "5", hex: "#f6bf26", name: "Banana" },
    PaletteColor { id: "6", hex: "#f4511e", name: "Tangerine" },
    PaletteColor { id: "7", hex: "#039be5", name: "Peacock" },
    PaletteColor { id: "8", hex: "#616161", name: "Graphite" },
    PaletteColor { id: "9", hex: "#3f51b5", name: "Blueberry" },
    PaletteColor { id: "10", hex: "#0b8043", name: "Basil" },
    PaletteColor { id: "11", hex: "#d50000", name: "Tomato" },
];

/// Returns the `colorId` for a hex color, falling back to [`DEFAULT_COLOR_ID`].
pub fn color_id_for_hex(hex: &str) -> &'static str {
    PALETTE
        .iter()
        .find(|c| c.hex.eq_ignore_ascii_case(hex.trim()))
        .map_or(DEFAULT_COLOR_ID, |c| c.id)
}

/// Returns the hex color of a `colorId`, if it is in the palette.
pub fn hex_for_color_id(id: &str) -> Option<&'static str> {
    PALETTE.iter().find(|c| c.id == id).map(|c| c.hex)
}
