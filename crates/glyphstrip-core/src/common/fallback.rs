//! Locally synthesized placeholder images.
//!
//! When a collaborator cannot produce an image the pipeline substitutes one of
//! these instead of failing the request. Both are SVG documents, so they need
//! no rasterizer:
//!
//! - [`character_image`] draws the character in white on an error-red square
//!   with an "Error" label underneath.
//! - [`naive_composite`] places already-encoded images side by side at a fixed
//!   pitch of [`CELL_SIZE`] pixels, top-aligned, without resizing. The pitch
//!   matches the native size of the rendering collaborators' output.

use crate::ImageData;
use core::fmt::Write as _;

/// Width and height of one character cell, in pixels.
pub const CELL_SIZE: u32 = 200;

/// Background of a character that could not be rendered.
pub const ERROR_BACKGROUND: &str = "#d9534f";

/// Label drawn under the character on a fallback image.
pub const ERROR_LABEL: &str = "Error";

/// Drawn in place of characters XML 1.0 cannot carry.
pub const REPLACEMENT_GLYPH: char = '\u{FFFD}';

/// Characters outside the XML 1.0 `Char` production: C0 controls other than
/// tab, LF and CR, plus the two noncharacters U+FFFE and U+FFFF.
const fn is_xml_forbidden(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}

/// Escapes text for use inside SVG element content or attribute values.
fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if is_xml_forbidden(c) => out.push(REPLACEMENT_GLYPH),
            _ => out.push(c),
        }
    }
    out
}

/// Left edge of the cell at `index`, saturating for absurdly long strips.
fn cell_offset(index: usize) -> u32 {
    u32::try_from(index)
        .unwrap_or(u32::MAX)
        .saturating_mul(CELL_SIZE)
}

/// Renders the error placeholder for `character`.
pub fn character_image(character: char) -> ImageData {
    let size = CELL_SIZE;
    let half = size / 2;
    let mut buf = [0u8; 4];
    let glyph = escape_xml(character.encode_utf8(&mut buf));
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}">"#,
            r#"<rect width="{size}" height="{size}" fill="{bg}"/>"#,
            r#"<text x="{half}" y="{half}" dominant-baseline="middle" text-anchor="middle" "#,
            r##"font-family="Arial, sans-serif" font-size="96" fill="#ffffff" xml:space="preserve">{glyph}</text>"##,
            r#"<text x="{half}" y="{label_y}" text-anchor="middle" "#,
            r##"font-family="Arial, sans-serif" font-size="28" fill="#ffffff">{label}</text>"##,
            "</svg>"
        ),
        size = size,
        half = half,
        bg = ERROR_BACKGROUND,
        glyph = glyph,
        label_y = size - 20,
        label = ERROR_LABEL,
    );
    ImageData::svg(&svg)
}

/// Places `images` left to right, one [`CELL_SIZE`] cell each.
///
/// An empty slice yields a single blank cell.
pub fn naive_composite(images: &[&ImageData]) -> ImageData {
    let width = cell_offset(images.len().max(1));
    let height = CELL_SIZE;
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{width}" height="{height}">"#
    );
    for (i, image) in images.iter().enumerate() {
        let x = cell_offset(i);
        // Writing to a String cannot fail.
        let _ = write!(
            svg,
            r#"<image href="{href}" xlink:href="{href}" x="{x}" y="0" width="{CELL_SIZE}" height="{CELL_SIZE}"/>"#,
            href = escape_xml(image.as_str()),
        );
    }
    svg.push_str("</svg>");
    ImageData::svg(&svg)
}
