//! Image inputs: wrap the picture in a one-page HTML document so the render
//! step can print it to PDF.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// MIME type of an image buffer, from its magic bytes.
///
/// Falls back to `image/png`, which browsers sniff past anyway.
pub fn image_mime_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(format) => format.to_mime_type(),
        Err(_) => "image/png",
    }
}

/// An HTML page showing `bytes` centred at the top, scaled to page width.
pub fn build_image_html(bytes: &[u8], mime_type: &str) -> String {
    let data = STANDARD.encode(bytes);
    let mut html = String::with_capacity(data.len() + 320);
    html.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    html.push_str("<style>");
    html.push_str(
        "body { margin: 0; padding: 0; display: flex; justify-content: center; align-items: flex-start; }",
    );
    html.push_str("img { max-width: 100%; height: auto; }");
    html.push_str("</style>");
    html.push_str("</head><body>");
    html.push_str(&format!("<img src=\"data:{mime_type};base64,{data}\" alt=\"Image\">"));
    html.push_str("</body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn embeds_base64_data_uri() {
        let html = build_image_html(b"abc", "image/png");
        assert!(html.contains("<img src=\"data:image/png;base64,YWJj\" alt=\"Image\">"));
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("</head>"));
    }

    #[test]
    fn mime_from_magic() {
        assert_eq!(image_mime_type(&PNG_MAGIC), "image/png");
        assert_eq!(image_mime_type(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(image_mime_type(b"GIF89a...."), "image/gif");
        assert_eq!(image_mime_type(b"nonsense"), "image/png");
    }
}
