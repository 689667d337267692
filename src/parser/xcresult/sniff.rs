//! Extension detection from attachment content.

/// Guesses a file extension (with leading dot) from magic bytes.
///
/// Returns `None` for fewer than four bytes or unrecognized binary data.
pub fn detect_extension(data: &[u8]) -> Option<&'static str> {
    if data.len() < 4 {
        return None;
    }

    const HEIC_BRANDS: [&[u8]; 7] = [
        b"ftypheic", b"ftypheix", b"ftypheis", b"ftyphevc", b"ftyphevx", b"ftyphevs",
        b"ftyphevm",
    ];

    let ext = if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        ".png"
    } else if data.starts_with(b"\xff\xd8") {
        ".jpg"
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        ".gif"
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP".as_slice()) {
        ".webp"
    } else if data.starts_with(b"\x00\x00\x01\x00") {
        ".ico"
    } else if data.starts_with(b"BM\x00\x00") {
        ".bmp"
    } else if data.starts_with(b"\x00\x00\x00\x20")
        || data.starts_with(b"II*\x00")
        || data.starts_with(b"MM\x00*")
    {
        ".tiff"
    } else if data
        .get(4..12)
        .is_some_and(|brand| HEIC_BRANDS.contains(&brand))
    {
        ".heic"
    } else if data.starts_with(b"%PDF") {
        ".pdf"
    } else if data.starts_with(b"bplist00") {
        ".plist"
    } else if data.starts_with(b"\xef\xbb\xbf")
        || data.starts_with(b"\xff\xfe")
        || data.starts_with(b"\xfe\xff")
    {
        ".txt"
    } else if matches!(data[0], b'{' | b'[') {
        if serde_json::from_slice::<serde_json::Value>(data).is_ok() {
            ".json"
        } else {
            return None;
        }
    } else if data[0] == b'<' {
        ".xml"
    } else if data
        .iter()
        .all(|&b| b >= 32 || matches!(b, b'\t' | b'\n' | b'\r'))
    {
        ".txt"
    } else {
        return None;
    };

    Some(ext)
}
