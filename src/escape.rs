//! Printable rendering of raw bytes for diagnostics.
//!
//! Firmware replies, collaborator replies and operator input are echoed into
//! log messages. Control characters and the quoting characters `' " [ ] ( )`
//! are rewritten as `[chr(NNN)]` so a stray CR or quote never garbles a line.

const QUOTING: &[u8] = b"'\"[]()";

/// Render `bytes` with every non-printing byte replaced by `[chr(NNN)]`.
///
/// When `blanks` is true spaces are replaced as well, which makes a lone
/// space visible in single-byte diagnostics.
pub fn show_bytes(bytes: &[u8], blanks: bool) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        let hidden = (b == b' ' && blanks) || b < b' ' || b > b'~' || QUOTING.contains(&b);
        if hidden {
            out.push_str(&format!("[chr({:03})]", b));
        } else {
            out.push(b as char);
        }
    }
    out
}
