//! Salvaging a JSON object out of collaborator output that wraps it in
//! prose or markdown fences.

/// Byte range of the first balanced `{...}` in `raw`, honouring string
/// literals and escapes so braces inside values never close the object.
pub fn extract_first_json_object(raw: &str) -> Option<&str> {
    let open = raw.find('{')?;
    let mut depth = 0usize;
    let mut quoted = false;
    let mut chars = raw[open..].char_indices();

    while let Some((offset, ch)) = chars.next() {
        match (quoted, ch) {
            (true, '\\') => {
                chars.next();
            }
            (_, '"') => quoted = !quoted,
            (false, '{') => depth += 1,
            (false, '}') => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return raw.get(open..=open + offset);
                }
            }
            _ => {}
        }
    }
    None
}
