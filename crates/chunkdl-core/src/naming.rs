//! Destination file names.
//!
//! Picks a local name for a download when the caller gives none: the
//! `Content-Disposition` filename if the server sent one, else the last
//! segment of the URL path, cleaned so it is a single path component.

/// Used when neither header nor URL give anything usable.
pub const FALLBACK_NAME: &str = "download.bin";

const NAME_MAX: usize = 255;

/// Local file name for `url`, preferring the `Content-Disposition` header.
pub fn dest_name_for(url: &str, content_disposition: Option<&str>) -> String {
    content_disposition
        .and_then(disposition_file_name)
        .map(|n| clean_file_name(&n))
        .filter(|n| is_plain_file_name(n))
        .or_else(|| {
            last_path_segment(url)
                .map(|n| clean_file_name(&n))
                .filter(|n| is_plain_file_name(n))
        })
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// True if `name` is one non-empty path component (no separators, not `.`/`..`).
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name.len() <= NAME_MAX
        && !name.contains(['/', '\\', '\0'])
}

/// Last non-empty segment of the URL path, percent-decoded.
fn last_path_segment(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(percent_decode(segment))
}

/// `filename*=UTF-8''...` wins over `filename=...`.
fn disposition_file_name(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';') {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value
                    .split_once("''")
                    .filter(|(charset, _)| charset.eq_ignore_ascii_case("utf-8"))
                    .map(|(_, rest)| rest);
                if let Some(encoded) = encoded {
                    let decoded = percent_decode(encoded.trim_matches('"'));
                    if !decoded.is_empty() {
                        return Some(decoded);
                    }
                }
            }
            "filename" => {
                let unquoted = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .map(unescape_quoted)
                    .unwrap_or_else(|| value.to_string());
                if !unquoted.is_empty() {
                    plain = Some(unquoted);
                }
            }
            _ => {}
        }
    }
    plain
}

fn unescape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;
    for c in s.chars() {
        if escaped || c != '\\' {
            out.push(c);
            escaped = false;
        } else {
            escaped = true;
        }
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(b) = input.get(i + 1..i + 3).and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Replace separators, NUL and control characters with `_`, collapse runs
/// of `_`, trim dots/spaces/underscores at both ends, cap at 255 bytes.
fn clean_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if matches!(c, '/' | '\\' | '\0' | '\t') || c.is_control() {
            '_'
        } else {
            c
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    let trimmed = out.trim_matches(|c| matches!(c, ' ' | '.' | '_'));
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
