use anyhow::{anyhow, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Extracts the boundary from a `multipart/form-data; boundary=...` header.
pub fn boundary(content_type: &str) -> Option<String> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn disposition_param(header: &str, key: &str) -> Option<String> {
    header.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case(key) {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn parse_part(raw: &[u8]) -> Result<Part> {
    let header_end = find(raw, b"\r\n\r\n", 0).ok_or_else(|| anyhow!("multipart part has no header terminator"))?;
    let headers = String::from_utf8_lossy(&raw[..header_end]);
    let mut part = Part {
        name: String::new(),
        filename: None,
        content_type: None,
        data: raw[header_end + 4..].to_vec(),
    };
    for line in headers.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("content-disposition") {
            part.name = disposition_param(value, "name").unwrap_or_default();
            part.filename = disposition_param(value, "filename");
        } else if name.trim().eq_ignore_ascii_case("content-type") {
            part.content_type = Some(value.to_string());
        }
    }
    Ok(part)
}

pub fn parse(body: &[u8], boundary: &str) -> Result<Vec<Part>> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut cursor = find(body, &delimiter, 0).ok_or_else(|| anyhow!("multipart boundary not found"))?;
    let mut parts = Vec::new();
    loop {
        let start = cursor + delimiter.len();
        if body[start..].starts_with(b"--") {
            break;
        }
        let start = if body[start..].starts_with(b"\r\n") { start + 2 } else { start };
        let next = find(body, &delimiter, start).ok_or_else(|| anyhow!("unterminated multipart body"))?;
        let mut end = next;
        if end >= 2 && &body[end - 2..end] == b"\r\n" {
            end -= 2;
        }
        parts.push(parse_part(&body[start..end])?);
        cursor = next;
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_boundary_parameter() {
        assert_eq!(
            boundary("multipart/form-data; boundary=\"abc123\"").as_deref(),
            Some("abc123")
        );
        assert_eq!(boundary("application/json"), None);
    }

    #[test]
    fn splits_fields_and_files() {
        let body = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\r\n\
hello\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"deck.pptx\"\r\n\
Content-Type: application/octet-stream\r\n\r\n\
\x00\x01\r\n\x02\r\n\
--XyZ--\r\n";
        let parts = parse(body, "XyZ").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "note");
        assert_eq!(parts[0].data, b"hello");
        assert_eq!(parts[1].filename.as_deref(), Some("deck.pptx"));
        assert_eq!(parts[1].content_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(parts[1].data, b"\x00\x01\r\n\x02");
    }

    #[test]
    fn missing_boundary_is_an_error() {
        assert!(parse(b"no parts here", "XyZ").is_err());
    }
}
