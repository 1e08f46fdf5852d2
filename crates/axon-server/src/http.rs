//! Minimal HTTP: parse just the request line, respond `200` to `GET`,
//! `405` to anything else.

/// `true` once `buf` contains a full request line (we don't need the rest
/// of the request to decide how to respond).
pub fn has_complete_request_line(buf: &[u8]) -> bool {
    buf.windows(2).any(|w| w == b"\r\n") || buf.contains(&b'\n')
}

fn request_line(buf: &[u8]) -> &[u8] {
    let end = buf
        .iter()
        .position(|&b| b == b'\n')
        .map(|pos| if pos > 0 && buf[pos - 1] == b'\r' { pos - 1 } else { pos })
        .unwrap_or(buf.len());
    &buf[..end]
}

fn method(buf: &[u8]) -> &[u8] {
    let line = request_line(buf);
    line.split(|&b| b == b' ').next().unwrap_or(b"")
}

/// Build the full response bytes for a received request buffer.
pub fn response_for(buf: &[u8]) -> Vec<u8> {
    if method(buf) == b"GET" {
        response(200, "OK")
    } else {
        response(405, "Method Not Allowed")
    }
}

fn response(status: u16, reason: &str) -> Vec<u8> {
    let body = format!("<html><body>{status} {reason}</body></html>");
    format!(
        "HTTP/1.1 {status} {reason}\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_request_yields_200() {
        let resp = response_for(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let text = String::from_utf8(resp).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK"));
        assert!(text.contains("Content-Type: text/html; charset=utf-8"));
    }

    #[test]
    fn non_get_request_yields_405() {
        let resp = response_for(b"POST / HTTP/1.1\r\n\r\n");
        let text = String::from_utf8(resp).unwrap();
        assert!(text.starts_with("HTTP/1.1 405"));
    }

    #[test]
    fn incomplete_request_is_detected() {
        assert!(!has_complete_request_line(b"GET / HTTP"));
        assert!(has_complete_request_line(b"GET / HTTP/1.1\r\n"));
    }
}
