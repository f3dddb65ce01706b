//! Handles HTTP request parsing and response writing.

use crate::error::AppError;
use crate::router::Router;
use crate::server::ServerStats;
use crate::templates::{TemplateEngine, get_error_description};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::io::prelude::*;
use std::net::TcpStream;
use std::time::Duration;

/// Maximum size for request headers (8KB) to prevent header buffer overflow
const MAX_HEADERS_SIZE: usize = 8 * 1024;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

const SERVER_HEADER: &str = concat!("phonebook/", env!("CARGO_PKG_VERSION"));

/// Represents a parsed incoming HTTP request.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    /// Request target as sent, including any query string
    pub path: String,
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

/// Represents an outgoing HTTP response.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: ResponseBody,
}

#[derive(Debug)]
pub enum ResponseBody {
    Text(String),
    Binary(Vec<u8>),
}

impl Request {
    /// Read one request from a client socket
    pub fn from_stream(stream: &mut TcpStream, max_body_size: u64) -> Result<Self, AppError> {
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        Self::from_reader(stream, max_body_size)
    }

    /// Parse a request from any byte source. The body is read in full,
    /// bounded by `max_body_size`.
    pub fn from_reader<R: Read>(reader: &mut R, max_body_size: u64) -> Result<Self, AppError> {
        let (headers_data, remaining_bytes) = Self::read_headers_with_remaining(reader)?;

        let mut lines = headers_data.lines();

        // Parse request line
        let request_line = lines.next().ok_or(AppError::BadRequest)?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, path, version] = parts.as_slice() else {
            return Err(AppError::BadRequest);
        };

        if !version.starts_with("HTTP/1.") {
            return Err(AppError::BadRequest);
        }

        let mut headers = HashMap::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                break;
            }

            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_lowercase();
                let value = value.trim().to_string();

                // Handle multiple header values (comma-separated)
                headers
                    .entry(key)
                    .and_modify(|existing: &mut String| {
                        existing.push_str(", ");
                        existing.push_str(&value);
                    })
                    .or_insert(value);
            }
        }

        let body = Self::read_request_body(reader, &headers, remaining_bytes, max_body_size)?;

        debug!(
            "Parsed request: {} {} (headers: {}, body_size: {})",
            method,
            path,
            headers.len(),
            body.as_ref().map_or(0, Vec::len)
        );

        Ok(Request {
            method: method.to_string(),
            path: path.to_string(),
            headers,
            body,
        })
    }

    /// Path without the query string
    pub fn path(&self) -> &str {
        self.path.split_once('?').map_or(self.path.as_str(), |(path, _)| path)
    }

    /// Raw query string, if any
    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, query)| query)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Body bytes, empty when no body was sent
    pub fn body(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }

    /// Read HTTP headers and return any body bytes that arrived with them
    fn read_headers_with_remaining<R: Read>(reader: &mut R) -> Result<(String, Vec<u8>), AppError> {
        let mut buffer = vec![0; MAX_HEADERS_SIZE];
        let mut total_read = 0;

        loop {
            let bytes_read = reader.read(&mut buffer[total_read..])?;
            if bytes_read == 0 {
                if total_read == 0 {
                    return Err(AppError::BadRequest);
                }
                break;
            }
            total_read += bytes_read;

            // End of headers is the earlier of \r\n\r\n and \n\n; the body may
            // contain either one
            let received = &buffer[..total_read];
            let crlf = find_subslice(received, b"\r\n\r\n").map(|pos| (pos, 4));
            let lf = find_subslice(received, b"\n\n").map(|pos| (pos, 2));
            let terminator = match (crlf, lf) {
                (Some(a), Some(b)) => Some(if b.0 < a.0 { b } else { a }),
                (a, b) => a.or(b),
            };

            if let Some((headers_end, terminator_len)) = terminator {
                let headers = std::str::from_utf8(&received[..headers_end])
                    .map_err(|_| AppError::BadRequest)?
                    .to_string();
                let body_start = headers_end + terminator_len;
                return Ok((headers, received[body_start..].to_vec()));
            }

            // Prevent header buffer overflow attacks
            if total_read >= buffer.len() {
                return Err(AppError::BadRequest);
            }
        }

        // Connection closed before the blank line; treat everything as headers
        let headers = std::str::from_utf8(&buffer[..total_read])
            .map_err(|_| AppError::BadRequest)?
            .to_string();
        Ok((headers, Vec::new()))
    }

    /// Read request body based on Content-Length header
    fn read_request_body<R: Read>(
        reader: &mut R,
        headers: &HashMap<String, String>,
        remaining_bytes: Vec<u8>,
        max_body_size: u64,
    ) -> Result<Option<Vec<u8>>, AppError> {
        let Some(length_str) = headers.get("content-length") else {
            if headers
                .get("transfer-encoding")
                .is_some_and(|encoding| encoding.to_lowercase().contains("chunked"))
            {
                warn!("Chunked transfer encoding not supported");
                return Err(AppError::BadRequest);
            }
            return Ok(None);
        };

        let content_length: u64 = length_str.parse().map_err(|_| AppError::BadRequest)?;
        if content_length > max_body_size {
            return Err(AppError::PayloadTooLarge(max_body_size));
        }
        let content_length = usize::try_from(content_length).map_err(|_| AppError::BadRequest)?;

        let mut body = Vec::with_capacity(content_length);
        let from_headers = remaining_bytes.len().min(content_length);
        body.extend_from_slice(&remaining_bytes[..from_headers]);

        let mut buffer = [0u8; 8192];
        while body.len() < content_length {
            let to_read = (content_length - body.len()).min(buffer.len());
            match reader.read(&mut buffer[..to_read]) {
                Ok(0) => return Err(AppError::BadRequest),
                Ok(n) => body.extend_from_slice(&buffer[..n]),
                Err(e) => {
                    if e.kind() == std::io::ErrorKind::TimedOut {
                        warn!("Request body read timeout");
                    }
                    return Err(AppError::Io(e));
                }
            }
        }

        debug!("Read request body: {} bytes", body.len());
        Ok(Some(body))
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

impl Response {
    pub fn new(status_code: u16, status_text: &str, body: ResponseBody) -> Self {
        Self {
            status_code,
            status_text: status_text.to_string(),
            headers: HashMap::new(),
            body,
        }
    }

    pub fn html(body: String) -> Self {
        Self::new(200, "OK", ResponseBody::Text(body))
            .with_header("Content-Type", "text/html; charset=utf-8")
    }

    /// 302 redirect to `location`
    pub fn redirect(location: &str) -> Self {
        Self::new(302, "Found", ResponseBody::Text(String::new())).with_header("Location", location)
    }

    pub fn binary(content_type: &str, bytes: Vec<u8>) -> Self {
        Self::new(200, "OK", ResponseBody::Binary(bytes)).with_header("Content-Type", content_type)
    }

    pub fn json(body: String) -> Self {
        Self::new(200, "OK", ResponseBody::Text(body))
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_header("Cache-Control", "no-cache")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Error page for `error`, with the status taken from the error kind
    pub fn from_error(error: &AppError) -> Self {
        let (status_code, status_text) = error.status();
        let body = TemplateEngine::new()
            .render_error_page(status_code, status_text, get_error_description(status_code))
            .unwrap_or_else(|e| {
                error!("Failed to render error page: {e}");
                format!("{status_code} {status_text}")
            });

        Self::new(status_code, status_text, ResponseBody::Text(body))
            .with_header("Content-Type", "text/html; charset=utf-8")
    }

    pub fn body_bytes(&self) -> &[u8] {
        match &self.body {
            ResponseBody::Text(text) => text.as_bytes(),
            ResponseBody::Binary(bytes) => bytes,
        }
    }

    /// Serialize and write the response. Returns the number of body bytes sent.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64, std::io::Error> {
        let body = self.body_bytes();

        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status_code, self.status_text);
        head.push_str(&format!("Server: {SERVER_HEADER}\r\n"));
        head.push_str("Connection: close\r\n");
        for (key, value) in &self.headers {
            head.push_str(&format!("{key}: {value}\r\n"));
        }
        head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

        writer.write_all(head.as_bytes())?;
        writer.write_all(body)?;
        writer.flush()?;
        Ok(body.len() as u64)
    }
}

/// Top-level function to handle a client connection.
pub fn handle_client(
    mut stream: TcpStream,
    router: &Router,
    max_body_size: u64,
    stats: Option<&ServerStats>,
) {
    let log_prefix = match stream.peer_addr() {
        Ok(addr) => format!("[{addr}]"),
        Err(_) => "[unknown]".to_string(),
    };

    let request = match Request::from_stream(&mut stream, max_body_size) {
        Ok(req) => req,
        Err(e) => {
            warn!("{log_prefix} Failed to parse request: {e}");
            send_error_response(&mut stream, e, &log_prefix);
            if let Some(stats) = stats {
                stats.record_request(false, 0);
            }
            return;
        }
    };

    match router.route(&request) {
        Ok(response) => match send_response(&mut stream, response, &log_prefix) {
            Ok(body_bytes) => {
                if let Some(stats) = stats {
                    stats.record_request(true, body_bytes);
                }
            }
            Err(e) => {
                error!("{log_prefix} Failed to send response: {e}");
                if let Some(stats) = stats {
                    stats.record_request(false, 0);
                }
            }
        },
        Err(e) => {
            warn!(
                "{log_prefix} Error processing {} {}: {e}",
                request.method,
                request.path()
            );
            send_error_response(&mut stream, e, &log_prefix);
            if let Some(stats) = stats {
                stats.record_request(false, 0);
            }
        }
    }
}

/// Sends a fully formed `Response` to the client.
fn send_response(
    stream: &mut TcpStream,
    response: Response,
    log_prefix: &str,
) -> Result<u64, std::io::Error> {
    info!(
        "{} {} {}",
        log_prefix, response.status_code, response.status_text
    );
    response.write_to(stream)
}

/// Sends the error page matching `error`.
fn send_error_response(stream: &mut TcpStream, error: AppError, log_prefix: &str) {
    let response = Response::from_error(&error);
    info!(
        "{log_prefix} {} {}",
        response.status_code, response.status_text
    );
    if let Err(e) = response.write_to(stream) {
        error!("{log_prefix} Failed to send error response: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MAX: u64 = 1024;

    fn parse(raw: &[u8]) -> Result<Request, AppError> {
        Request::from_reader(&mut Cursor::new(raw.to_vec()), MAX)
    }

    #[test]
    fn test_parse_get_with_query() {
        let req = parse(b"GET /search?query=bob HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query(), Some("query=bob"));
        assert_eq!(req.header("HOST"), Some("x"));
        assert!(req.body.is_none());
        assert!(req.body().is_empty());
    }

    #[test]
    fn test_parse_post_body() {
        let req = parse(b"POST /delete HTTP/1.1\r\nContent-Length: 4\r\n\r\nid=0").unwrap();
        assert_eq!(req.path(), "/delete");
        assert_eq!(req.query(), None);
        assert_eq!(req.body(), b"id=0");
    }

    #[test]
    fn test_body_too_large() {
        let raw = format!("POST /add HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX + 1);
        assert!(matches!(
            parse(raw.as_bytes()),
            Err(AppError::PayloadTooLarge(MAX))
        ));
    }

    #[test]
    fn test_truncated_body_is_bad_request() {
        let result = parse(b"POST /add HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        assert!(matches!(result, Err(AppError::BadRequest)));
    }

    #[test]
    fn test_chunked_rejected() {
        let result = parse(b"POST /add HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");
        assert!(matches!(result, Err(AppError::BadRequest)));
    }

    #[test]
    fn test_malformed_request_line() {
        assert!(matches!(parse(b"GET /\r\n\r\n"), Err(AppError::BadRequest)));
        assert!(matches!(parse(b"GET / SPDY/3\r\n\r\n"), Err(AppError::BadRequest)));
        assert!(matches!(parse(b""), Err(AppError::BadRequest)));
    }

    #[test]
    fn test_lf_only_headers() {
        let req = parse(b"POST /delete HTTP/1.1\nContent-Length: 4\n\nid=1").unwrap();
        assert_eq!(req.body(), b"id=1");
    }

    #[test]
    fn test_lf_only_headers_with_multipart_body() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nx\r\n--b--";
        let mut raw = format!(
            "POST /add HTTP/1.1\nContent-Type: multipart/form-data; boundary=b\nContent-Length: {}\n\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(body);

        let req = parse(&raw).unwrap();
        assert_eq!(req.header("content-type"), Some("multipart/form-data; boundary=b"));
        assert_eq!(req.body(), body);
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let req = parse(b"GET / HTTP/1.1\r\nAccept: a\r\nAccept: b\r\n\r\n").unwrap();
        assert_eq!(req.header("accept"), Some("a, b"));
    }

    #[test]
    fn test_write_response() {
        let response = Response::redirect("/?message=ok");
        let mut out = Vec::new();
        let sent = response.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(sent, 0);
        assert!(text.starts_with("HTTP/1.1 302 Found\r\n"));
        assert!(text.contains("Location: /?message=ok\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains(&format!("Server: {SERVER_HEADER}\r\n")));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn test_error_response_status() {
        let response = Response::from_error(&AppError::contact_not_found(9));
        assert_eq!(response.status_code, 404);
        let body = String::from_utf8_lossy(response.body_bytes()).into_owned();
        assert!(body.contains("404"));
    }
}
