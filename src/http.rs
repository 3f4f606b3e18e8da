use std::io;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error};

use crate::booking::{BookingError, BookingService};
use crate::limits::{MAX_BODY_BYTES, MAX_HEADER_LINES, MAX_HEADER_LINE_BYTES, MAX_REQUEST_LINE_BYTES};
use crate::model::{BookingId, BookingRequest, DateRange};
use crate::observability;

// ── Request framing ──────────────────────────────────────

#[derive(Debug)]
struct Request {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    body: Vec<u8>,
    close: bool,
}

impl Request {
    fn query_date(&self, key: &str) -> Option<NaiveDate> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.parse().ok())
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

/// Read one line, erroring instead of buffering without bound.
async fn read_line_capped<R>(reader: &mut R, cap: u64) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = (&mut *reader).take(cap).read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    if n as u64 == cap && !line.ends_with('\n') {
        return Err(invalid("line too long"));
    }
    Ok(Some(line))
}

fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// Read a single request off the connection. `Ok(None)` is a clean EOF;
/// `InvalidData` errors describe a malformed or oversized request.
async fn read_request<R>(reader: &mut R) -> io::Result<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    // Tolerate stray blank lines between requests
    let request_line = loop {
        let Some(line) = read_line_capped(reader, MAX_REQUEST_LINE_BYTES).await? else {
            return Ok(None);
        };
        if !line.trim_end().is_empty() {
            break line;
        }
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(invalid("malformed request line"));
    };
    let (path, query) = match target.split_once('?') {
        Some((path, raw)) => (path.to_string(), parse_query(raw)),
        None => (target.to_string(), Vec::new()),
    };
    let method = method.to_string();

    let mut content_length = 0usize;
    let mut close = false;
    let mut header_lines = 0usize;
    loop {
        if header_lines > MAX_HEADER_LINES {
            return Err(invalid("too many headers"));
        }
        header_lines += 1;

        let Some(header) = read_line_capped(reader, MAX_HEADER_LINE_BYTES).await? else {
            return Err(invalid("unexpected end of headers"));
        };
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => {
                    content_length = value.parse().map_err(|_| invalid("bad content-length"))?;
                }
                "connection" => close = value.eq_ignore_ascii_case("close"),
                _ => {}
            }
        }
    }

    if content_length > MAX_BODY_BYTES {
        return Err(invalid("request body too large"));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    Ok(Some(Request {
        method,
        path,
        query,
        body,
        close,
    }))
}

// ── Response framing ─────────────────────────────────────

struct Response {
    status: u16,
    body: Vec<u8>,
}

impl Response {
    fn json(status: u16, value: &impl Serialize) -> Self {
        Self {
            status,
            body: serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

async fn write_response<W>(writer: &mut W, response: &Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!("HTTP/1.1 {} {}\r\n", response.status, reason(response.status));
    if !response.body.is_empty() {
        head.push_str("Content-Type: application/json\r\n");
    }
    head.push_str(&format!("Content-Length: {}\r\n\r\n", response.body.len()));
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&response.body).await?;
    writer.flush().await
}

// ── Connection loop ──────────────────────────────────────

/// Serve requests off one connection until EOF or `Connection: close`.
pub async fn process_connection(
    socket: TcpStream,
    service: Arc<BookingService>,
) -> io::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let request = match read_request(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                let response = Response::json(400, &json!({ "error": e.to_string() }));
                write_response(&mut write_half, &response).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let started = Instant::now();
        let (op, response) = dispatch(&request, &service).await;
        metrics::counter!(
            observability::REQUESTS_TOTAL,
            "op" => op,
            "status" => response.status.to_string(),
        )
        .increment(1);
        metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => op)
            .record(started.elapsed().as_secs_f64());
        debug!("{} {} -> {}", request.method, request.path, response.status);

        write_response(&mut write_half, &response).await?;
        if request.close {
            return Ok(());
        }
    }
}

// ── Routing ──────────────────────────────────────────────

async fn dispatch(request: &Request, service: &BookingService) -> (&'static str, Response) {
    let path = request.path.trim_matches('/');
    let segments: Vec<&str> = path.split('/').collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["api", "booking", "check-availability"]) => (
            "check_availability",
            check_availability(request, service).await,
        ),
        ("POST", ["api", "booking"]) => ("create", create(request, service).await),
        ("GET", ["api", "booking", id]) => ("get", get(id, service).await),
        ("PUT", ["api", "booking", id]) => ("modify", modify(id, request, service).await),
        ("DELETE", ["api", "booking", id]) => ("delete", delete(id, service).await),
        _ => ("unmatched", Response::empty(404)),
    }
}

async fn check_availability(request: &Request, service: &BookingService) -> Response {
    let (Some(start), Some(end)) = (
        request.query_date("startDate"),
        request.query_date("endDate"),
    ) else {
        return Response::json(400, &json!({ "error": "startDate and endDate are required" }));
    };
    // The probe takes the window exactly as supplied; only create and modify
    // run the rule set.
    let window = DateRange { start, end };
    match service.check_availability(&window).await {
        Ok(available) => Response::json(200, &available),
        Err(e) => failure(e),
    }
}

async fn create(request: &Request, service: &BookingService) -> Response {
    let Ok(body) = serde_json::from_slice::<BookingRequest>(&request.body) else {
        return Response::json(400, &json!({ "error": "invalid request body" }));
    };
    match service.create_booking(&body).await {
        Ok(created) => Response::json(201, &created),
        Err(e) => failure(e),
    }
}

async fn get(id: &str, service: &BookingService) -> Response {
    let Ok(id) = id.parse::<BookingId>() else {
        return Response::empty(404);
    };
    match service.get(id).await {
        Ok(Some(booking)) => Response::json(200, &booking),
        Ok(None) => Response::empty(404),
        Err(e) => failure(e),
    }
}

async fn modify(id: &str, request: &Request, service: &BookingService) -> Response {
    let Ok(id) = id.parse::<BookingId>() else {
        return Response::empty(404);
    };
    let Ok(body) = serde_json::from_slice::<BookingRequest>(&request.body) else {
        return Response::json(400, &json!({ "error": "invalid request body" }));
    };
    // Absence wins over validation: 404 before the rule set runs
    match service.get(id).await {
        Ok(None) => return Response::empty(404),
        Err(e) => return failure(e),
        Ok(Some(_)) => {}
    }
    match service.modify_booking(id, &body).await {
        Ok(modified) => Response::json(200, &modified),
        Err(e) => failure(e),
    }
}

async fn delete(id: &str, service: &BookingService) -> Response {
    let Ok(id) = id.parse::<BookingId>() else {
        return Response::empty(404);
    };
    match service.get(id).await {
        Ok(None) => return Response::empty(404),
        Err(e) => return failure(e),
        Ok(Some(_)) => {}
    }
    match service.delete_booking(id).await {
        Ok(true) => Response::empty(204),
        Ok(false) => Response::empty(400),
        Err(e) => failure(e),
    }
}

fn failure(err: BookingError) -> Response {
    match err {
        BookingError::Validation(outcome) => {
            Response::json(400, &json!({ "errors": outcome.messages() }))
        }
        BookingError::DatesNotAvailable => {
            Response::json(400, &json!({ "error": "Booking dates are not available" }))
        }
        BookingError::NotFound => Response::empty(404),
        BookingError::Storage(e) => {
            error!("storage failure: {e}");
            Response::json(500, &json!({ "error": "internal error" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &str) -> io::Result<Option<Request>> {
        let mut reader = BufReader::new(raw.as_bytes());
        read_request(&mut reader).await
    }

    #[tokio::test]
    async fn parses_request_line_and_query() {
        let request = parse(
            "GET /api/booking/check-availability?startDate=2026-03-10&endDate=2026-03-12 HTTP/1.1\r\n\
             Host: localhost\r\n\r\n",
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/api/booking/check-availability");
        assert_eq!(
            request.query_date("startDate"),
            NaiveDate::from_ymd_opt(2026, 3, 10)
        );
        assert_eq!(
            request.query_date("endDate"),
            NaiveDate::from_ymd_opt(2026, 3, 12)
        );
        assert!(request.query_date("missing").is_none());
        assert!(!request.close);
    }

    #[tokio::test]
    async fn parses_body_by_content_length() {
        let request = parse(
            "POST /api/booking HTTP/1.1\r\n\
             Content-Type: application/json\r\n\
             Content-Length: 2\r\n\
             Connection: close\r\n\r\n{}",
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.body, b"{}");
        assert!(request.close);
    }

    #[tokio::test]
    async fn eof_is_a_clean_none() {
        assert!(parse("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let result = parse(
            "POST /api/booking HTTP/1.1\r\nContent-Length: 10\r\n\r\n{}",
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let raw = format!(
            "POST /api/booking HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_BYTES + 1
        );
        let err = parse(&raw).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn garbage_request_line_is_invalid() {
        let err = parse("nonsense\r\n\r\n").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn blank_lines_before_request_are_tolerated() {
        let request = parse("\r\n\r\nGET /api/booking/7 HTTP/1.1\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.path, "/api/booking/7");
    }
}
