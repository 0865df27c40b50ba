//! Loopback HTTP responder for provider tests.
//!
//! Serves one canned response per accepted connection, in order, and records each request.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>, // lowercased names
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockResponse {
    status: u16,
    content_type: &'static str,
    parts: Vec<Vec<u8>>,
    part_delay: Duration,
    missing_bytes: usize, // Advertised in Content-Length but never sent
}

impl MockResponse {
    pub fn ok(content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self { status: 200, content_type, parts: vec![body.into()], part_delay: Duration::ZERO, missing_bytes: 0 }
    }

    /// Chunked transfer encoding, one HTTP chunk per part.
    pub fn chunked(content_type: &'static str, parts: Vec<Vec<u8>>) -> Self {
        Self { status: 200, content_type, parts, part_delay: Duration::from_millis(5), missing_bytes: 0 }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self { status, content_type: "application/json", parts: vec![body.as_bytes().to_vec()], part_delay: Duration::ZERO, missing_bytes: 0 }
    }

    /// Error status whose body is cut off before its advertised length.
    pub fn truncated(status: u16, body: &str) -> Self {
        Self { missing_bytes: 64, ..Self::status(status, body) }
    }
}

pub(crate) struct MockServer {
    pub base_url: String,
    requests: Receiver<RecordedRequest>,
}

impl MockServer {
    pub fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for response in responses {
                let Ok((mut socket, _)) = listener.accept() else {
                    return;
                };
                let request = read_request(&mut socket);
                let _ = tx.send(request);
                write_response(&mut socket, &response);
            }
        });

        Self { base_url, requests: rx }
    }

    /// Next recorded request, waiting briefly for the server thread.
    pub fn request(&self) -> RecordedRequest {
        self.requests.recv_timeout(Duration::from_secs(5)).unwrap()
    }
}

/// Base URL of a port that refuses connections.
pub(crate) fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn read_request(socket: &mut TcpStream) -> RecordedRequest {
    let mut reader = BufReader::new(socket.try_clone().unwrap());

    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let length = headers.get("content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).unwrap();

    RecordedRequest { method, path, headers, body }
}

fn write_response(socket: &mut TcpStream, response: &MockResponse) {
    let reason = match response.status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        _ => "Status",
    };

    let mut head = format!("HTTP/1.1 {} {}\r\nContent-Type: {}\r\nConnection: close\r\n", response.status, reason, response.content_type);

    if response.parts.len() == 1 {
        head.push_str(&format!("Content-Length: {}\r\n\r\n", response.parts[0].len() + response.missing_bytes));
        let _ = socket.write_all(head.as_bytes());
        let _ = socket.write_all(&response.parts[0]);
    } else {
        head.push_str("Transfer-Encoding: chunked\r\n\r\n");
        let _ = socket.write_all(head.as_bytes());
        for part in &response.parts {
            let _ = socket.write_all(format!("{:x}\r\n", part.len()).as_bytes());
            let _ = socket.write_all(part);
            let _ = socket.write_all(b"\r\n");
            let _ = socket.flush();
            thread::sleep(response.part_delay);
        }
        let _ = socket.write_all(b"0\r\n\r\n");
    }
    let _ = socket.flush();
}
