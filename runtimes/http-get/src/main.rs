//! HTTP GET runtime: fetches a URL over plain HTTP/1.0 through the host's
//! network bridge.
//!
//! Input (stdin, JSON):
//! - `host` (string, required): Host name, also sent as the `Host` header
//! - `port` (number, optional): Defaults to 80
//! - `path` (string, optional): Defaults to "/"
//!
//! Output (stdout, JSON): status line, resolved addresses, and the body.
//!
//! The host must allow network `tcp` and address `<host>:<port>`.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use wape_guest::{Dialer, Host, NetResult, PollOptions, Resolver};

#[derive(Debug, Deserialize)]
struct Request {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_path")]
    path: String,
}

fn default_port() -> u16 {
    80
}

fn default_path() -> String {
    "/".into()
}

#[derive(Debug, Serialize)]
struct Response {
    status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    addresses: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Response {
    fn error(message: String) -> Self {
        Self {
            status: "error".into(),
            addresses: Vec::new(),
            status_line: None,
            body: None,
            error: Some(message),
        }
    }
}

fn build_request(req: &Request) -> String {
    format!(
        "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
        req.path, req.host
    )
}

/// Split a raw response into its status line and body.
fn split_response(raw: &[u8]) -> (Option<String>, String) {
    let text = String::from_utf8_lossy(raw);
    let status_line = text.lines().next().map(str::to_string);
    let body = match text.find("\r\n\r\n") {
        Some(at) => text[at + 4..].to_string(),
        None => String::new(),
    };
    (status_line, body)
}

#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
fn fetch<H: Host + Clone>(host: H, req: &Request) -> NetResult<Response> {
    let addresses = Resolver::new(host.clone())
        .lookup_host(&req.host)?
        .iter()
        .map(ToString::to_string)
        .collect();

    let dialer = Dialer::new(host).with_poll_options(PollOptions::default());
    let mut conn = dialer.dial("tcp", &format!("{}:{}", req.host, req.port))?;
    conn.send(build_request(req).as_bytes())?;

    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match conn.recv(&mut buf)? {
            0 => break,
            n => raw.extend_from_slice(&buf[..n]),
        }
    }
    conn.close()?;

    let (status_line, body) = split_response(&raw);
    Ok(Response {
        status: "ok".into(),
        addresses,
        status_line,
        body: Some(body),
        error: None,
    })
}

#[cfg(target_arch = "wasm32")]
fn run(req: &Request) -> Response {
    fetch(wape_guest::WasmHost, req).unwrap_or_else(|e| Response::error(e.to_string()))
}

#[cfg(not(target_arch = "wasm32"))]
fn run(_req: &Request) -> Response {
    Response::error("this runtime must be built for wasm32-wasip1".into())
}

fn main() {
    let mut input = String::new();
    let response = match std::io::stdin().read_to_string(&mut input) {
        Err(e) => Response::error(format!("Failed to read stdin: {e}")),
        Ok(_) => match serde_json::from_str::<Request>(&input) {
            Ok(req) => run(&req),
            Err(e) => Response::error(format!("Invalid input JSON: {e}")),
        },
    };

    let failed = response.error.is_some();
    let json = serde_json::to_string(&response).unwrap_or_else(|_| "{}".into());
    let _ = std::io::stdout().write_all(json.as_bytes());
    if failed {
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req: Request = serde_json::from_str(r#"{"host":"example.com"}"#).unwrap();
        assert_eq!(req.port, 80);
        assert_eq!(req.path, "/");
        assert_eq!(
            build_request(&req),
            "GET / HTTP/1.0\r\nHost: example.com\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_request_missing_host() {
        assert!(serde_json::from_str::<Request>(r#"{"path":"/"}"#).is_err());
    }

    #[test]
    fn test_split_response() {
        let (status, body) = split_response(b"HTTP/1.0 200 OK\r\nContent-Length: 2\r\n\r\nok");
        assert_eq!(status.as_deref(), Some("HTTP/1.0 200 OK"));
        assert_eq!(body, "ok");
    }

    #[test]
    fn test_split_truncated_response() {
        let (status, body) = split_response(b"HTTP/1.0 500");
        assert_eq!(status.as_deref(), Some("HTTP/1.0 500"));
        assert!(body.is_empty());
    }

    #[test]
    fn test_error_response_serialization() {
        let json = serde_json::to_value(Response::error("boom".into())).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
        assert!(json.get("body").is_none());
    }
}
