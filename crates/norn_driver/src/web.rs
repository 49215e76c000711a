//! Minimal HTTP/1.1 front end: `GET /eval/<expression>`
//!
//! Each connection carries one request and is closed after the response.

use std::io;
use std::net::SocketAddr;

use norn_list::SharedEnvironment;
use percent_encoding::percent_decode_str;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::console::join_recipients;

pub const DEFAULT_PORT: u16 = 5021;

const EVAL_PREFIX: &str = "/eval/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn html(status: u16, body: String) -> Self {
        Self { status, content_type: "text/html; charset=utf-8", body }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self { status, content_type: "text/plain; charset=utf-8", body: body.into() }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.reason(),
            self.content_type,
            self.body.len()
        )
        .into_bytes();
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}

/// Answer one request. `target` is the raw request target from the request line.
pub fn respond(method: &str, target: &str, env: &SharedEnvironment) -> Response {
    if method != "GET" {
        return Response::text(405, format!("method not allowed: {}", method));
    }

    let path = target.split_once('?').map_or(target, |(path, _)| path);
    let Some(encoded) = path.strip_prefix(EVAL_PREFIX) else {
        return Response::text(404, format!("not found: {}", path));
    };
    let expression = match percent_decode_str(encoded).decode_utf8() {
        Ok(text) => text.into_owned(),
        Err(_) => return Response::text(400, "expression is not valid UTF-8"),
    };

    match env.evaluate(&expression) {
        Ok(result) if result.recipients.is_empty() => {
            Response::text(404, format!("the resulting list name is empty: {}", expression))
        }
        Ok(result) => {
            let joined = join_recipients(&result.recipients, ",");
            Response::html(
                200,
                format!("<a href=\"mailto:{}\">email these recipients</a><br>{}", joined, joined),
            )
        }
        Err(e) => Response::text(400, e.to_string()),
    }
}

pub struct WebServer {
    listener: TcpListener,
    env: SharedEnvironment,
}

impl WebServer {
    pub async fn bind(addr: SocketAddr, env: SharedEnvironment) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, env })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped.
    pub async fn serve(self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "web server listening");
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let env = self.env.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, env).await {
                    warn!(%peer, error = %e, "connection failed");
                }
            });
        }
    }
}

async fn handle_connection(stream: TcpStream, env: SharedEnvironment) -> io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Ok(());
    }
    // Headers are read and ignored
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 || header.trim_end().is_empty() {
            break;
        }
    }

    let mut parts = request_line.split_whitespace();
    let response = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => {
            let response = respond(method, target, &env);
            debug!(method, target, status = response.status, "handled request");
            response
        }
        _ => Response::text(400, "malformed request line"),
    };

    let mut stream = reader.into_inner();
    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await
}
