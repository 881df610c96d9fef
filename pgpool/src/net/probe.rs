//! Minimal connect + single-query PostgreSQL client, scoped to
//! health-check (§4.F) and primary-discovery (§4.G) probing.

use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection timed out")]
    Timeout,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server reported an error: {0}")]
    Backend(String),
    #[error("unsupported authentication method: {0}")]
    UnsupportedAuth(i32),
    #[error("connection closed before ReadyForQuery")]
    UnexpectedEof,
}

/// A short-lived connection used only to run one query and disconnect.
/// Neither pooled nor reused: every health-check and primary-discovery
/// attempt opens a fresh `Probe` (§4.F step 2 "Attempt a ... connection";
/// §4.G "open a short-lived database connection").
pub struct Probe {
    stream: TcpStream,
}

impl Probe {
    /// Connects and completes startup + authentication against
    /// `database`. `password` is used for both cleartext and MD5 auth
    /// requests; if the server doesn't ask for a password, it's ignored.
    pub async fn connect(
        host: &str,
        port: u16,
        user: &str,
        password: Option<&str>,
        database: &str,
        connect_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProbeError::Timeout)??;

        let mut probe = Self { stream };
        probe.startup(user, database).await?;
        probe.authenticate(user, password).await?;
        probe.drain_until_ready().await?;

        Ok(probe)
    }

    async fn startup(&mut self, user: &str, database: &str) -> Result<(), ProbeError> {
        let mut body = BytesMut::new();
        body.put_i32(196608); // protocol version 3.0
        put_cstr_pair(&mut body, "user", user);
        put_cstr_pair(&mut body, "database", database);
        body.put_u8(0);

        let mut message = BytesMut::new();
        message.put_i32(body.len() as i32 + 4);
        message.extend_from_slice(&body);

        self.stream.write_all(&message).await?;
        Ok(())
    }

    async fn authenticate(&mut self, user: &str, password: Option<&str>) -> Result<(), ProbeError> {
        loop {
            let (tag, mut body) = self.read_message().await?;
            match tag {
                b'E' => return Err(ProbeError::Backend(parse_error(&body))),
                b'R' => {
                    let auth_type = body.get_i32();
                    match auth_type {
                        0 => return Ok(()), // AuthenticationOk
                        3 => {
                            // cleartext password
                            let password = password.unwrap_or_default();
                            self.send_password(password).await?;
                        }
                        5 => {
                            let mut salt = [0u8; 4];
                            body.copy_to_slice(&mut salt);
                            let password = password.unwrap_or_default();
                            let hashed = md5_password(user, password, &salt);
                            self.send_password(&hashed).await?;
                        }
                        other => return Err(ProbeError::UnsupportedAuth(other)),
                    }
                }
                _ => continue, // ignore ParameterStatus/BackendKeyData interleaved before auth completes
            }
        }
    }

    async fn send_password(&mut self, password: &str) -> Result<(), ProbeError> {
        let mut body = BytesMut::new();
        body.put_slice(password.as_bytes());
        body.put_u8(0);

        let mut message = BytesMut::new();
        message.put_u8(b'p');
        message.put_i32(body.len() as i32 + 4);
        message.extend_from_slice(&body);

        self.stream.write_all(&message).await?;
        Ok(())
    }

    /// Reads messages until `ReadyForQuery`, discarding
    /// ParameterStatus/BackendKeyData/NoticeResponse along the way.
    async fn drain_until_ready(&mut self) -> Result<(), ProbeError> {
        loop {
            let (tag, body) = self.read_message().await?;
            match tag {
                b'Z' => return Ok(()),
                b'E' => return Err(ProbeError::Backend(parse_error(&body))),
                _ => continue,
            }
        }
    }

    /// Runs a simple query and returns the first column of the first
    /// returned row, if any (sufficient for `SELECT pg_is_in_recovery()`
    /// and a bare connectivity probe).
    pub async fn simple_query(&mut self, query: &str) -> Result<Option<String>, ProbeError> {
        let mut body = BytesMut::new();
        body.put_slice(query.as_bytes());
        body.put_u8(0);

        let mut message = BytesMut::new();
        message.put_u8(b'Q');
        message.put_i32(body.len() as i32 + 4);
        message.extend_from_slice(&body);
        self.stream.write_all(&message).await?;

        let mut first_column: Option<String> = None;

        loop {
            let (tag, mut body) = self.read_message().await?;
            match tag {
                b'D' => {
                    // DataRow: i16 column count, then per column i32 len + bytes.
                    let columns = body.get_i16();
                    if columns > 0 && first_column.is_none() {
                        let len = body.get_i32();
                        if len >= 0 {
                            let mut buf = vec![0u8; len as usize];
                            body.copy_to_slice(&mut buf);
                            first_column = Some(String::from_utf8_lossy(&buf).into_owned());
                        }
                    }
                }
                b'C' | b'T' | b'I' => continue, // CommandComplete / RowDescription / EmptyQueryResponse
                b'E' => return Err(ProbeError::Backend(parse_error(&body))),
                b'Z' => return Ok(first_column),
                _ => continue,
            }
        }
    }

    async fn read_message(&mut self) -> Result<(u8, BytesMut), ProbeError> {
        let mut header = [0u8; 5];
        self.stream
            .read_exact(&mut header)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    ProbeError::UnexpectedEof
                } else {
                    ProbeError::Io(e)
                }
            })?;

        let tag = header[0];
        let len = i32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let body_len = len.saturating_sub(4);

        let mut body = BytesMut::zeroed(body_len);
        if body_len > 0 {
            self.stream.read_exact(&mut body).await?;
        }

        Ok((tag, body))
    }
}

fn put_cstr_pair(buf: &mut BytesMut, key: &str, value: &str) {
    buf.put_slice(key.as_bytes());
    buf.put_u8(0);
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
}

fn parse_error(body: &BytesMut) -> String {
    // ErrorResponse: sequence of (u8 field-code, cstr) pairs terminated by 0.
    let mut message = String::new();
    let mut i = 0;
    while i < body.len() && body[i] != 0 {
        let code = body[i];
        i += 1;
        let start = i;
        while i < body.len() && body[i] != 0 {
            i += 1;
        }
        let value = String::from_utf8_lossy(&body[start..i]);
        if code == b'M' {
            message = value.into_owned();
        }
        i += 1; // skip the field's terminating nul
    }
    if message.is_empty() {
        "unknown server error".into()
    } else {
        message
    }
}

/// PostgreSQL MD5 auth: `"md5" + hex(md5(hex(md5(password + user)) + salt))`.
fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = md5::compute(format!("{password}{user}"));
    let inner_hex = format!("{inner:x}");

    let mut outer_input = Vec::with_capacity(inner_hex.len() + 4);
    outer_input.extend_from_slice(inner_hex.as_bytes());
    outer_input.extend_from_slice(salt);
    let outer = md5::compute(outer_input);

    format!("md5{outer:x}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_md5_password_format() {
        let hashed = md5_password("postgres", "secret", &[1, 2, 3, 4]);
        assert!(hashed.starts_with("md5"));
        assert_eq!(hashed.len(), 3 + 32);
    }

    #[test]
    fn test_parse_error_extracts_message() {
        let mut body = BytesMut::new();
        body.put_u8(b'S');
        body.put_slice(b"ERROR");
        body.put_u8(0);
        body.put_u8(b'M');
        body.put_slice(b"relation does not exist");
        body.put_u8(0);
        body.put_u8(0);

        assert_eq!(parse_error(&body), "relation does not exist");
    }
}
