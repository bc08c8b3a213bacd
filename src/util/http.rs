use displaydoc::Display;
use http::{header::ToStrError, Request as HttpRequest, Response as HttpResponse};
use std::{io, result::Result as StdResult};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tungstenite::http;

#[derive(Debug, Error, Display)]
pub enum Error {
    /// IO Error: {0}
    Io(#[from] io::Error),
    /// Invalid Header Value: {0}
    ToStr(#[from] ToStrError),
    /// Invalid HTTP message: {0}
    Http(#[from] http::Error),
    /// Invalid status line {0:?}
    StatusLine(String),
    /// Invalid header line {0:?}
    HeaderLine(String),
    /// Invalid content length {0:?}
    ContentLength(String),
    /// Invalid chunk size {0:?}
    ChunkSize(String),
    /// Body exceeds {0} bytes
    BodyTooLarge(usize),
}

pub type Result<T> = StdResult<T, Error>;

/// Largest response body we are willing to buffer
pub(crate) const MAX_BODY: usize = 16 * 1024 * 1024;

// Assumes that this is a valid request
pub(crate) fn write_request<T: AsRef<[u8]>>(
    mut w: impl io::Write,
    request: &HttpRequest<T>,
) -> Result<()> {
    let target = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    write!(w, "{} {} {:?}\r\n", request.method(), target, request.version())?;

    for (k, v) in request.headers() {
        write!(w, "{}: {}\r\n", k, v.to_str()?)?;
    }

    write!(w, "\r\n")?;
    w.write_all(request.body().as_ref())?;

    Ok(())
}

/// Read one response, with a body framed by length, by chunks or by EOF
pub(crate) async fn read_response<R>(reader: &mut R) -> Result<HttpResponse<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let status = parse_status(line.trim_end())?;

    let mut builder = HttpResponse::builder().status(status);
    let mut length = None;
    let mut chunked = false;
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| Error::HeaderLine(header.to_owned()))?;
        let (name, value) = (name.trim(), value.trim());
        if name.eq_ignore_ascii_case("content-length") {
            let len = value
                .parse::<usize>()
                .ok()
                .filter(|len| *len <= MAX_BODY)
                .ok_or_else(|| Error::ContentLength(value.to_owned()))?;
            length = Some(len);
        } else if name.eq_ignore_ascii_case("transfer-encoding") {
            chunked = value.to_ascii_lowercase().contains("chunked");
        }
        builder = builder.header(name, value);
    }

    let mut body = Vec::new();
    if chunked {
        read_chunked(reader, &mut body).await?;
    } else if let Some(len) = length {
        body.resize(len, 0);
        reader.read_exact(&mut body).await?;
    } else {
        (&mut *reader)
            .take(MAX_BODY as u64 + 1)
            .read_to_end(&mut body)
            .await?;
        if body.len() > MAX_BODY {
            return Err(Error::BodyTooLarge(MAX_BODY));
        }
    }

    Ok(builder.body(body)?)
}

fn parse_status(line: &str) -> Result<u16> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse()
            .map_err(|_| Error::StatusLine(line.to_owned())),
        _ => Err(Error::StatusLine(line.to_owned())),
    }
}

async fn read_chunked<R>(reader: &mut R, out: &mut Vec<u8>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let size_line = line.trim();
        if size_line.is_empty() {
            continue;
        }
        let size_hex = size_line.split(';').next().unwrap_or(size_line);
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| Error::ChunkSize(size_line.to_owned()))?;
        if size == 0 {
            // trailers
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 || line.trim().is_empty() {
                    return Ok(());
                }
            }
        }
        let start = out.len();
        let end = start
            .checked_add(size)
            .filter(|end| *end <= MAX_BODY)
            .ok_or(Error::BodyTooLarge(MAX_BODY))?;
        out.resize(end, 0);
        reader.read_exact(&mut out[start..]).await?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await?;
    }
}
