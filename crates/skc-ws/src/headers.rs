use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::WsError;

/// Longest request or header line accepted, including the line terminator.
pub const MAX_LINE: usize = 4096;

/// Request headers as an ordered multi-map.
///
/// Keys keep the spelling of their first occurrence and the order in which they were first seen.
/// Repeated keys accumulate values. Lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, values)| values.as_slice())
    }

    /// The first value recorded for `key`.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)?.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, values)| (k.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse one `Key: value` line (terminator already stripped) into the map.
    pub fn push_line(&mut self, line: &str) -> Result<(), WsError> {
        let (key, value) = line
            .split_once(':')
            .filter(|(key, _)| !key.is_empty() && !key.contains(char::is_whitespace))
            .ok_or_else(|| WsError::MalformedHeader(line.to_string()))?;
        self.append(key, value.trim());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Headers,
}

impl Request {
    pub fn is_get(&self, path: &str) -> bool {
        self.method == "GET" && self.path == path
    }
}

/// Read the request line and headers up to and including the blank line.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, WsError>
where
    R: AsyncBufRead + Unpin,
{
    let head = read_line(reader).await?;
    let mut parts = head.split(' ');
    let (Some(method), Some(path), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(WsError::MalformedRequestLine(head.clone()));
    };
    if method.is_empty() || !path.starts_with('/') {
        return Err(WsError::MalformedRequestLine(head.clone()));
    }
    let (method, path, version) = (method.to_string(), path.to_string(), version.to_string());

    let mut headers = Headers::new();
    loop {
        let line = read_line(reader).await?;
        if line.is_empty() {
            break;
        }
        headers.push_line(&line)?;
    }

    Ok(Request {
        method,
        path,
        version,
        headers,
    })
}

/// One line without its `\n` / `\r\n` terminator.
async fn read_line<R>(reader: &mut R) -> Result<String, WsError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE as u64)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Err(WsError::Closed);
    }
    if buf.last() != Some(&b'\n') {
        if n >= MAX_LINE {
            return Err(WsError::LineTooLong { limit: MAX_LINE });
        }
        return Err(WsError::Closed);
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf)
        .map_err(|err| WsError::MalformedHeader(String::from_utf8_lossy(err.as_bytes()).into_owned()))
}
