//! Response body decoding per `Content-Encoding`.
//!
//! The transport never decompresses on its own: the browser identity
//! advertises `gzip, deflate, br`, so the client decodes explicitly.

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::io::Read;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported content encoding: {0}")]
    Unsupported(String),

    #[error("failed to decode {encoding} body: {source}")]
    Corrupt {
        encoding: String,
        #[source]
        source: std::io::Error,
    },
}

/// Decode `body` according to a `Content-Encoding` header value.
///
/// Stacked encodings (`gzip, br`) were applied left to right, so they are
/// undone right to left. A missing header or `identity` returns the body as is.
pub fn decode_body(content_encoding: Option<&str>, body: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
    let Some(header) = content_encoding else {
        return Ok(body);
    };

    let encodings: Vec<String> = header
        .split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let mut data = body;
    for encoding in encodings.iter().rev() {
        data = decode_one(encoding, data)?;
    }
    Ok(data)
}

fn decode_one(encoding: &str, data: Vec<u8>) -> Result<Vec<u8>, DecodeError> {
    let corrupt = |source: std::io::Error| DecodeError::Corrupt {
        encoding: encoding.to_string(),
        source,
    };

    match encoding {
        "identity" => Ok(data),
        "gzip" | "x-gzip" => read_all(GzDecoder::new(&data[..])).map_err(corrupt),
        "deflate" => {
            // Servers disagree on whether "deflate" means zlib-wrapped or raw
            match read_all(ZlibDecoder::new(&data[..])) {
                Ok(decoded) => Ok(decoded),
                Err(_) => read_all(DeflateDecoder::new(&data[..])).map_err(corrupt),
            }
        }
        "br" => read_all(brotli::Decompressor::new(&data[..], 4096)).map_err(corrupt),
        other => Err(DecodeError::Unsupported(other.to_string())),
    }
}

fn read_all(mut reader: impl Read) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}
