//! Chunked upload and streamed download of file contents.
//!
//! Uploads PUT fixed-size chunks to `{path}?filepos=N`. Downloads GET with
//! `download=1` and stream the body to disk. Both bypass the JSON path.

use std::path::Path;

use futures::StreamExt;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::info;

use crate::client::{Client, Query};
use crate::constants::UPLOAD_CHUNK_SIZE;
use crate::error::{Error, Result};

/// Called after every chunk with `(bytes sent, total bytes)`.
pub type Progress<'a> = &'a mut (dyn FnMut(u64, u64) + Send);

/// Upload `total` bytes from `reader` to `path` in 256 KiB chunks.
pub async fn upload_chunks<R>(
    client: &Client,
    path: &str,
    reader: &mut R,
    total: u64,
    mut progress: Option<Progress<'_>>,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    info!(path, total, "uploading file contents");
    let mut sent: u64 = 0;
    let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];

    loop {
        let len = read_full(reader, &mut buf).await?;
        if len == 0 {
            break;
        }
        let query = [("filepos".to_owned(), sent.to_string())];
        client.put_bytes(path, &query, buf[..len].to_vec()).await?;
        sent += len as u64;

        if let Some(callback) = progress.as_mut() {
            callback(sent, total);
        }
    }

    info!(path, sent, "upload complete");
    Ok(sent)
}

/// Fill `buf` as far as the reader allows; a short count means end of input.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Stream a raw GET of `path` into `destination`.
///
/// Refuses to replace an existing file unless `overwrite` is set. A partial
/// file is removed when the transfer fails.
pub async fn download_to(
    client: &Client,
    path: &str,
    query: &Query,
    destination: &Path,
    overwrite: bool,
) -> Result<u64> {
    if !overwrite && fs::try_exists(destination).await? {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", destination.display()),
        )));
    }

    let response = client.get_raw(path, query).await?;
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .await?;

    info!(path, destination = %destination.display(), "downloading file contents");
    match write_body(response, &mut file).await {
        Ok(written) => {
            info!(path, written, "download complete");
            Ok(written)
        }
        Err(e) => {
            drop(file);
            let _ = fs::remove_file(destination).await;
            Err(e)
        }
    }
}

async fn write_body(response: reqwest::Response, file: &mut File) -> Result<u64> {
    let mut written: u64 = 0;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Read a raw GET of `path` fully into memory.
pub async fn download_bytes(client: &Client, path: &str, query: &Query) -> Result<Vec<u8>> {
    let response = client.get_raw(path, query).await?;
    let mut out = Vec::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}
