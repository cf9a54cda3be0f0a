//! Token-gated file serving.
//!
//! # Pipeline
//!
//! 1. Look the token up in the store
//! 2. Reject it once `expires_at` has passed
//! 3. Resolve the file reference to a path confined to its storage root
//! 4. Open the file and sniff its content type from the leading bytes
//! 5. Hand back a [`FileResponse`] that streams the body
//!
//! Store and filesystem failures never reach the client verbatim; they are
//! logged here and rendered as a generic 500 by [`AppError`].

use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_stream::{Stream, StreamExt};
use tokio_util::io::ReaderStream;

use crate::config::Config;
use crate::error::AppError;
use crate::services::storage_roots::{ResolveError, StorageRoots};
use crate::store::{TokenStore, with_timeout};

/// Bytes inspected to determine the content type.
const SNIFF_LEN: usize = 8192;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";
const EMPTY: &str = "application/x-empty";
const SVG: &str = "image/svg+xml";

/// An opened file ready to be streamed to the client.
#[derive(Debug)]
pub struct FileResponse {
    pub token: String,
    pub file: File,
    pub filename: String,
    pub content_type: String,
    pub content_length: u64,
    pub cache_max_age: u64,

    /// Deadline for each chunk read while streaming the body.
    pub read_timeout: Duration,
}

/// Serves files for valid, unexpired tokens.
pub struct FileGateway {
    store: Arc<dyn TokenStore>,
    roots: StorageRoots,
    store_timeout: Duration,
    fs_timeout: Duration,
    cache_max_age: u64,
}

impl FileGateway {
    pub fn new(store: Arc<dyn TokenStore>, config: &Config) -> Self {
        Self {
            store,
            roots: StorageRoots::from_config(config),
            store_timeout: config.store_timeout(),
            fs_timeout: config.fs_timeout(),
            cache_max_age: config.cache_max_age_secs,
        }
    }

    /// Resolve a token to its file and prepare the streamed response.
    ///
    /// # Errors
    ///
    /// - `TokenNotFound`: no record for the token
    /// - `TokenExpired`: the record's TTL has elapsed
    /// - `FileNotFound`: the reference does not resolve to a regular file inside its root
    /// - `Store` / `Io`: infrastructure failure, logged with the token
    pub async fn resolve_and_stream(&self, token: &str) -> Result<FileResponse, AppError> {
        let result = self.serve(token).await;

        if let Err(ref err) = result {
            if err.is_internal() {
                tracing::error!(token, error = %err, "Error serving file for token");
            }
        }

        result
    }

    async fn serve(&self, token: &str) -> Result<FileResponse, AppError> {
        let record = with_timeout(self.store_timeout, self.store.find_by_token(token))
            .await?
            .ok_or_else(|| {
                tracing::warn!(token, "Token not found");
                AppError::TokenNotFound
            })?;

        if record.is_expired_at(Utc::now()) {
            tracing::warn!(token, expires_at = %record.expires_at, "Token expired");
            return Err(AppError::TokenExpired);
        }

        let resolved = self
            .roots
            .resolve(&record.file_reference)
            .map_err(|e| file_not_found(token, Path::new(&record.file_reference), &e))?;

        let path = match self.within(self.roots.confine(&resolved)).await? {
            Ok(path) => path,
            Err(ResolveError::Io(e)) if e.kind() != io::ErrorKind::NotFound => {
                return Err(AppError::Io(e));
            }
            Err(e) => return Err(file_not_found(token, &resolved.path, &e)),
        };

        let mut file = match self.within(File::open(&path)).await? {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(file_not_found(token, &path, &e));
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        let metadata = self.within(file.metadata()).await??;
        if !metadata.is_file() {
            return Err(file_not_found(token, &path, &"not a regular file"));
        }

        let mut head = vec![0u8; SNIFF_LEN];
        let read = self.within(read_head(&mut file, &mut head)).await??;
        head.truncate(read);
        self.within(file.seek(SeekFrom::Start(0))).await??;

        let filename = resolved
            .file_name()
            .ok_or_else(|| file_not_found(token, &path, &"reference has no file name"))?;

        tracing::debug!(token, path = %path.display(), size = metadata.len(), "Serving file");

        Ok(FileResponse {
            token: token.to_string(),
            file,
            filename,
            content_type: sniff_content_type(&head).to_string(),
            content_length: metadata.len(),
            cache_max_age: self.cache_max_age,
            read_timeout: self.fs_timeout,
        })
    }

    /// Run a filesystem call under the configured deadline.
    async fn within<T>(&self, call: impl Future<Output = T>) -> Result<T, AppError> {
        tokio::time::timeout(self.fs_timeout, call)
            .await
            .map_err(|_| {
                AppError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("filesystem call exceeded {:?}", self.fs_timeout),
                ))
            })
    }
}

fn file_not_found(token: &str, path: &Path, reason: &dyn std::fmt::Display) -> AppError {
    tracing::warn!(token, path = %path.display(), reason = %reason, "File not found");
    AppError::FileNotFound
}

/// Fill `buf` from the start of the file, stopping early at end of file.
async fn read_head(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Determine a MIME type from file content, ignoring the file name.
pub fn sniff_content_type(head: &[u8]) -> &'static str {
    if head.is_empty() {
        return EMPTY;
    }
    if let Some(kind) = infer::get(head) {
        return match kind.mime_type() {
            "text/xml" | "application/xml" | "text/html" if has_svg_root(head) => SVG,
            mime => mime,
        };
    }
    if head.contains(&0) {
        return OCTET_STREAM;
    }
    if has_svg_root(head) {
        return SVG;
    }
    match std::str::from_utf8(head) {
        Ok(_) => TEXT_PLAIN,
        // A multi-byte character cut off at the sniff boundary is still text
        Err(e) if e.error_len().is_none() => TEXT_PLAIN,
        Err(_) => OCTET_STREAM,
    }
}

/// Whether the first element after any XML prolog, comments and doctype is `<svg>`.
fn has_svg_root(head: &[u8]) -> bool {
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(e) => match std::str::from_utf8(&head[..e.valid_up_to()]) {
            Ok(text) => text,
            Err(_) => return false,
        },
    };
    let mut rest = text.trim_start_matches('\u{feff}');

    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("<?") {
            match after.find("?>") {
                Some(end) => rest = &after[end + 2..],
                None => return false,
            }
        } else if let Some(after) = rest.strip_prefix("<!--") {
            match after.find("-->") {
                Some(end) => rest = &after[end + 3..],
                None => return false,
            }
        } else if rest
            .get(..9)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("<!doctype"))
        {
            let after = &rest[9..];
            let close = match (after.find('['), after.find('>')) {
                // Internal subset: skip to `]` before looking for `>`
                (Some(open), Some(gt)) if open < gt => after[open..]
                    .find(']')
                    .map(|bracket| open + bracket)
                    .and_then(|bracket| after[bracket..].find('>').map(|gt| bracket + gt)),
                (_, gt) => gt,
            };
            match close {
                Some(end) => rest = &after[end + 1..],
                None => return false,
            }
        } else {
            break;
        }
    }

    let element = rest
        .strip_prefix("<svg:svg")
        .or_else(|| rest.strip_prefix("<svg"));
    matches!(
        element.and_then(|tail| tail.chars().next()),
        Some(c) if c.is_whitespace() || c == '>' || c == '/'
    )
}

/// Stream a reader in chunks, failing with `TimedOut` when one chunk takes longer than `limit`.
fn timed_body_stream<R>(
    reader: R,
    limit: Duration,
    token: String,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    R: AsyncRead + Send + 'static,
{
    ReaderStream::new(reader)
        .timeout(limit)
        .map(move |chunk| {
            chunk.unwrap_or_else(|_| {
                tracing::error!(
                    token = %token,
                    timeout = ?limit,
                    "File read timed out while streaming"
                );
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("file read exceeded {limit:?}"),
                ))
            })
        })
}

/// `inline; filename="<name>"`, plus an RFC 5987 `filename*` when the name is not plain ASCII.
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    if ascii == filename {
        format!("inline; filename=\"{ascii}\"")
    } else {
        format!(
            "inline; filename=\"{ascii}\"; filename*=UTF-8''{}",
            urlencoding::encode(filename)
        )
    }
}

impl IntoResponse for FileResponse {
    fn into_response(self) -> Response {
        let built = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, self.content_type)
            .header(header::CONTENT_DISPOSITION, content_disposition(&self.filename))
            .header(header::CONTENT_LENGTH, self.content_length)
            .header(
                header::CACHE_CONTROL,
                format!("public, max-age={}", self.cache_max_age),
            )
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from_stream(timed_body_stream(
                self.file,
                self.read_timeout,
                self.token,
            )));

        match built {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    filename = %self.filename,
                    error = %e,
                    "Failed to build file response"
                );
                AppError::Internal(e.to_string()).into_response()
            }
        }
    }
}
