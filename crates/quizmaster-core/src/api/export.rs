//! CSV exports.
//!
//! Export responses are raw bytes. They are read with `Response::bytes` and
//! never touch the JSON decoding path. The bytes become a transient object
//! handed to a `FileSaver`, and the object is released when the guard drops,
//! whether or not the save succeeded.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use reqwest::header::{self, HeaderValue};
use reqwest::Method;
use tracing::{debug, info, warn};

use super::interceptor::OutboundRequest;
use super::{ApiClient, ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// The signed-in user's own quiz attempts.
    UserCsv,
    /// Every user's attempts. Admin only.
    AdminCsv,
}

impl ExportKind {
    pub const fn path(&self) -> &'static str {
        match self {
            Self::UserCsv => "/export/user-csv",
            Self::AdminCsv => "/export/admin-csv",
        }
    }

    /// Used when the response carries no usable `Content-Disposition`.
    pub const fn default_filename(&self) -> &'static str {
        match self {
            Self::UserCsv => "user_quizzes.csv",
            Self::AdminCsv => "admin_all_users_quizzes.csv",
        }
    }
}

/// Handle to bytes staged by a `FileSaver`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The "save as" side channel.
pub trait FileSaver: Send + Sync {
    /// Stage `bytes` and hand back a handle to them.
    fn create_object(&self, bytes: &[u8]) -> Result<ObjectId>;

    /// Save the staged object under `filename`, returning where it landed.
    fn save_as(&self, object: &ObjectId, filename: &str) -> Result<PathBuf>;

    /// Drop the staged object. Must tolerate already-released handles.
    fn release(&self, object: &ObjectId);
}

/// Staged object released on drop.
struct TransientObject<'a> {
    saver: &'a dyn FileSaver,
    id: ObjectId,
}

impl<'a> TransientObject<'a> {
    fn create(saver: &'a dyn FileSaver, bytes: &[u8]) -> Result<Self> {
        let id = saver.create_object(bytes)?;
        Ok(Self { saver, id })
    }

    fn save_as(&self, filename: &str) -> Result<PathBuf> {
        self.saver.save_as(&self.id, filename)
    }
}

impl Drop for TransientObject<'_> {
    fn drop(&mut self) {
        self.saver.release(&self.id);
    }
}

/// Outcome of a completed export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedExport {
    pub filename: String,
    pub location: PathBuf,
    pub size: usize,
}

impl ApiClient {
    /// Download an export and save it through `saver`.
    pub async fn export(&self, kind: ExportKind, saver: &dyn FileSaver) -> ApiResult<SavedExport> {
        let request = OutboundRequest::new(Method::POST, kind.path()).with_header(
            header::ACCEPT,
            HeaderValue::from_static("text/csv, application/octet-stream"),
        );
        let response = self.execute(request).await?;

        let filename = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| kind.default_filename().to_string());
        let bytes = response.bytes().await.map_err(ApiError::from_transport)?;
        debug!(%filename, size = bytes.len(), "Export downloaded");

        let object = TransientObject::create(saver, &bytes)
            .map_err(|e| ApiError::Download(format!("{:#}", e)))?;
        let location = object
            .save_as(&filename)
            .map_err(|e| ApiError::Download(format!("{:#}", e)))?;

        info!(%filename, location = %location.display(), "Export saved");
        Ok(SavedExport {
            filename,
            location,
            size: bytes.len(),
        })
    }
}

/// Extract a safe file name from a `Content-Disposition` value.
///
/// `filename*` (RFC 5987) wins over `filename` when it yields a usable
/// name. Directory components are stripped.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for (name, raw) in disposition_params(value) {
        match name.as_str() {
            "filename" => plain = Some(raw),
            "filename*" => extended = decode_extended(&raw),
            _ => {}
        }
    }

    let usable = |name: String| Some(sanitize_filename(&name)).filter(|name| !name.is_empty());
    extended
        .and_then(usable)
        .or_else(|| plain.and_then(usable))
}

/// Parameters after the disposition type, names lowercased. Quoted values
/// may contain `;` and backslash escapes.
fn disposition_params(value: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let Some((_, mut rest)) = value.split_once(';') else {
        return params;
    };

    loop {
        let Some(eq) = rest.find('=') else {
            break;
        };
        // A parameter without a value; skip to the next one.
        if let Some(semi) = rest[..eq].find(';') {
            rest = &rest[semi + 1..];
            continue;
        }

        let name = rest[..eq].trim().to_ascii_lowercase();
        let after = rest[eq + 1..].trim_start();
        let (raw, remaining) = match after.strip_prefix('"') {
            Some(quoted) => {
                let mut unquoted = String::new();
                let mut end = quoted.len();
                let mut chars = quoted.char_indices();
                while let Some((i, c)) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                unquoted.push(escaped);
                            }
                        }
                        '"' => {
                            end = i + 1;
                            break;
                        }
                        _ => unquoted.push(c),
                    }
                }
                (unquoted, quoted[end..].split_once(';').map(|(_, tail)| tail))
            }
            None => match after.split_once(';') {
                Some((token, tail)) => (token.trim().to_string(), Some(tail)),
                None => (after.trim().to_string(), None),
            },
        };
        params.push((name, raw));

        match remaining {
            Some(tail) => rest = tail,
            None => break,
        }
    }
    params
}

/// `charset'language'percent-encoded`
fn decode_extended(raw: &str) -> Option<String> {
    let mut parts = raw.splitn(3, '\'');
    let _charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;

    let decoded = urlencoding::decode_binary(encoded.as_bytes());
    Some(String::from_utf8_lossy(&decoded).into_owned())
}

fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base == "." || base == ".." {
        return String::new();
    }
    base.chars().filter(|c| !c.is_control()).collect()
}

/// Saves exports into a directory, staging bytes in a hidden part file.
pub struct DirectorySaver {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl DirectorySaver {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            next_id: AtomicU64::new(0),
        }
    }

    /// `name.csv`, then `name (1).csv`, `name (2).csv`, ...
    fn destination(&self, filename: &str) -> PathBuf {
        let candidate = self.dir.join(filename);
        if !candidate.exists() {
            return candidate;
        }
        let path = Path::new(filename);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(filename);
        let extension = path.extension().and_then(|e| e.to_str());
        (1..)
            .map(|n| match extension {
                Some(ext) => self.dir.join(format!("{} ({}).{}", stem, n, ext)),
                None => self.dir.join(format!("{} ({})", stem, n)),
            })
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

impl FileSaver for DirectorySaver {
    fn create_object(&self, bytes: &[u8]) -> Result<ObjectId> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create download directory {}", self.dir.display()))?;
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let staged = self
            .dir
            .join(format!(".quizmaster-{}-{}.part", std::process::id(), n));
        std::fs::write(&staged, bytes).context("Failed to stage download")?;
        Ok(ObjectId::new(staged.to_string_lossy()))
    }

    fn save_as(&self, object: &ObjectId, filename: &str) -> Result<PathBuf> {
        let destination = self.destination(filename);
        std::fs::copy(object.as_str(), &destination)
            .with_context(|| format!("Failed to save {}", destination.display()))?;
        Ok(destination)
    }

    fn release(&self, object: &ObjectId) {
        match std::fs::remove_file(object.as_str()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(object = object.as_str(), error = %e, "Failed to release staged download"),
        }
    }
}
