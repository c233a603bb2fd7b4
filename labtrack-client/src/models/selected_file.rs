//! A file picked by the user (picker or drag-and-drop)

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes read up front for content sniffing
const SNIFF_LEN: u64 = 8192;

const IMAGE_PREFIX: &str = "image/";

/// Candidate upload
///
/// `size` is what the picker reported and is what validation checks; it
/// equals `contents.len()` for files read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub contents: Vec<u8>,
}

impl SelectedFile {
    /// Metadata-only file (contents not loaded)
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
            contents: Vec::new(),
        }
    }

    /// File with in-memory contents; size is derived from them
    pub fn with_contents(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        contents: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: contents.len() as u64,
            contents,
        }
    }

    /// Read a file from disk, sniffing its MIME type
    ///
    /// Content sniffing wins over the extension; the extension is only used
    /// when the magic bytes are not recognized.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Self::from_path_within(path, u64::MAX)
    }

    /// Like `from_path`, but only loads contents when the file is at most
    /// `max_bytes` long
    ///
    /// An oversized file comes back metadata-only (real `size`, sniffed MIME
    /// type, empty `contents`) so validation can reject it without reading
    /// it into memory.
    pub fn from_path_within(path: &Path, max_bytes: u64) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        let mut head = Vec::with_capacity(SNIFF_LEN as usize);
        (&mut file).take(SNIFF_LEN).read_to_end(&mut head)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = infer::get(&head)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| mime_from_extension(path).to_string());

        if size > max_bytes {
            return Ok(Self::new(name, mime_type, size));
        }

        let mut contents = head;
        file.read_to_end(&mut contents)?;
        Ok(Self::with_contents(name, mime_type, contents))
    }

    /// Image types get an in-page preview
    pub fn is_image(&self) -> bool {
        self.mime_type
            .get(..IMAGE_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(IMAGE_PREFIX))
    }
}

fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
