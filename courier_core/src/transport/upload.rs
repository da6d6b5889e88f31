/*!
 * Upload sources for multipart POST bodies.
 *
 * An upload is never buffered wholesale: the transfer pulls it in
 * `upload_chunk_size` pieces while the request body is being written, so a
 * large file costs one chunk of memory at a time.
 */
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use bytes::Bytes;

// ---------------------------------------------------------------------------
// UploadSource
// ---------------------------------------------------------------------------

/**
 * Something that can feed bytes into a request body.
 *
 * `read` returns at most `max` bytes; an empty chunk means end of data.
 * `size` is the total byte count and is sent as the part length, so a
 * source that ends early (or runs long) fails its transfer.
 */
pub trait UploadSource: Send {
    fn read(&mut self, max: usize) -> io::Result<Bytes>;

    fn size(&self) -> u64;
}

/**
 * Disk-backed source, read lazily in chunks from an open file handle.
 */
pub struct FileSource {
    file: File,
    size: u64,
}

impl FileSource {
    /// Opens `path` and records its current length.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

impl UploadSource for FileSource {
    fn read(&mut self, max: usize) -> io::Result<Bytes> {
        let mut buf = vec![0u8; max];
        loop {
            match self.file.read(&mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Bytes::from(buf));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/**
 * Memory-backed source. Chunks are zero-copy slices of the buffer.
 */
pub struct MemorySource {
    data: Bytes,
    offset: usize,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            offset: 0,
        }
    }
}

impl UploadSource for MemorySource {
    fn read(&mut self, max: usize) -> io::Result<Bytes> {
        let end = self.data.len().min(self.offset + max);
        let chunk = self.data.slice(self.offset..end);
        self.offset = end;
        Ok(chunk)
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/**
 * A named file part of a multipart form.
 */
pub struct Upload {
    pub(crate) field: String,
    pub(crate) file_name: String,
    pub(crate) mime: String,
    pub(crate) source: Box<dyn UploadSource>,
}

impl Upload {
    /// Wraps any upload source as form field `field`.
    pub fn new(
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        source: impl UploadSource + 'static,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            source: Box::new(source),
        }
    }

    /**
     * Uploads the file at `path`; the part's file name is the path's last
     * component.
     */
    pub fn file(field: impl Into<String>, path: impl AsRef<Path>, mime: impl Into<String>) -> io::Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(field, file_name, mime, FileSource::open(path)?))
    }

    /// Uploads an in-memory buffer.
    pub fn memory(
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self::new(field, file_name, mime, MemorySource::new(content))
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn size(&self) -> u64 {
        self.source.size()
    }
}
