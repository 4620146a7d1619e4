//! Guarded byte buffers
//!
//! Every PDF byte sequence that enters or leaves the core is copied into an
//! [`OwnedBuffer`] by [`BufferGuard`]. The copy is exclusive and immutable,
//! so nothing outside the buffer can resize, free or mutate it afterwards.

use crate::error::BufferError;
use parking_lot::RwLock;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Smallest buffer that can hold a PDF header and an EOF marker.
pub const MIN_PDF_LEN: usize = 8;

const PDF_MAGIC: &[u8] = b"%PDF-";
const EOF_MARKER: &[u8] = b"%%EOF";
/// How far back from the end the EOF marker is searched for.
const EOF_SEARCH_WINDOW: usize = 1024;

/// The bulk copy could not complete because the source changed under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceUnavailable;

/// A byte source of possibly volatile origin.
pub trait ByteSource {
    /// Current length of the source.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contiguous copy of the whole source into `dst`.
    fn copy_to(&self, dst: &mut Vec<u8>) -> Result<(), SourceUnavailable>;

    /// Single byte at `index`, or `None` if it is no longer accessible.
    fn byte_at(&self, index: usize) -> Option<u8>;
}

impl ByteSource for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_to(&self, dst: &mut Vec<u8>) -> Result<(), SourceUnavailable> {
        dst.extend_from_slice(self);
        Ok(())
    }

    fn byte_at(&self, index: usize) -> Option<u8> {
        self.get(index).copied()
    }
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn copy_to(&self, dst: &mut Vec<u8>) -> Result<(), SourceUnavailable> {
        self.as_slice().copy_to(dst)
    }

    fn byte_at(&self, index: usize) -> Option<u8> {
        self.as_slice().byte_at(index)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &T {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn copy_to(&self, dst: &mut Vec<u8>) -> Result<(), SourceUnavailable> {
        (**self).copy_to(dst)
    }

    fn byte_at(&self, index: usize) -> Option<u8> {
        (**self).byte_at(index)
    }
}

/// A byte buffer shared with another owner that may resize or detach it at
/// any time, such as a transfer buffer handed over by a calling layer.
#[derive(Debug, Clone, Default)]
pub struct SharedBytes {
    inner: Arc<RwLock<Vec<u8>>>,
    expected_len: usize,
}

impl SharedBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        let expected_len = bytes.len();
        Self {
            inner: Arc::new(RwLock::new(bytes)),
            expected_len,
        }
    }

    /// Length advertised when the buffer was handed over.
    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    /// Drop the backing storage, as the other owner would on transfer.
    pub fn detach(&self) {
        self.inner.write().clear();
    }

    /// Shrink the backing storage to `len` bytes.
    pub fn truncate(&self, len: usize) {
        self.inner.write().truncate(len);
    }
}

impl ByteSource for SharedBytes {
    fn len(&self) -> usize {
        self.expected_len
    }

    fn copy_to(&self, dst: &mut Vec<u8>) -> Result<(), SourceUnavailable> {
        let bytes = self.inner.read();
        if bytes.len() != self.expected_len {
            return Err(SourceUnavailable);
        }
        dst.extend_from_slice(&bytes);
        Ok(())
    }

    fn byte_at(&self, index: usize) -> Option<u8> {
        self.inner.read().get(index).copied()
    }
}

/// Exclusively-owned, immutable PDF bytes.
///
/// Only [`BufferGuard`] constructs these. Cloning makes a deep copy.
#[derive(Clone, PartialEq, Eq)]
pub struct OwnedBuffer {
    bytes: Box<[u8]>,
}

impl OwnedBuffer {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }
}

impl Deref for OwnedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for OwnedBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for OwnedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedBuffer")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Copies and validates incoming PDF bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferGuard {
    max_len: Option<usize>,
}

impl BufferGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject inputs longer than `max_len` bytes.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
        }
    }

    /// Copy `source` into an [`OwnedBuffer`] and validate it as PDF bytes.
    pub fn guard<S: ByteSource + ?Sized>(&self, source: &S) -> Result<OwnedBuffer, BufferError> {
        let expected = source.len();
        if expected == 0 {
            return Err(BufferError::Empty);
        }
        if let Some(max) = self.max_len {
            if expected > max {
                return Err(BufferError::TooLarge { len: expected, max });
            }
        }

        let bytes = copy_exclusive(source, expected)?;
        validate(&bytes)?;

        Ok(OwnedBuffer {
            bytes: bytes.into_boxed_slice(),
        })
    }
}

/// Guard with no size limit.
pub fn guard<S: ByteSource + ?Sized>(source: &S) -> Result<OwnedBuffer, BufferError> {
    BufferGuard::default().guard(source)
}

fn copy_exclusive<S: ByteSource + ?Sized>(
    source: &S,
    expected: usize,
) -> Result<Vec<u8>, BufferError> {
    let mut bytes = Vec::with_capacity(expected);
    if source.copy_to(&mut bytes).is_ok() && bytes.len() == expected {
        return Ok(bytes);
    }

    // Bulk copy failed: read what is still reachable, zero-filling the rest.
    bytes.clear();
    let mut substituted = 0usize;
    for index in 0..expected {
        match source.byte_at(index) {
            Some(byte) => bytes.push(byte),
            None => {
                substituted += 1;
                bytes.push(0);
            }
        }
    }

    let copied = expected - substituted;
    if copied == 0 || bytes.len() != expected {
        return Err(BufferError::CopyFailed { expected, copied });
    }
    if substituted > 0 {
        tracing::warn!(
            "Source became partially inaccessible during copy: substituted {} of {} bytes",
            substituted,
            expected
        );
    }

    Ok(bytes)
}

fn validate(bytes: &[u8]) -> Result<(), BufferError> {
    if bytes.len() < MIN_PDF_LEN {
        return Err(BufferError::TooSmall {
            len: bytes.len(),
            min: MIN_PDF_LEN,
        });
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(BufferError::HeaderMismatch);
    }

    let tail_start = bytes.len().saturating_sub(EOF_SEARCH_WINDOW);
    let has_eof = bytes[tail_start..]
        .windows(EOF_MARKER.len())
        .any(|window| window == EOF_MARKER);
    if !has_eof {
        return Err(BufferError::MissingEof);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &[u8] = b"%PDF-1.4\n1 0 obj\n<<>>\nendobj\n%%EOF\n";

    #[test]
    fn test_guard_copies_bytes_exactly() {
        let buffer = guard(MINIMAL).unwrap();
        assert_eq!(buffer.as_bytes(), MINIMAL);
        assert_eq!(buffer.len(), MINIMAL.len());
    }

    #[test]
    fn test_guard_rejects_empty() {
        assert_eq!(guard(&b""[..]), Err(BufferError::Empty));
    }

    #[test]
    fn test_guard_rejects_short_input() {
        assert_eq!(
            guard(&b"%PDF-1"[..]),
            Err(BufferError::TooSmall { len: 6, min: 8 })
        );
    }

    #[test]
    fn test_guard_rejects_missing_header() {
        assert_eq!(
            guard(&b"<html>not a pdf</html> %%EOF"[..]),
            Err(BufferError::HeaderMismatch)
        );
    }

    #[test]
    fn test_guard_rejects_missing_eof() {
        assert_eq!(
            guard(&b"%PDF-1.7\ntruncated body"[..]),
            Err(BufferError::MissingEof)
        );
    }

    #[test]
    fn test_guard_eof_must_be_near_tail() {
        let mut bytes = MINIMAL.to_vec();
        bytes.extend(std::iter::repeat(b' ').take(EOF_SEARCH_WINDOW + 1));
        assert_eq!(guard(&bytes), Err(BufferError::MissingEof));
    }

    #[test]
    fn test_guard_enforces_max_len() {
        let guard = BufferGuard::with_max_len(10);
        assert_eq!(
            guard.guard(MINIMAL),
            Err(BufferError::TooLarge {
                len: MINIMAL.len(),
                max: 10
            })
        );
    }

    #[test]
    fn test_shared_bytes_copy() {
        let shared = SharedBytes::new(MINIMAL.to_vec());
        let buffer = guard(&shared).unwrap();
        assert_eq!(buffer.as_bytes(), MINIMAL);

        // The guarded copy is unaffected by the other owner detaching later.
        shared.detach();
        assert_eq!(buffer.as_bytes(), MINIMAL);
    }

    #[test]
    fn test_detached_source_fails_copy() {
        let shared = SharedBytes::new(MINIMAL.to_vec());
        shared.detach();
        assert_eq!(
            guard(&shared),
            Err(BufferError::CopyFailed {
                expected: MINIMAL.len(),
                copied: 0
            })
        );
    }

    #[test]
    fn test_truncated_source_zero_fills_tail() {
        let mut bytes = MINIMAL.to_vec();
        bytes.extend_from_slice(b"trailing");
        let shared = SharedBytes::new(bytes);
        shared.truncate(MINIMAL.len());

        let buffer = guard(&shared).unwrap();
        assert_eq!(buffer.len(), MINIMAL.len() + 8);
        assert_eq!(&buffer[..MINIMAL.len()], MINIMAL);
        assert!(buffer[MINIMAL.len()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clone_is_deep_copy() {
        let buffer = guard(MINIMAL).unwrap();
        let copy = buffer.clone();
        assert_ne!(buffer.as_bytes().as_ptr(), copy.as_bytes().as_ptr());
        assert_eq!(buffer, copy);
    }
}
