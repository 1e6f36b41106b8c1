//! Stream Validator
//!
//! Reads an upload in fixed-size chunks and checks it against a
//! [`ValidationPolicy`]:
//! - declared media type (and optional extension) before any byte is read
//! - empty payload detection on the first chunk
//! - size ceiling enforced after every chunk, aborting without draining
//!
//! Memory held at any point is bounded by `max_bytes + chunk_size`.

use tokio::io::AsyncReadExt;

use super::types::{
    normalize_media_type, ByteReader, UploadDescriptor, UploadError, ValidatedPayload,
    ValidationPolicy,
};

/// Validate an upload, consuming its byte stream
pub async fn validate(
    descriptor: UploadDescriptor<'_>,
    policy: &ValidationPolicy,
) -> Result<ValidatedPayload, UploadError> {
    let UploadDescriptor {
        declared_name,
        declared_media_type,
        mut reader,
    } = descriptor;

    // Type check
    if !policy.allows_media_type(&declared_media_type) {
        tracing::debug!(
            file_name = %declared_name,
            media_type = %declared_media_type,
            "Rejected media type"
        );
        return Err(UploadError::InvalidType(declared_media_type));
    }
    if !policy.allows_file_name(&declared_name) {
        tracing::debug!(file_name = %declared_name, "Rejected file extension");
        return Err(UploadError::InvalidType(declared_name));
    }

    let chunk_size = policy.chunk_size.max(1);
    let mut chunk = vec![0u8; chunk_size];

    // Emptiness check; the first chunk stays in the buffer
    let first = read_chunk(&mut reader, &mut chunk).await?;
    if first == 0 {
        if policy.reject_empty {
            return Err(UploadError::EmptyFile);
        }
        return Ok(ValidatedPayload {
            bytes: Vec::new(),
            size_bytes: 0,
            media_type: normalize_media_type(&declared_media_type),
        });
    }

    let limit = usize::try_from(policy.max_bytes).unwrap_or(usize::MAX);
    let mut buffer = Vec::new();
    let mut total: u64 = 0;
    let mut read = first;

    // Bounded read
    while read > 0 {
        total += read as u64;
        if total > policy.max_bytes {
            tracing::debug!(
                file_name = %declared_name,
                read_bytes = total,
                max_bytes = policy.max_bytes,
                "Size limit exceeded, aborting read"
            );
            return Err(UploadError::TooLarge {
                limit: policy.max_bytes,
            });
        }
        grow_within(&mut buffer, read, limit);
        buffer.extend_from_slice(&chunk[..read]);
        read = read_chunk(&mut reader, &mut chunk).await?;
    }

    tracing::debug!(
        file_name = %declared_name,
        size_bytes = total,
        "Upload validated"
    );

    Ok(ValidatedPayload {
        bytes: buffer,
        size_bytes: total,
        media_type: normalize_media_type(&declared_media_type),
    })
}

/// Make room for `additional` more bytes without growing past `limit`.
///
/// Callers guarantee `buffer.len() + additional <= limit`.
fn grow_within(buffer: &mut Vec<u8>, additional: usize, limit: usize) {
    let needed = buffer.len() + additional;
    if buffer.capacity() >= needed {
        return;
    }
    let target = buffer
        .capacity()
        .saturating_mul(2)
        .max(needed)
        .min(limit.max(needed));
    buffer.reserve_exact(target - buffer.len());
}

async fn read_chunk(reader: &mut ByteReader<'_>, chunk: &mut [u8]) -> Result<usize, UploadError> {
    reader.read(chunk).await.map_err(UploadError::TransferError)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    /// Serves `total` zero bytes and fails if more than `ceiling` are pulled
    struct MeteredSource {
        total: usize,
        ceiling: usize,
        served: Arc<AtomicUsize>,
    }

    impl AsyncRead for MeteredSource {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let served = self.served.load(Ordering::SeqCst);
            let n = buf.remaining().min(self.total - served);
            if served + n > self.ceiling {
                return Poll::Ready(Err(io::Error::other("read past ceiling")));
            }
            buf.put_slice(&vec![0u8; n]);
            self.served.fetch_add(n, Ordering::SeqCst);
            Poll::Ready(Ok(()))
        }
    }

    /// Fails on the first read
    struct BrokenSource;

    impl AsyncRead for BrokenSource {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "client went away",
            )))
        }
    }

    /// Serves `ok_bytes` of data, then fails every read
    struct FailsAfter {
        ok_bytes: usize,
        served: usize,
    }

    impl FailsAfter {
        fn new(ok_bytes: usize) -> Self {
            Self { ok_bytes, served: 0 }
        }
    }

    impl AsyncRead for FailsAfter {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let left = self.ok_bytes - self.served;
            if left == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection dropped mid-upload",
                )));
            }
            let n = buf.remaining().min(left);
            buf.put_slice(&vec![b'x'; n]);
            self.served += n;
            Poll::Ready(Ok(()))
        }
    }

    fn pdf_policy(max_bytes: u64) -> ValidationPolicy {
        ValidationPolicy::new(["application/pdf"], max_bytes)
    }

    #[tokio::test]
    async fn test_accepts_small_pdf() {
        let data = b"%PDF-1.4\0\0".to_vec();
        let descriptor = UploadDescriptor::from_bytes("a.pdf", "application/pdf", data.clone());

        let payload = validate(descriptor, &pdf_policy(1024)).await.unwrap();

        assert_eq!(payload.bytes, data);
        assert_eq!(payload.size_bytes, 10);
        assert_eq!(payload.media_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_rejects_too_large() {
        let descriptor = UploadDescriptor::from_bytes("big.pdf", "application/pdf", vec![0u8; 2000]);

        let result = validate(descriptor, &pdf_policy(1024)).await;

        assert!(matches!(result, Err(UploadError::TooLarge { limit: 1024 })));
    }

    #[tokio::test]
    async fn test_exact_limit_is_accepted() {
        let policy = pdf_policy(1024).with_chunk_size(100);
        let descriptor = UploadDescriptor::from_bytes("edge.pdf", "application/pdf", vec![7u8; 1024]);

        let payload = validate(descriptor, &policy).await.unwrap();

        assert_eq!(payload.size_bytes, 1024);
        assert_eq!(payload.bytes.len(), 1024);
    }

    #[tokio::test]
    async fn test_aborts_without_draining_stream() {
        let max_bytes = 10 * 1024;
        let chunk_size = 1024;
        let served = Arc::new(AtomicUsize::new(0));
        let source = MeteredSource {
            total: 10 * 1024 * 1024,
            ceiling: max_bytes + chunk_size,
            served: served.clone(),
        };
        let policy = pdf_policy(max_bytes as u64).with_chunk_size(chunk_size);

        let result = validate(UploadDescriptor::new("huge.pdf", "application/pdf", source), &policy).await;

        assert!(matches!(result, Err(UploadError::TooLarge { .. })));
        assert!(served.load(Ordering::SeqCst) <= max_bytes + chunk_size);
    }

    #[tokio::test]
    async fn test_rejects_empty_stream() {
        let descriptor = UploadDescriptor::from_bytes("empty.pdf", "application/pdf", Vec::new());

        let result = validate(descriptor, &pdf_policy(1024)).await;

        assert!(matches!(result, Err(UploadError::EmptyFile)));
    }

    #[tokio::test]
    async fn test_empty_allowed_when_policy_permits() {
        let policy = pdf_policy(1024).with_reject_empty(false);
        let descriptor = UploadDescriptor::from_bytes("empty.pdf", "application/pdf", Vec::new());

        let payload = validate(descriptor, &policy).await.unwrap();

        assert_eq!(payload.size_bytes, 0);
        assert!(payload.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_type_reads_nothing() {
        let served = Arc::new(AtomicUsize::new(0));

        for media_type in ["text/plain", "application/epub+zip", "image/png", ""] {
            let source = MeteredSource {
                total: 4096,
                ceiling: 0,
                served: served.clone(),
            };
            let descriptor = UploadDescriptor::new("notes.pdf", media_type, source);
            let result = validate(descriptor, &pdf_policy(1024)).await;
            assert!(matches!(result, Err(UploadError::InvalidType(_))), "{media_type}");
        }

        assert_eq!(served.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_extension_checked_before_read() {
        let policy = pdf_policy(1024).with_allowed_extensions(["pdf"]);
        let descriptor = UploadDescriptor::new("payload.exe", "application/pdf", BrokenSource);

        let result = validate(descriptor, &policy).await;

        assert!(matches!(result, Err(UploadError::InvalidType(name)) if name == "payload.exe"));
    }

    #[tokio::test]
    async fn test_read_failure_is_transfer_error() {
        let descriptor = UploadDescriptor::new("broken.pdf", "application/pdf", BrokenSource);

        let result = validate(descriptor, &pdf_policy(1024)).await;

        match result {
            Err(UploadError::TransferError(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::ConnectionReset)
            }
            other => panic!("expected transfer error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_after_partial_read_is_transfer_error() {
        let policy = pdf_policy(10_000).with_chunk_size(256);
        let descriptor = UploadDescriptor::new("cut.pdf", "application/pdf", FailsAfter::new(1000));

        let result = validate(descriptor, &policy).await;

        match result {
            Err(UploadError::TransferError(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof)
            }
            other => panic!("expected transfer error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_buffer_capacity_stays_within_limit() {
        let cases = [(4100usize, 5000u64, 1024usize), (5000, 5000, 1024), (10_000, 10_000, 333), (1, 1, 64)];

        for (len, max_bytes, chunk_size) in cases {
            let policy = pdf_policy(max_bytes).with_chunk_size(chunk_size);
            let descriptor = UploadDescriptor::from_bytes("cap.pdf", "application/pdf", vec![1u8; len]);

            let payload = validate(descriptor, &policy).await.unwrap();

            assert_eq!(payload.bytes.len(), len);
            assert!(
                payload.bytes.capacity() <= max_bytes as usize + chunk_size,
                "len={len} capacity={} max_bytes={max_bytes}",
                payload.bytes.capacity()
            );
        }
    }

    #[tokio::test]
    async fn test_multi_chunk_concatenation() {
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let policy = pdf_policy(10_000).with_chunk_size(333);
        let descriptor = UploadDescriptor::from_bytes("multi.pdf", "application/pdf", data.clone());

        let payload = validate(descriptor, &policy).await.unwrap();

        assert_eq!(payload.bytes, data);
        assert_eq!(payload.size_bytes, 5000);
    }
}
