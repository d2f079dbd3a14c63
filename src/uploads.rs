//! Resumable chunked uploads.
//!
//! The server side keeps chunks on disk until the client asks to complete
//! the upload, then hands the assembled file to the media pipeline. The
//! client side splits files, queues them and backs off on 429.

pub mod client;
pub mod store;

pub use client::{ChunkPlan, RetryPolicy, UploadClient, UploadJob, UploadQueue};
pub use store::{ChunkStore, UploadMeta};

/// Number of chunks needed for `size` bytes.
pub fn total_chunks(size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(chunk_size)
}

/// Expected byte length of chunk `index`. Every chunk is full except
/// possibly the last one.
pub fn expected_chunk_len(size: u64, chunk_size: u64, index: u64) -> Option<u64> {
    let total = total_chunks(size, chunk_size);
    if index >= total {
        return None;
    }
    if index + 1 == total {
        Some(size - chunk_size * index)
    } else {
        Some(chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(total_chunks(10, 4), 3);
        assert_eq!(total_chunks(8, 4), 2);
        assert_eq!(total_chunks(1, 4), 1);
        assert_eq!(total_chunks(0, 4), 0);
    }

    #[test]
    fn last_chunk_carries_the_remainder() {
        assert_eq!(expected_chunk_len(10, 4, 0), Some(4));
        assert_eq!(expected_chunk_len(10, 4, 2), Some(2));
        assert_eq!(expected_chunk_len(8, 4, 1), Some(4));
        assert_eq!(expected_chunk_len(10, 4, 3), None);
    }
}
