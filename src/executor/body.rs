//! Size-capped body reading.

use super::error::{classify_reqwest_error, ExecutorError};
use std::time::Duration;

const INITIAL_CAPACITY: usize = 64 * 1024;

/// Read a response body, failing once more than `limit` bytes arrive.
///
/// A declared Content-Length over the limit fails before any body is read.
pub(crate) async fn read_capped(
    mut response: reqwest::Response,
    limit: usize,
    timeout: Duration,
) -> Result<Vec<u8>, ExecutorError> {
    let declared = response.content_length();
    if let Some(len) = declared {
        if len > limit as u64 {
            return Err(ExecutorError::SizeExceeded { limit });
        }
    }

    let capacity = declared
        .map(|len| len as usize)
        .unwrap_or(INITIAL_CAPACITY)
        .min(limit);
    let mut body = Vec::with_capacity(capacity);
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| classify_reqwest_error(e, timeout))?
    {
        if body.len() + chunk.len() > limit {
            return Err(ExecutorError::SizeExceeded { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
