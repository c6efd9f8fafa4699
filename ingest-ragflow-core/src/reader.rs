use std::path::Path;

use crate::error::IngestError;

/// Read the whole file, or fail with [`IngestError::Io`]. Never returns a partial buffer.
pub fn read_binary_file(path: impl AsRef<Path>) -> Result<Vec<u8>, IngestError> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| IngestError::io(path, e))
}

/// Same contract as [`read_binary_file`], for use inside async workers.
pub async fn read_binary_file_async(path: impl AsRef<Path>) -> Result<Vec<u8>, IngestError> {
    let path = path.as_ref();
    tokio::fs::read(path)
        .await
        .map_err(|e| IngestError::io(path, e))
}
