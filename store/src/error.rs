// Copyright 2024 FerroFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub type Error = StorageError;
pub type Result<T> = core::result::Result<T, Error>;

/// The object-layer error taxonomy. Low-level I/O errors are mapped to the
/// file/volume variants close to the syscall, then translated once to the
/// bucket/object variants by [`to_object_err`] at the object-layer boundary.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File not found")]
    FileNotFound,

    #[error("File access denied")]
    FileAccessDenied,

    #[error("File name too long")]
    FileNameTooLong,

    #[error("File is corrupted")]
    FileCorrupt,

    #[error("Not a regular file")]
    IsNotRegular,

    #[error("Volume not found")]
    VolumeNotFound,

    #[error("Volume not empty")]
    VolumeNotEmpty,

    #[error("Volume exists")]
    VolumeExists,

    #[error("Disk not found")]
    DiskNotFound,

    #[error("Storage reached its minimum free drive threshold.")]
    StorageFull,

    #[error("Corrupted format")]
    CorruptedFormat,

    #[error("Please reduce your request rate")]
    SlowDown,

    #[error("Operation timed out")]
    OperationTimedOut,

    /// Backing metadata changed while a compressed read was in flight; the
    /// caller may retry.
    #[error("Backend metadata changed during read")]
    ReadBlock,

    #[error("not implemented")]
    NotImplemented,

    #[error("Unexpected error")]
    Unexpected,

    #[error("Invalid arguments provided: {0}")]
    InvalidArgument(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("Bucket name invalid: {0}")]
    BucketNameInvalid(String),

    #[error("Bucket exists: {0}")]
    BucketAlreadyExists(String),

    #[error("Bucket already owned by you: {0}")]
    BucketAlreadyOwnedByYou(String),

    #[error("Bucket policy not found: {0}")]
    BucketPolicyNotFound(String),

    #[error("Object not found: {0}/{1}")]
    ObjectNotFound(String, String),

    #[error("Object name invalid: {0}/{1}")]
    ObjectNameInvalid(String, String),

    #[error("Object already exists: {0}/{1}")]
    ObjectAlreadyExists(String, String),

    #[error("Object exists on backend as directory: {0}/{1}")]
    ObjectExistsAsDirectory(String, String),

    #[error("Prefix access is denied: {0}/{1}")]
    PrefixAccessDenied(String, String),

    #[error("The requested range {offset}/{length} over size {size} is not satisfiable")]
    InvalidRange { offset: i64, length: i64, size: i64 },

    #[error("Etag of the object has changed")]
    InvalidETag,

    #[error("Incomplete body")]
    IncompleteBody,

    #[error("Part number {part_number} is smaller than the minimum allowed size")]
    EntityTooSmall { part_number: usize, part_size: i64 },

    #[error("Invalid upload id: {0}")]
    InvalidUploadID(String),

    #[error("Specified part could not be found: {0}")]
    InvalidPart(usize),

    #[error("Io error: {0}")]
    Io(std::io::Error),
}

impl StorageError {
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StorageError::Io(std::io::Error::other(error))
    }

    /// True for transient errors where the client may retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::OperationTimedOut | StorageError::ReadBlock | StorageError::SlowDown
        )
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        os_err_to_fs_err(e)
    }
}

impl From<ferrofs_lock::LockError> for StorageError {
    fn from(e: ferrofs_lock::LockError) -> Self {
        match e {
            ferrofs_lock::LockError::Timeout { .. } => StorageError::OperationTimedOut,
        }
    }
}

impl From<ferrofs_filemeta::FsMetaError> for StorageError {
    fn from(e: ferrofs_filemeta::FsMetaError) -> Self {
        match e {
            ferrofs_filemeta::FsMetaError::CorruptedFormat => StorageError::CorruptedFormat,
            ferrofs_filemeta::FsMetaError::UnexpectedEof => StorageError::CorruptedFormat,
        }
    }
}

const ENOTDIR: i32 = 20;
const EISDIR: i32 = 21;
const ENOSPC: i32 = 28;
const ENAMETOOLONG: i32 = 36;
const ENOTEMPTY: i32 = 39;

/// Maps an OS-level error to the file/volume taxonomy. Applied immediately
/// around syscalls so callers never see raw `io::Error` kinds.
pub fn os_err_to_fs_err(e: std::io::Error) -> StorageError {
    match e.kind() {
        std::io::ErrorKind::NotFound => StorageError::FileNotFound,
        std::io::ErrorKind::PermissionDenied => StorageError::FileAccessDenied,
        std::io::ErrorKind::AlreadyExists => StorageError::VolumeExists,
        std::io::ErrorKind::DirectoryNotEmpty => StorageError::VolumeNotEmpty,
        _ => match e.raw_os_error() {
            Some(ENOTDIR) => StorageError::FileNotFound,
            Some(EISDIR) => StorageError::IsNotRegular,
            Some(ENOSPC) => StorageError::StorageFull,
            Some(ENAMETOOLONG) => StorageError::FileNameTooLong,
            Some(ENOTEMPTY) => StorageError::VolumeNotEmpty,
            _ => StorageError::Io(e),
        },
    }
}

/// Translates file/volume errors to bucket/object errors, exactly once.
/// Pass an empty `object` for bucket-scoped operations. Errors already in
/// the object taxonomy pass through unchanged, so double wrapping cannot
/// happen.
pub fn to_object_err(err: StorageError, bucket: &str, object: &str) -> StorageError {
    match err {
        StorageError::VolumeNotFound => StorageError::BucketNotFound(bucket.to_string()),
        StorageError::VolumeNotEmpty => StorageError::BucketNotEmpty(bucket.to_string()),
        StorageError::VolumeExists => StorageError::BucketAlreadyOwnedByYou(bucket.to_string()),
        StorageError::FileNotFound => {
            if object.is_empty() {
                StorageError::BucketNotFound(bucket.to_string())
            } else {
                StorageError::ObjectNotFound(bucket.to_string(), object.to_string())
            }
        }
        StorageError::FileAccessDenied => {
            if object.is_empty() {
                StorageError::BucketNotFound(bucket.to_string())
            } else {
                StorageError::PrefixAccessDenied(bucket.to_string(), object.to_string())
            }
        }
        StorageError::FileNameTooLong => StorageError::ObjectNameInvalid(bucket.to_string(), object.to_string()),
        StorageError::IsNotRegular => StorageError::ObjectExistsAsDirectory(bucket.to_string(), object.to_string()),
        err => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_not_found_mapping() {
        let err = to_object_err(StorageError::FileNotFound, "bucket", "object");
        assert!(matches!(err, StorageError::ObjectNotFound(b, o) if b == "bucket" && o == "object"));

        let err = to_object_err(StorageError::FileNotFound, "bucket", "");
        assert!(matches!(err, StorageError::BucketNotFound(b) if b == "bucket"));
    }

    #[test]
    fn test_no_double_wrapping() {
        let err = to_object_err(StorageError::ObjectNotFound("b".into(), "o".into()), "other", "x");
        assert!(matches!(err, StorageError::ObjectNotFound(b, _) if b == "b"));
    }

    #[test]
    fn test_os_err_mapping() {
        let not_found = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(os_err_to_fs_err(not_found), StorageError::FileNotFound));

        let no_space = std::io::Error::from_raw_os_error(ENOSPC);
        assert!(matches!(os_err_to_fs_err(no_space), StorageError::StorageFull));

        let too_long = std::io::Error::from_raw_os_error(ENAMETOOLONG);
        assert!(matches!(os_err_to_fs_err(too_long), StorageError::FileNameTooLong));
    }
}
