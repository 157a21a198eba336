//! Full-content SHA-256 hashing.
//!
//! Files at or above [`MMAP_THRESHOLD`] are memory-mapped, smaller files are
//! streamed through a buffer. Either way every byte of the file is hashed.

use super::ContentHash;
use crate::error::HashError;
use memmap2::Mmap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Minimum file size to use memory-mapped I/O (1MB)
pub const MMAP_THRESHOLD: u64 = 1024 * 1024;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Capability: compute the content digest of a file
pub trait ContentHasher: Send + Sync {
    fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError>;
}

/// SHA-256 over the complete file content
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Sha256Hasher {
    pub fn new() -> Self {
        Self
    }

    fn hash_mmap(path: &Path, file: &File) -> Result<ContentHash, HashError> {
        // SAFETY: the map is read-only and dropped before `file`.
        let mmap = unsafe { Mmap::map(file) }.map_err(|e| io_error(path, e))?;
        Ok(ContentHash::from_digest(Sha256::digest(&mmap[..])))
    }

    fn hash_stream(path: &Path, file: File) -> Result<ContentHash, HashError> {
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let read = reader.read(&mut buffer).map_err(|e| io_error(path, e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(ContentHash::from_digest(hasher.finalize()))
    }
}

impl ContentHasher for Sha256Hasher {
    fn hash_file(&self, path: &Path) -> Result<ContentHash, HashError> {
        let file = File::open(path).map_err(|e| io_error(path, e))?;
        let len = file.metadata().map_err(|e| io_error(path, e))?.len();

        if len >= MMAP_THRESHOLD {
            Self::hash_mmap(path, &file)
        } else {
            Self::hash_stream(path, file)
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> HashError {
    HashError::IoError {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn hashes_known_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("abc.jpg");
        std::fs::write(&path, b"abc").unwrap();

        let hash = Sha256Hasher::new().hash_file(&path).unwrap();
        assert_eq!(
            hash.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_file_hashes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.jpg");
        std::fs::write(&path, b"").unwrap();

        let hash = Sha256Hasher::new().hash_file(&path).unwrap();
        assert_eq!(
            hash.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn mmap_and_stream_paths_agree() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("large.mov");
        let data: Vec<u8> = (0..MMAP_THRESHOLD as usize + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let via_mmap = Sha256Hasher::new().hash_file(&path).unwrap();
        let file = File::open(&path).unwrap();
        let via_stream = Sha256Hasher::hash_stream(&path, file).unwrap();

        assert_eq!(via_mmap, via_stream);
    }

    #[test]
    fn files_differing_only_in_the_middle_hash_differently() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.bin");
        let b = temp_dir.path().join("b.bin");
        let mut data = vec![7u8; 300_000];
        std::fs::write(&a, &data).unwrap();
        data[150_000] = 8;
        std::fs::write(&b, &data).unwrap();

        let hasher = Sha256Hasher::new();
        assert_ne!(hasher.hash_file(&a).unwrap(), hasher.hash_file(&b).unwrap());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Sha256Hasher::new()
            .hash_file(Path::new("/nonexistent/file.jpg"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/file.jpg"));
    }
}
