// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Access to the kernel log device.
//!
//! Reads on `/dev/kmsg` are destructive for the reader's position and return exactly one
//! record per call, blocking until one is available. A record consumed here cannot be
//! read again.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// Default location of the structured kernel log device.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/kmsg";

// klogctl(2) action returning the size of the kernel log buffer
#[cfg(target_os = "linux")]
const SYSLOG_ACTION_SIZE_BUFFER: libc::c_int = 10;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to query kernel log buffer size: {0}")]
    BufferSize(#[source] io::Error),
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} returned end of stream")]
    EndOfStream(PathBuf),
}

/// A blocking source of raw kernel records, one record per call.
pub trait RecordSource {
    fn read_record(&mut self) -> Result<Vec<u8>, DeviceError>;
}

/// Returns the size in bytes of the kernel's log ring buffer.
#[cfg(target_os = "linux")]
pub fn kernel_buffer_size() -> Result<usize, DeviceError> {
    // SAFETY: SYSLOG_ACTION_SIZE_BUFFER ignores the buffer and length arguments.
    let size = unsafe { libc::klogctl(SYSLOG_ACTION_SIZE_BUFFER, std::ptr::null_mut(), 0) };
    if size < 0 {
        return Err(DeviceError::BufferSize(io::Error::last_os_error()));
    }
    match usize::try_from(size) {
        Ok(0) | Err(_) => Err(DeviceError::BufferSize(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("kernel reported a log buffer of {size} bytes"),
        ))),
        Ok(size) => Ok(size),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn kernel_buffer_size() -> Result<usize, DeviceError> {
    Err(DeviceError::BufferSize(io::Error::new(
        io::ErrorKind::Unsupported,
        "the kernel log buffer is only available on Linux",
    )))
}

/// Reader over the kernel log device.
#[derive(Debug)]
pub struct KmsgDevice {
    path: PathBuf,
    file: File,
    buffer: Vec<u8>,
}

impl KmsgDevice {
    /// Opens the device with a read buffer as large as the kernel log buffer, so any single
    /// record fits.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let buffer_size = kernel_buffer_size()?;
        info!("kernel log buffer size: {buffer_size} bytes");
        Self::with_buffer_size(path, buffer_size)
    }

    /// Opens the device with an explicit read buffer size.
    pub fn with_buffer_size(path: impl AsRef<Path>, buffer_size: usize) -> Result<Self, DeviceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| DeviceError::Open {
            path: path.clone(),
            source,
        })?;
        debug!("Opened kernel log device {}", path.display());
        Ok(KmsgDevice {
            path,
            file,
            buffer: vec![0; buffer_size],
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for KmsgDevice {
    fn read_record(&mut self) -> Result<Vec<u8>, DeviceError> {
        loop {
            match self.file.read(&mut self.buffer) {
                Ok(0) => return Err(DeviceError::EndOfStream(self.path.clone())),
                Ok(amt) => return Ok(self.buffer[..amt].to_vec()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(DeviceError::Read {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tracing_test::traced_test;

    #[test]
    fn test_open_missing_device() {
        let err = KmsgDevice::with_buffer_size("/nonexistent/kmsg", 1024)
            .expect_err("open should fail");
        assert!(matches!(err, DeviceError::Open { .. }));
    }

    #[test]
    #[traced_test]
    fn test_read_record_then_end_of_stream() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"6,1,2,-;hello\n").unwrap();

        let mut device = KmsgDevice::with_buffer_size(file.path(), 4096).unwrap();
        assert!(logs_contain("Opened kernel log device"));
        assert_eq!(device.read_record().unwrap(), b"6,1,2,-;hello\n".to_vec());

        let err = device.read_record().expect_err("second read should fail");
        assert!(matches!(err, DeviceError::EndOfStream(_)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_kernel_buffer_size_is_positive_when_available() {
        // Unprivileged sandboxes may refuse the syscall.
        if let Ok(size) = kernel_buffer_size() {
            assert!(size > 0);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[traced_test]
    fn test_open_logs_buffer_size() {
        let file = tempfile::NamedTempFile::new().unwrap();
        match KmsgDevice::open(file.path()) {
            Ok(device) => {
                assert_eq!(device.path(), file.path());
                assert!(logs_contain("kernel log buffer size:"));
            }
            Err(err) => {
                assert!(matches!(err, DeviceError::BufferSize(_)));
                assert!(!logs_contain("Opened kernel log device"));
            }
        }
    }
}
