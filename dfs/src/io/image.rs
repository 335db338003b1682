use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{BufWriter, SeekFrom};
use std::path::Path;

use log::debug;

use crate::error::Result;

/// Writes of zeroes while clearing a medium are issued in chunks this large.
const CLEAR_CHUNK: usize = 64 * 1024;

/// A whole disk image held in memory. All catalog operations work on
/// [`DiskImage::buffer_mut`]; nothing reaches the host file until
/// [`DiskImage::save`].
pub struct DiskImage {
    fd: File,
    buf: Vec<u8>,
}

impl DiskImage {
    /// Loads an existing image file in full. Fails if the file does not
    /// exist rather than creating one.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut fd = OpenOptions::new().read(true).write(true).open(path)?;
        let mut buf = Vec::new();
        fd.read_to_end(&mut buf)?;
        debug!("loaded image of {} bytes", buf.len());
        Ok(DiskImage { fd, buf })
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Writes the buffer back over the host file and flushes it to disk.
    pub fn save(&mut self) -> Result<()> {
        self.fd.seek(SeekFrom::Start(0))?;
        self.fd.write_all(&self.buf)?;
        self.fd.set_len(self.buf.len() as u64)?;
        self.fd.sync_all()?;
        debug!("saved image of {} bytes", self.buf.len());
        Ok(())
    }
}

/// Creates a zero-filled image of a fixed size over a host file.
pub struct DiskImageBuilder {
    fd: File,
    size: u64,
}

impl From<File> for DiskImageBuilder {
    fn from(fd: File) -> Self {
        DiskImageBuilder {
            fd,
            size: 0,
        }
    }
}

impl DiskImageBuilder {
    /// Sets the size of the image in bytes.
    pub fn with_size(mut self, bytes: u64) -> Self {
        self.size = bytes;
        self
    }

    /// The builder assumes ownership of the file and destroys its content.
    /// It can only produce one image.
    pub fn build(mut self) -> Result<DiskImage> {
        self.zero_medium()?;
        let buf = vec![0; self.size as usize];
        Ok(DiskImage { fd: self.fd, buf })
    }

    fn zero_medium(&mut self) -> Result<()> {
        self.fd.set_len(0)?;
        self.fd.seek(SeekFrom::Start(0))?;
        let mut bfd = BufWriter::new(&self.fd);
        let zeroes = vec![0x00; CLEAR_CHUNK];
        let mut remaining = self.size as usize;
        while remaining > 0 {
            let chunk = remaining.min(CLEAR_CHUNK);
            bfd.write_all(&zeroes[..chunk])?;
            remaining -= chunk;
        }
        bfd.flush()?;
        Ok(())
    }
}
