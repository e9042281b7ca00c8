#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use block_dev::{BlockDevice, Error, check_range};
use send_wrapper::SendWrapper;

/// 以宿主机上的镜像文件充当块设备
#[derive(Debug)]
pub struct BlockFile {
    inner: SendWrapper<RefCell<File>>,
    block_size: usize,
    num_blocks: usize,
}

impl BlockFile {
    /// 新建全零的镜像，已有的文件会被截断
    pub fn create(path: &Path, block_size: usize, num_blocks: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((block_size * num_blocks) as u64)?;

        Ok(Self::new(file, block_size, num_blocks))
    }

    /// 打开已有的镜像，文件不能短于设备容量
    pub fn open(path: &Path, block_size: usize, num_blocks: usize) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let len = file.metadata()?.len();
        let capacity = (block_size * num_blocks) as u64;
        if len < capacity {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("image holds {len} bytes, {capacity} expected"),
            ));
        }

        Ok(Self::new(file, block_size, num_blocks))
    }

    fn new(file: File, block_size: usize, num_blocks: usize) -> Self {
        Self {
            inner: SendWrapper::new(RefCell::new(file)),
            block_size,
            num_blocks,
        }
    }

    #[inline]
    fn offset(&self, start: usize) -> SeekFrom {
        SeekFrom::Start((start * self.block_size) as u64)
    }
}

impl BlockDevice for BlockFile {
    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    fn read_blocks(&self, start: usize, buf: &mut [u8]) -> Result<(), Error> {
        check_range(self, start, buf.len())?;
        let mut file = self.inner.borrow_mut();
        file.seek(self.offset(start))
            .and_then(|_| file.read_exact(buf))
            .map_err(|e| io_failure(start, e))
    }

    fn write_blocks(&self, start: usize, buf: &[u8]) -> Result<(), Error> {
        check_range(self, start, buf.len())?;
        let mut file = self.inner.borrow_mut();
        file.seek(self.offset(start))
            .and_then(|_| file.write_all(buf))
            .map_err(|e| io_failure(start, e))
    }
}

fn io_failure(start: usize, e: io::Error) -> Error {
    log::error!("image I/O at block {start}: {e}");
    Error::Io
}
