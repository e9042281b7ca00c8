use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::{BlockDevice, Error, check_range};

/// 内存盘：新建时全部清零，进程结束即丢失
#[derive(Debug)]
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    block_size: usize,
    num_blocks: usize,
}

impl RamDisk {
    pub fn new(block_size: usize, num_blocks: usize) -> Self {
        Self {
            data: Mutex::new(vec![0; block_size * num_blocks]),
            block_size,
            num_blocks,
        }
    }
}

impl BlockDevice for RamDisk {
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
        let offset = start * self.block_size;
        buf.copy_from_slice(&self.data.lock()[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_blocks(&self, start: usize, buf: &[u8]) -> Result<(), Error> {
        check_range(self, start, buf.len())?;
        let offset = start * self.block_size;
        self.data.lock()[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_block_io() {
        let disk = RamDisk::new(16, 4);
        let data: Vec<u8> = (0..32).collect();
        disk.write_blocks(1, &data).unwrap();

        let mut buf = [0; 48];
        disk.read_blocks(0, &mut buf).unwrap();
        assert_eq!([0; 16], buf[..16]);
        assert_eq!(data[..], buf[16..]);
    }

    #[test]
    fn rejects_bad_access() {
        let disk = RamDisk::new(16, 4);
        assert_eq!(Err(Error::OutOfRange), disk.write_blocks(3, &[0; 32]));
        assert_eq!(Err(Error::Misaligned), disk.read_blocks(0, &mut [0; 10]));
        assert_eq!(Err(Error::OutOfRange), disk.read_blocks(usize::MAX, &mut [0; 16]));
    }
}
