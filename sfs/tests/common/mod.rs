//! 测试公用的设备与数据

#![allow(dead_code)]

use std::sync::Arc;

use block_dev::RamDisk;
use sfs::{BLOCK_COUNT, BLOCK_SIZE, BlockDevice, SimpleFileSystem};

pub fn disk() -> Arc<dyn BlockDevice> {
    Arc::new(RamDisk::new(BLOCK_SIZE, BLOCK_COUNT))
}

pub fn format() -> (SimpleFileSystem, Arc<dyn BlockDevice>) {
    let disk = disk();
    let fs = SimpleFileSystem::format(disk.clone()).unwrap();
    (fs, disk)
}

/// 不以块为周期重复的伪随机字节（xorshift32）
pub fn pattern(len: usize, seed: u32) -> Vec<u8> {
    let mut x = seed | 1;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            (x >> 24) as u8
        })
        .collect()
}

/// 从头读出整个文件，读写指针停在末尾
pub fn read_all(fs: &mut SimpleFileSystem, fd: sfs::Fd) -> Vec<u8> {
    fs.seek(fd, 0).unwrap();
    let mut buf = vec![0; sfs::MAX_FILE_SIZE + 1];
    let len = fs.read(fd, &mut buf).unwrap();
    buf.truncate(len);
    buf
}
