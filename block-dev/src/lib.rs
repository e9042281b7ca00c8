//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、镜像文件、内存盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 设备的几何参数（块大小、块数）在构造时确定，此后不变。
//! 新建卷还是打开已有卷，由各驱动的构造函数区分。

#![no_std]

extern crate alloc;

mod ram_disk;

use core::any::Any;
use core::fmt;

pub use self::ram_disk::RamDisk;

/// 块设备驱动特质
///
/// 一次读写的块数由缓冲区长度决定：`buf.len() / block_size()`，
/// 缓冲区长度必须是块大小的整数倍。
pub trait BlockDevice: Send + Sync + Any {
    /// 每块字节数
    fn block_size(&self) -> usize;

    /// 设备总块数
    fn num_blocks(&self) -> usize;

    /// 从`start`块起连续读出若干块填满`buf`
    fn read_blocks(&self, start: usize, buf: &mut [u8]) -> Result<(), Error>;

    /// 把`buf`连续写入从`start`块起的若干块
    fn write_blocks(&self, start: usize, buf: &[u8]) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 访问越过了设备末尾
    OutOfRange,
    /// 缓冲区长度不是块大小的整数倍
    Misaligned,
    /// 底层介质读写失败
    Io,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::OutOfRange => "block range out of device",
            Error::Misaligned => "buffer is not a whole number of blocks",
            Error::Io => "device I/O failure",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}

/// 检查一次访问是否落在设备内，返回涉及的块数
pub fn check_range(dev: &dyn BlockDevice, start: usize, len: usize) -> Result<usize, Error> {
    let block_size = dev.block_size();
    if len % block_size != 0 {
        return Err(Error::Misaligned);
    }

    let count = len / block_size;
    match start.checked_add(count) {
        Some(end) if end <= dev.num_blocks() => Ok(count),
        _ => Err(Error::OutOfRange),
    }
}
