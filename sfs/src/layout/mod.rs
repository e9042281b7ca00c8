//! # 磁盘数据结构层
//!
//! sfs 的磁盘布局：
//! 超级块 | 索引节点表 | 目录表 | 数据块区域 | 空闲块位图
//!
//! 除数据块外，每个区域都是一张定长表，挂载时整体读入内存，
//! 修改后整体写回（见 [`Area`]）。

mod bitmap;
pub use bitmap::Bitmap;

mod super_block;
pub use super_block::SuperBlock;

mod inode;
pub use inode::{BlockMapper, InodeTable};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirTable, validate_name};

use alloc::sync::Arc;
use alloc::vec;
use core::{mem, ptr, slice};

use block_dev::BlockDevice;
use derive_more::{From, Into};
use enumflags2::bitflags;

use crate::{BLOCK_SIZE, Result};

/// 物理块号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<BlockId> for usize {
    #[inline]
    fn from(id: BlockId) -> Self {
        id.0 as usize
    }
}

/// 磁盘上的块指针，[`BlockPtr::NULL`] 表示未分配
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct BlockPtr(u32);

impl BlockPtr {
    pub const NULL: Self = Self(u32::MAX);

    #[inline]
    pub fn get(self) -> Option<BlockId> {
        (self != Self::NULL).then_some(BlockId(self.0))
    }
}

impl From<BlockId> for BlockPtr {
    #[inline]
    fn from(id: BlockId) -> Self {
        Self(id.0)
    }
}

/// 需要落盘的元数据区域
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    SuperBlock = 0b0001,
    Inodes = 0b0010,
    Directory = 0b0100,
    Bitmap = 0b1000,
}

/// 可与字节序列互相转换的磁盘数据结构
///
/// # Safety
///
/// 实现者必须是`#[repr(C)]`或`#[repr(transparent)]`，不含填充字节，
/// 且任意字节序列都是它的合法值。
pub unsafe trait Pod: Copy + 'static {
    #[inline]
    fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), mem::size_of::<Self>()) }
    }

    #[inline]
    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), mem::size_of::<Self>()) }
    }
}

unsafe impl Pod for u8 {}
unsafe impl Pod for BlockPtr {}
unsafe impl<T: Pod, const N: usize> Pod for [T; N] {}

/// 卷上一段位置固定的连续块，存放一张元数据表
pub trait Area: Pod {
    /// 起始块号
    const START: usize;
    /// 占据块数
    const BLOCKS: usize;

    /// 区域覆盖的块号范围
    #[inline]
    fn blocks() -> core::ops::Range<usize> {
        Self::START..Self::START + Self::BLOCKS
    }

    fn load(&mut self, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        let mut buf = vec![0; Self::BLOCKS * BLOCK_SIZE];
        block_device.read_blocks(Self::START, &mut buf)?;

        let bytes = self.as_bytes_mut();
        let len = bytes.len();
        bytes.copy_from_slice(&buf[..len]);
        Ok(())
    }

    fn store(&self, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        // 区域内表之后的空间补零
        let mut buf = vec![0; Self::BLOCKS * BLOCK_SIZE];
        let bytes = self.as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);

        block_device.write_blocks(Self::START, &buf)?;
        Ok(())
    }
}

/// 读出一整块，`T`的大小必须恰为一块
pub fn read_block<T: Pod>(block_device: &Arc<dyn BlockDevice>, id: BlockId, block: &mut T) -> Result<()> {
    debug_assert_eq!(BLOCK_SIZE, mem::size_of::<T>());
    block_device.read_blocks(id.into(), block.as_bytes_mut())?;
    Ok(())
}

/// 写入一整块，`T`的大小必须恰为一块
pub fn write_block<T: Pod>(block_device: &Arc<dyn BlockDevice>, id: BlockId, block: &T) -> Result<()> {
    debug_assert_eq!(BLOCK_SIZE, mem::size_of::<T>());
    block_device.write_blocks(id.into(), block.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use core::mem;

    use super::dir_entry::DirEntry;
    use super::inode::{DiskInode, IndirectBlock};
    use super::*;
    use crate::{BITMAP_BLOCKS, BLOCK_COUNT, DIR_AREA_BLOCKS, INODE_AREA_BLOCKS};

    #[test]
    fn volume() {
        assert_eq!(56, mem::size_of::<DiskInode>());
        assert_eq!(24, mem::size_of::<DirEntry>());
        assert_eq!(BLOCK_SIZE, mem::size_of::<IndirectBlock>());
        assert!(mem::size_of::<SuperBlock>() <= BLOCK_SIZE);
        assert!(mem::size_of::<InodeTable>() <= INODE_AREA_BLOCKS * BLOCK_SIZE);
        assert!(mem::size_of::<DirTable>() <= DIR_AREA_BLOCKS * BLOCK_SIZE);
        assert!(mem::size_of::<Bitmap>() <= BITMAP_BLOCKS * BLOCK_SIZE);
    }

    #[test]
    fn areas_do_not_overlap() {
        assert_eq!(0..1, SuperBlock::blocks());
        assert_eq!(1..8, InodeTable::blocks());
        assert_eq!(8..11, DirTable::blocks());
        assert_eq!(4080..4096, Bitmap::blocks());
        assert_eq!(BLOCK_COUNT, Bitmap::blocks().end);
    }

    #[test]
    fn null_pointer() {
        assert_eq!(None, BlockPtr::NULL.get());
        let id = BlockId::new(42);
        assert_eq!(Some(id), BlockPtr::from(id).get());
        assert_eq!(42usize, usize::from(id));
    }
}
