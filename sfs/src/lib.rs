#![no_std]

extern crate alloc;

/* sfs 的整体架构，自上而下 */

// 文件系统层：格式化、挂载以及面向打开文件的读写操作
mod sfs;

// 打开文件表：内存中的会话，不落盘
mod handle;

// 磁盘数据结构层：超级块、索引节点表、目录表与空闲块位图
mod layout;

mod error;

pub use block_dev::BlockDevice;

pub use self::{
    error::{Error, Result},
    handle::Fd,
    layout::{BlockId, SuperBlock},
    sfs::SimpleFileSystem,
};

pub const MAGIC: u32 = 0xACBD_0005;
pub const BLOCK_SIZE: usize = 1024;
/// 卷的总块数
pub const BLOCK_COUNT: usize = 4096;

/// 索引节点表占据的块数
pub const INODE_AREA_BLOCKS: usize = 7;
/// 目录表占据的块数
pub const DIR_AREA_BLOCKS: usize = 3;
/// 空闲块位图占据的块数，位于卷的末尾
pub const BITMAP_BLOCKS: usize = 16;

/// 索引节点数与目录项数相同
pub const INODE_COUNT: usize = 126;
/// 同时打开的文件数上限
pub const MAX_OPEN_FILES: usize = 16;
/// 文件名最长字节数，不含结尾的 \0
pub const NAME_MAX_LEN: usize = 15;

/// 直接索引个数
pub const DIRECT_COUNT: usize = 12;
/// 间接索引块的编号容量
pub const INDIRECT_COUNT: usize = BLOCK_SIZE / core::mem::size_of::<u32>();
/// 单个文件最多占用的数据块数
pub const MAX_FILE_BLOCKS: usize = DIRECT_COUNT + INDIRECT_COUNT;
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * BLOCK_SIZE;

type DataBlock = [u8; BLOCK_SIZE];
