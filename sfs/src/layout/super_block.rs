use super::{Area, Pod};
use crate::{BLOCK_COUNT, BLOCK_SIZE, INODE_AREA_BLOCKS, MAGIC};

/// 超级块：
/// - 记录卷的几何参数；
/// - 记录根目录的 inode
///
/// 格式化时写入一次，此后只读。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：挂载时不强制校验
    magic: u32,
    pub block_size: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub inode_area_blocks: u32,
    pub root_inode: u32,
}

unsafe impl Pod for SuperBlock {}

impl Area for SuperBlock {
    const START: usize = 0;
    const BLOCKS: usize = 1;
}

impl SuperBlock {
    #[inline]
    pub fn init(&mut self, root_inode: usize) {
        *self = Self {
            magic: MAGIC,
            block_size: BLOCK_SIZE as u32,
            total_blocks: BLOCK_COUNT as u32,
            inode_area_blocks: INODE_AREA_BLOCKS as u32,
            root_inode: root_inode as u32,
        };
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    #[inline]
    pub fn magic(&self) -> u32 {
        self.magic
    }
}
