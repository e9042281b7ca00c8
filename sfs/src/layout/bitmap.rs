use core::ops::Range;

use super::{Area, BlockId, Pod};
use crate::{BITMAP_BLOCKS, BLOCK_COUNT};

/// 位图内 bit 组的个数
const GROUPS: usize = BLOCK_COUNT / 64;

/// 空闲块位图，卷上每一块对应一位，1 表示已占用
///
/// 元数据区域在格式化时即被置位，此后永不释放。
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Bitmap {
    groups: [u64; GROUPS],
}

unsafe impl Pod for Bitmap {}

impl Area for Bitmap {
    const START: usize = BLOCK_COUNT - BITMAP_BLOCKS;
    const BLOCKS: usize = BITMAP_BLOCKS;
}

impl Bitmap {
    pub const fn new() -> Self {
        Self { groups: [0; GROUPS] }
    }

    /// 把一段块标记为已占用
    pub fn reserve(&mut self, blocks: Range<usize>) {
        for block in blocks {
            let (group_index, ingroup_index) = locate(block);
            self.groups[group_index] |= 1 << ingroup_index;
        }
    }

    /// 从最小块号开始，分配第一个空闲块。
    /// 若所有块都已占用，则返回空。
    pub fn alloc(&mut self) -> Option<BlockId> {
        // 寻找还有剩余空间的bit组(即还有0)
        let (group_index, ingroup_index) = self
            .groups
            .iter()
            .enumerate()
            .find_map(|(group_index, &bits)| {
                (bits != u64::MAX).then_some((group_index, bits.trailing_ones() as usize))
            })?;

        self.groups[group_index] |= 1 << ingroup_index;
        let id = BlockId::new((group_index * 64 + ingroup_index) as u32);
        log::trace!("alloc block {id:?}");
        Some(id)
    }

    /// 无条件释放一块
    pub fn dealloc(&mut self, id: BlockId) {
        if !self.is_used(id) {
            log::warn!("block {id:?} freed twice");
        }
        let (group_index, ingroup_index) = locate(id.into());
        self.groups[group_index] &= !(1 << ingroup_index);
    }

    #[inline]
    pub fn is_used(&self, id: BlockId) -> bool {
        let (group_index, ingroup_index) = locate(id.into());
        self.groups[group_index] & (1 << ingroup_index) != 0
    }

    pub fn free_count(&self) -> usize {
        let used: u32 = self.groups.iter().map(|bits| bits.count_ones()).sum();
        BLOCK_COUNT - used as usize
    }
}

/// 块号 -> (bit组索引, 组内索引)
#[inline]
fn locate(block: usize) -> (usize, usize) {
    (block / 64, block % 64)
}
