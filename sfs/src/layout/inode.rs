//! 索引节点与块索引
//!
//! - 直接索引：inode 内的 [`DIRECT_COUNT`] 个块编号，各指向一个**数据块**
//! - 间接索引：inode 内的一个块编号，指向一个**间接索引块**，
//!   整个块连续存储 [`INDIRECT_COUNT`] 个块编号，每个编号都指向一个数据块
//!
//! ## 块索引编码
//!
//! 文件的第 b 个逻辑块：b 小于直接索引个数时取直接索引 b，
//! 否则取间接索引块内的第 b - [`DIRECT_COUNT`] 项。

use alloc::sync::Arc;
use alloc::vec::Vec;

use block_dev::BlockDevice;

use super::{Area, BlockId, BlockPtr, Bitmap, Pod, read_block, write_block};
use crate::{
    BLOCK_COUNT, DIRECT_COUNT, INDIRECT_COUNT, INODE_AREA_BLOCKS, INODE_COUNT, MAX_FILE_SIZE,
    Error, Result,
};

/// 间接索引块
pub type IndirectBlock = [BlockPtr; INDIRECT_COUNT];

/// 空闲 inode 的`size`
const FREE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DiskInode {
    /// 文件字节数，不用usize是为了严控布局
    size: u32,
    /// 直接索引，存储容量：DIRECT_COUNT * BLOCK_SIZE 字节
    direct: [BlockPtr; DIRECT_COUNT],
    /// 指向间接索引块
    indirect: BlockPtr,
}

unsafe impl Pod for DiskInode {}

impl DiskInode {
    pub const FREE: Self = Self {
        size: FREE,
        direct: [BlockPtr::NULL; DIRECT_COUNT],
        indirect: BlockPtr::NULL,
    };

    #[inline]
    pub fn init(&mut self) {
        *self = Self {
            size: 0,
            ..Self::FREE
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.size == FREE
    }

    #[inline]
    pub fn size(&self) -> usize {
        debug_assert!(!self.is_free());
        self.size as usize
    }

    #[inline]
    pub fn set_size(&mut self, size: usize) {
        self.size = size as u32;
    }

    #[inline]
    pub fn indirect(&self) -> Option<BlockId> {
        self.indirect.get()
    }

    /// 检查从磁盘读入的 inode：大小不超过上限，引用的块号都落在卷内
    pub fn check(&self, block_device: &Arc<dyn BlockDevice>) -> Result<()> {
        let in_volume = |ptr: &BlockPtr| ptr.get().is_none_or(|id| usize::from(id) < BLOCK_COUNT);

        if self.size() > MAX_FILE_SIZE
            || !self.direct.iter().all(in_volume)
            || !in_volume(&self.indirect)
        {
            return Err(Error::InvalidVolume);
        }

        if let Some(indirect) = self.indirect() {
            let mut indirect_block: IndirectBlock = [BlockPtr::NULL; INDIRECT_COUNT];
            read_block(block_device, indirect, &mut indirect_block)?;
            if !indirect_block.iter().all(in_volume) {
                return Err(Error::InvalidVolume);
            }
        }
        Ok(())
    }

    /// 清空 inode，返回它占据的全部块：先是数据块，最后是间接索引块(若已分配)。
    ///
    /// 按指针而非文件大小收集，未写完的请求遗留的块同样会被回收。
    pub fn clear(&mut self, block_device: &Arc<dyn BlockDevice>) -> Result<Vec<BlockId>> {
        let mut blocks: Vec<BlockId> = self.direct.iter().filter_map(|ptr| ptr.get()).collect();

        if let Some(indirect) = self.indirect() {
            let mut indirect_block: IndirectBlock = [BlockPtr::NULL; INDIRECT_COUNT];
            read_block(block_device, indirect, &mut indirect_block)?;
            blocks.extend(indirect_block.iter().filter_map(|ptr| ptr.get()));
            blocks.push(indirect);
        }

        *self = Self::FREE;
        Ok(blocks)
    }
}

/// 索引节点表，inode 0 属于根目录
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct InodeTable {
    inodes: [DiskInode; INODE_COUNT],
}

unsafe impl Pod for InodeTable {}

impl Area for InodeTable {
    const START: usize = 1;
    const BLOCKS: usize = INODE_AREA_BLOCKS;
}

impl InodeTable {
    pub const fn new() -> Self {
        Self {
            inodes: [DiskInode::FREE; INODE_COUNT],
        }
    }

    /// 分配第一个空闲 inode 并返回其ID
    pub fn alloc(&mut self) -> Option<usize> {
        let id = self.inodes.iter().position(DiskInode::is_free)?;
        self.inodes[id].init();
        Some(id)
    }

    #[inline]
    pub fn get(&self, id: usize) -> &DiskInode {
        &self.inodes[id]
    }

    #[inline]
    pub fn get_mut(&mut self, id: usize) -> &mut DiskInode {
        &mut self.inodes[id]
    }
}

/// 一次读写请求内的地址转换：逻辑块索引 -> 物理块号
///
/// 间接索引块至多从磁盘加载一次，之后在内存中修改，
/// 请求结束时由 [`BlockMapper::sync`] 一并写回。
pub struct BlockMapper<'a> {
    inode: &'a mut DiskInode,
    block_device: &'a Arc<dyn BlockDevice>,
    /// 已加载的间接索引块
    indirect: Option<IndirectBlock>,
    /// 间接索引块是否为脏块
    modified: bool,
}

impl<'a> BlockMapper<'a> {
    pub fn new(inode: &'a mut DiskInode, block_device: &'a Arc<dyn BlockDevice>) -> Self {
        Self {
            inode,
            block_device,
            indirect: None,
            modified: false,
        }
    }

    /// 查找逻辑块对应的物理块，未分配则返回空
    pub fn get(&mut self, block_index: usize) -> Result<Option<BlockId>> {
        if block_index < DIRECT_COUNT {
            return Ok(self.inode.direct[block_index].get());
        }

        let Some(indirect) = self.inode.indirect.get() else {
            return Ok(None);
        };
        Ok(self.load(indirect)?[block_index - DIRECT_COUNT].get())
    }

    /// 查找逻辑块对应的物理块，未分配则从位图中分配
    pub fn get_or_alloc(&mut self, block_index: usize, bitmap: &mut Bitmap) -> Result<BlockId> {
        if block_index < DIRECT_COUNT {
            let slot = &mut self.inode.direct[block_index];
            if let Some(id) = slot.get() {
                return Ok(id);
            }
            let id = bitmap.alloc().ok_or(Error::NoSpace)?;
            *slot = id.into();
            return Ok(id);
        }

        let indirect = match self.inode.indirect.get() {
            Some(indirect) => indirect,
            None => {
                // 首次越过直接索引，创建间接索引块
                let indirect = bitmap.alloc().ok_or(Error::NoSpace)?;
                self.inode.indirect = indirect.into();
                let indirect_block = [BlockPtr::NULL; INDIRECT_COUNT];
                write_block(self.block_device, indirect, &indirect_block)?;
                self.indirect = Some(indirect_block);
                indirect
            }
        };

        // 剔去直接索引的部分
        let index = block_index - DIRECT_COUNT;
        if let Some(id) = self.load(indirect)?[index].get() {
            return Ok(id);
        }
        let id = bitmap.alloc().ok_or(Error::NoSpace)?;
        self.load(indirect)?[index] = id.into();
        self.modified = true;
        Ok(id)
    }

    /// 写回修改过的间接索引块
    pub fn sync(self) -> Result<()> {
        match (self.inode.indirect.get(), &self.indirect) {
            (Some(id), Some(indirect_block)) if self.modified => {
                write_block(self.block_device, id, indirect_block)
            }
            _ => Ok(()),
        }
    }

    fn load(&mut self, id: BlockId) -> Result<&mut IndirectBlock> {
        let indirect_block = match self.indirect.take() {
            Some(indirect_block) => indirect_block,
            None => {
                let mut indirect_block = [BlockPtr::NULL; INDIRECT_COUNT];
                read_block(self.block_device, id, &mut indirect_block)?;
                indirect_block
            }
        };
        Ok(self.indirect.insert(indirect_block))
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use block_dev::RamDisk;

    use super::*;
    use crate::{BLOCK_COUNT, BLOCK_SIZE};

    fn device() -> Arc<dyn BlockDevice> {
        Arc::new(RamDisk::new(BLOCK_SIZE, BLOCK_COUNT))
    }

    #[test]
    fn first_free_inode() {
        let mut table = InodeTable::new();
        assert_eq!(Some(0), table.alloc());
        assert_eq!(Some(1), table.alloc());
        assert_eq!(0, table.get(1).size());

        *table.get_mut(0) = DiskInode::FREE;
        assert_eq!(Some(0), table.alloc());
    }

    #[test]
    fn inode_table_is_bounded() {
        let mut table = InodeTable::new();
        for _ in 0..INODE_COUNT {
            assert!(table.alloc().is_some());
        }
        assert_eq!(None, table.alloc());
    }

    #[test]
    fn direct_then_indirect() {
        let dev = device();
        let mut bitmap = Bitmap::new();
        let mut inode = DiskInode::FREE;
        inode.init();

        let mut mapper = BlockMapper::new(&mut inode, &dev);
        for index in 0..DIRECT_COUNT {
            assert_eq!(BlockId::new(index as u32), mapper.get_or_alloc(index, &mut bitmap).unwrap());
        }
        assert_eq!(None, mapper.get(DIRECT_COUNT).unwrap());

        // 间接索引块先于它指向的数据块分配
        let data = mapper.get_or_alloc(DIRECT_COUNT + 1, &mut bitmap).unwrap();
        assert_eq!(BlockId::new(DIRECT_COUNT as u32 + 1), data);
        assert_eq!(Some(data), mapper.get(DIRECT_COUNT + 1).unwrap());
        assert_eq!(None, mapper.get(DIRECT_COUNT).unwrap());
        mapper.sync().unwrap();

        assert_eq!(Some(BlockId::new(DIRECT_COUNT as u32)), inode.indirect());

        // 重新加载时能从磁盘上读到写回的间接索引块
        let mut mapper = BlockMapper::new(&mut inode, &dev);
        assert_eq!(Some(data), mapper.get(DIRECT_COUNT + 1).unwrap());
        assert_eq!(
            data,
            mapper.get_or_alloc(DIRECT_COUNT + 1, &mut bitmap).unwrap()
        );
    }

    #[test]
    fn clear_collects_every_block() {
        let dev = device();
        let mut bitmap = Bitmap::new();
        let mut inode = DiskInode::FREE;
        inode.init();

        let mut mapper = BlockMapper::new(&mut inode, &dev);
        mapper.get_or_alloc(0, &mut bitmap).unwrap();
        mapper.get_or_alloc(DIRECT_COUNT + 3, &mut bitmap).unwrap();
        mapper.sync().unwrap();

        let blocks = inode.clear(&dev).unwrap();
        // 数据块 0、间接索引块 1、数据块 2
        assert_eq!(
            std::vec![BlockId::new(0), BlockId::new(2), BlockId::new(1)],
            blocks
        );
        assert!(inode.is_free());
        assert_eq!(None, inode.indirect());
    }

    #[test]
    fn clear_without_indirect() {
        let dev = device();
        let mut inode = DiskInode::FREE;
        inode.init();
        assert!(inode.clear(&dev).unwrap().is_empty());
    }

    #[test]
    fn check_pointers_and_size() {
        let dev = device();
        let mut bitmap = Bitmap::new();
        let mut inode = DiskInode::FREE;
        inode.init();

        let mut mapper = BlockMapper::new(&mut inode, &dev);
        mapper.get_or_alloc(DIRECT_COUNT, &mut bitmap).unwrap();
        mapper.sync().unwrap();
        assert_eq!(Ok(()), inode.check(&dev));

        let mut oversize = inode;
        oversize.set_size(MAX_FILE_SIZE + 1);
        assert_eq!(Err(Error::InvalidVolume), oversize.check(&dev));

        let mut bad_direct = inode;
        bad_direct.direct[3] = BlockId::new(BLOCK_COUNT as u32).into();
        assert_eq!(Err(Error::InvalidVolume), bad_direct.check(&dev));

        // 间接索引块 0 里的第一项指向卷外
        let mut indirect_block = [BlockPtr::NULL; INDIRECT_COUNT];
        indirect_block[0] = BlockId::new(u32::MAX - 1).into();
        write_block(&dev, BlockId::new(0), &indirect_block).unwrap();
        assert_eq!(Err(Error::InvalidVolume), inode.check(&dev));
    }

    #[test]
    fn out_of_space() {
        let dev = device();
        let mut bitmap = Bitmap::new();
        bitmap.reserve(0..BLOCK_COUNT);
        let mut inode = DiskInode::FREE;
        inode.init();

        let mut mapper = BlockMapper::new(&mut inode, &dev);
        assert_eq!(Err(Error::NoSpace), mapper.get_or_alloc(0, &mut bitmap));
        assert_eq!(Err(Error::NoSpace), mapper.get_or_alloc(DIRECT_COUNT, &mut bitmap));
        mapper.sync().unwrap();
        assert_eq!(None, inode.indirect());
    }
}
