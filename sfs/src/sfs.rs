//! # 文件系统层
//!
//! 构建出磁盘的布局并使用：四张元数据表常驻内存，
//! 每个修改状态的操作结束前把受影响的表写回磁盘（写穿）。

use alloc::string::String;
use alloc::sync::Arc;
use core::iter;
use core::ops::Range;

use block_dev::BlockDevice;
use enumflags2::BitFlags;

use crate::handle::{Fd, Handle, HandleTable};
use crate::layout::*;
use crate::{BLOCK_COUNT, BLOCK_SIZE, DataBlock, Error, INODE_COUNT, MAX_FILE_SIZE, Result};

/// 根目录的 inode
const ROOT_INODE: usize = 0;

pub struct SimpleFileSystem {
    block_device: Arc<dyn BlockDevice>,
    super_block: SuperBlock,
    bitmap: Bitmap,
    inodes: InodeTable,
    dir: DirTable,
    handles: HandleTable,
    /// [`SimpleFileSystem::next_filename`] 的目录游标
    dir_cursor: usize,
}

impl SimpleFileSystem {
    /// 在设备上建立全新的卷
    pub fn format(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        check_geometry(&block_device)?;

        let mut fs = Self::empty(block_device);
        for reserved in [
            SuperBlock::blocks(),
            InodeTable::blocks(),
            DirTable::blocks(),
            Bitmap::blocks(),
        ] {
            fs.bitmap.reserve(reserved);
        }

        fs.inodes.get_mut(ROOT_INODE).init();
        fs.dir.init_root(ROOT_INODE);
        fs.super_block.init(ROOT_INODE);

        fs.flush(BitFlags::all())?;
        log::debug!("formatted volume, {} blocks free", fs.free_blocks());

        Ok(fs)
    }

    /// 载入设备上已有的卷
    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        check_geometry(&block_device)?;

        let mut fs = Self::empty(block_device);
        fs.super_block.load(&fs.block_device)?;
        fs.inodes.load(&fs.block_device)?;
        fs.dir.load(&fs.block_device)?;
        fs.bitmap.load(&fs.block_device)?;

        // 信任设备，魔数不符也照常挂载
        if !fs.super_block.is_valid() {
            log::warn!("unexpected magic {:#010x}", fs.super_block.magic());
        }
        fs.check_tables()?;
        log::debug!("mounted volume, {} blocks free", fs.free_blocks());

        Ok(fs)
    }

    /// 打开文件，不存在则创建。
    ///
    /// 已存在的文件总是得到新句柄，读写指针位于文件末尾；
    /// 新文件的读写指针位于 0。
    pub fn open(&mut self, name: &str) -> Result<Fd> {
        validate_name(name)?;

        if let Some((_, inode_id)) = self.dir.find(name) {
            let size = self.inodes.get(inode_id).size();
            return self.handles.open(inode_id, size);
        }

        let slot = self.dir.free_slot().ok_or_else(|| {
            log::warn!("directory table is full");
            Error::NoDirectorySpace
        })?;
        let inode_id = self.inodes.alloc().ok_or_else(|| {
            log::warn!("inode table is full");
            Error::NoInodeSpace
        })?;
        self.dir.insert(slot, name, inode_id);
        self.flush(Region::Inodes | Region::Directory)?;
        log::debug!("created {name:?}: slot={slot}, inode={inode_id}");

        self.handles.open(inode_id, 0)
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        self.handles.close(fd)
    }

    /// 从读写指针处写入`buf`，返回写入的字节数。
    ///
    /// 超出最大文件大小的部分被截断。块分配失败时返回 [`Error::NoSpace`]，
    /// 已分配的块与已写入的数据保留，读写指针与文件大小不变。
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize> {
        let Handle { inode_id, cursor } = self.handles.get(fd)?;

        let len = buf.len().min(MAX_FILE_SIZE.saturating_sub(cursor));
        let end = cursor + len;

        let mut mapper = BlockMapper::new(self.inodes.get_mut(inode_id), &self.block_device);
        let copied = copy_in(&mut mapper, &mut self.bitmap, &self.block_device, cursor, &buf[..len]);
        let synced = mapper.sync();

        if copied.is_ok() && synced.is_ok() {
            self.handles.get_mut(fd)?.cursor = end;
            let inode = self.inodes.get_mut(inode_id);
            if end > inode.size() {
                inode.set_size(end);
            }
        }

        self.flush(Region::Bitmap | Region::Inodes)?;
        copied?;
        synced?;

        Ok(len)
    }

    /// 从读写指针处读出数据填充`buf`，返回读出的字节数；
    /// 读到文件末尾时少于`buf.len()`。
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize> {
        let Handle { inode_id, cursor } = self.handles.get(fd)?;

        let size = self.inodes.get(inode_id).size();
        let len = buf.len().min(size.saturating_sub(cursor));

        // 映射器与写路径共用，故持有`&mut DiskInode`；读路径只调用`get`，不修改 inode
        let mut mapper = BlockMapper::new(self.inodes.get_mut(inode_id), &self.block_device);
        copy_out(&mut mapper, &self.block_device, cursor, &mut buf[..len])?;

        self.handles.get_mut(fd)?.cursor = cursor + len;
        Ok(len)
    }

    /// 移动读写指针。超过文件大小则停在末尾，负数则回到开头。
    pub fn seek(&mut self, fd: Fd, offset: isize) -> Result<()> {
        let handle = self.handles.get_mut(fd)?;
        let size = self.inodes.get(handle.inode_id).size();
        handle.cursor = usize::try_from(offset).map_or(0, |offset| offset.min(size));
        Ok(())
    }

    /// 读写指针的当前位置
    pub fn tell(&self, fd: Fd) -> Result<usize> {
        self.handles.get(fd).map(|handle| handle.cursor)
    }

    /// 删除文件：关闭它的所有句柄，清零并释放它占据的全部块
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let (slot, inode_id) = self.dir.find(name).ok_or(Error::NotFound)?;

        self.dir.remove(slot);
        let closed = self.handles.close_inode(inode_id);

        let blocks = self.inodes.get_mut(inode_id).clear(&self.block_device)?;
        log::debug!(
            "removing {name:?}: inode={inode_id}, {} blocks, {closed} handles closed",
            blocks.len()
        );
        for block in blocks {
            self.dealloc_data(block)?;
        }

        self.flush(Region::Directory | Region::Bitmap | Region::Inodes)
    }

    /// 返回下一个目录项的名字。
    ///
    /// 所有调用共享同一个游标；遇到空槽位或越过目录表末尾即告结束，
    /// 此后一直返回空，直到调用 [`SimpleFileSystem::rewind_dir`]。
    pub fn next_filename(&mut self) -> Option<String> {
        let entry = self.dir.get(self.dir_cursor).filter(|entry| entry.is_used())?;
        let name = String::from_utf8_lossy(entry.name()).into_owned();
        self.dir_cursor += 1;
        Some(name)
    }

    /// 让 [`SimpleFileSystem::next_filename`] 从头开始
    #[inline]
    pub fn rewind_dir(&mut self) {
        self.dir_cursor = DirTable::ROOT + 1;
    }

    pub fn file_size(&self, name: &str) -> Result<usize> {
        self.dir
            .find(name)
            .map(|(_, inode_id)| self.inodes.get(inode_id).size())
            .ok_or(Error::NotFound)
    }

    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.bitmap.free_count()
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }
}

impl SimpleFileSystem {
    fn empty(block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            block_device,
            super_block: SuperBlock::default(),
            bitmap: Bitmap::new(),
            inodes: InodeTable::new(),
            dir: DirTable::new(),
            handles: HandleTable::new(),
            dir_cursor: DirTable::ROOT + 1,
        }
    }

    /// 把内存中的元数据表写回磁盘
    fn flush(&self, regions: BitFlags<Region>) -> Result<()> {
        for region in regions.iter() {
            match region {
                Region::SuperBlock => self.super_block.store(&self.block_device)?,
                Region::Inodes => self.inodes.store(&self.block_device)?,
                Region::Directory => self.dir.store(&self.block_device)?,
                Region::Bitmap => self.bitmap.store(&self.block_device)?,
            }
        }
        Ok(())
    }

    /// 越界的 inode 编号或块号会在之后的访问中引发恐慌，挂载时先行拒绝
    fn check_tables(&self) -> Result<()> {
        for slot in 0..INODE_COUNT {
            let Some(inode_id) = self
                .dir
                .get(slot)
                .filter(|entry| entry.is_used())
                .and_then(|entry| entry.inode_id())
            else {
                continue;
            };
            if inode_id >= INODE_COUNT || self.inodes.get(inode_id).is_free() {
                log::error!("directory slot {slot} refers to bad inode {inode_id}");
                return Err(Error::InvalidVolume);
            }
        }

        for inode_id in 0..INODE_COUNT {
            let inode = self.inodes.get(inode_id);
            if inode.is_free() {
                continue;
            }
            inode.check(&self.block_device).inspect_err(|_| {
                log::error!("inode {inode_id} is corrupt");
            })?;
        }
        Ok(())
    }

    /// 清零并释放数据块
    fn dealloc_data(&mut self, block_id: BlockId) -> Result<()> {
        let zero: DataBlock = [0; BLOCK_SIZE];
        write_block(&self.block_device, block_id, &zero)?;
        self.bitmap.dealloc(block_id);
        Ok(())
    }
}

/// 设备的块大小必须吻合，块数不能少于卷
fn check_geometry(block_device: &Arc<dyn BlockDevice>) -> Result<()> {
    if block_device.block_size() != BLOCK_SIZE || block_device.num_blocks() < BLOCK_COUNT {
        log::error!(
            "device geometry {}x{} doesn't fit the volume",
            block_device.block_size(),
            block_device.num_blocks()
        );
        return Err(Error::InvalidVolume);
    }
    Ok(())
}

/// 字节区间落在某个逻辑块内的部分
struct Segment {
    /// 逻辑块索引
    block_index: usize,
    /// 块内范围
    in_block: Range<usize>,
    /// 调用者缓冲区内的范围
    in_buf: Range<usize>,
}

/// 把字节区间`[start, end)`切分为逐块的片段，不产生空片段
fn segments(start: usize, end: usize) -> impl Iterator<Item = Segment> {
    let mut pos = start;
    iter::from_fn(move || {
        if pos >= end {
            return None;
        }

        let block_index = pos / BLOCK_SIZE;
        // 当前块的末地址(字节)
        let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
        // 绝对地址 % 块大小 = 块内偏移
        let offset = pos % BLOCK_SIZE;
        let len = current_block_end - pos;

        let segment = Segment {
            block_index,
            in_block: offset..offset + len,
            in_buf: pos - start..current_block_end - start,
        };
        pos = current_block_end;
        Some(segment)
    })
}

/// 把`buf`写到文件的`offset`处，按需分配数据块
fn copy_in(
    mapper: &mut BlockMapper<'_>,
    bitmap: &mut Bitmap,
    block_device: &Arc<dyn BlockDevice>,
    offset: usize,
    buf: &[u8],
) -> Result<()> {
    let mut data_block: DataBlock = [0; BLOCK_SIZE];
    for segment in segments(offset, offset + buf.len()) {
        let block_id = mapper.get_or_alloc(segment.block_index, bitmap)?;

        // 整块覆盖时无需先读
        if segment.in_block.len() < BLOCK_SIZE {
            read_block(block_device, block_id, &mut data_block)?;
        }
        data_block[segment.in_block].copy_from_slice(&buf[segment.in_buf]);
        write_block(block_device, block_id, &data_block)?;
    }
    Ok(())
}

/// 从文件的`offset`处读出数据填满`buf`
fn copy_out(
    mapper: &mut BlockMapper<'_>,
    block_device: &Arc<dyn BlockDevice>,
    offset: usize,
    buf: &mut [u8],
) -> Result<()> {
    let mut data_block: DataBlock = [0; BLOCK_SIZE];
    for segment in segments(offset, offset + buf.len()) {
        match mapper.get(segment.block_index)? {
            Some(block_id) => {
                read_block(block_device, block_id, &mut data_block)?;
                buf[segment.in_buf].copy_from_slice(&data_block[segment.in_block]);
            }
            // 文件大小之内不应有空洞
            None => {
                log::warn!("hole at block {} within file size", segment.block_index);
                buf[segment.in_buf].fill(0);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;

    fn collect(start: usize, end: usize) -> Vec<(usize, Range<usize>, Range<usize>)> {
        segments(start, end)
            .map(|s| (s.block_index, s.in_block, s.in_buf))
            .collect()
    }

    #[test]
    fn segments_within_one_block() {
        assert_eq!(std::vec![(0, 10..20, 0..10)], collect(10, 20));
    }

    #[test]
    fn segments_on_block_boundary() {
        // 恰好结束在块边界，不触及下一块
        assert_eq!(
            std::vec![(0, 0..1024, 0..1024), (1, 0..1024, 1024..2048)],
            collect(0, 2048)
        );
    }

    #[test]
    fn segments_unaligned() {
        assert_eq!(
            std::vec![
                (1, 1000..1024, 0..24),
                (2, 0..1024, 24..1048),
                (3, 0..10, 1048..1058)
            ],
            collect(2024, 3082)
        );
    }

    #[test]
    fn segments_empty() {
        assert!(collect(500, 500).is_empty());
    }
}
