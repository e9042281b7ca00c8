use super::{Area, Pod};
use crate::{DIR_AREA_BLOCKS, INODE_AREA_BLOCKS, INODE_COUNT, NAME_MAX_LEN, Error, Result};

/// 空闲目录项的 inode 编号
const NO_INODE: u32 = u32::MAX;

/// 文件系统项的元信息
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DirEntry {
    /// 非零表示已使用
    used: u32,
    inode_id: u32,
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
}

unsafe impl Pod for DirEntry {}

impl DirEntry {
    pub const EMPTY: Self = Self {
        used: 0,
        inode_id: NO_INODE,
        name: [0; NAME_MAX_LEN + 1],
    };

    /// `name`须事先经过 [`validate_name`] 检查
    pub fn new(name: &str, inode_id: usize) -> Self {
        let bytes = name.as_bytes();
        let mut entry = Self {
            used: 1,
            inode_id: inode_id as u32,
            ..Self::EMPTY
        };
        entry.name[..bytes.len()].copy_from_slice(bytes);
        entry
    }

    #[inline]
    pub fn is_used(&self) -> bool {
        self.used != 0
    }

    #[inline]
    pub fn inode_id(&self) -> Option<usize> {
        (self.inode_id != NO_INODE).then_some(self.inode_id as usize)
    }

    /// 名字的字节，到第一个 \0 为止
    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.name.len());
        &self.name[..len]
    }
}

/// 检查文件名能否放进目录项
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.bytes().any(|c| c == 0) {
        return Err(Error::InvalidName);
    }
    if name.len() > NAME_MAX_LEN {
        return Err(Error::NameTooLong);
    }
    Ok(())
}

/// 目录表：扁平的名字空间，线性查找
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct DirTable {
    entries: [DirEntry; INODE_COUNT],
}

unsafe impl Pod for DirTable {}

impl Area for DirTable {
    const START: usize = 1 + INODE_AREA_BLOCKS;
    const BLOCKS: usize = DIR_AREA_BLOCKS;
}

impl DirTable {
    /// 根目录独占的槽位
    pub const ROOT: usize = 0;

    pub const fn new() -> Self {
        Self {
            entries: [DirEntry::EMPTY; INODE_COUNT],
        }
    }

    /// 槽位 0 绑定根目录，名字为空
    pub fn init_root(&mut self, root_inode: usize) {
        self.entries[Self::ROOT] = DirEntry {
            used: 1,
            inode_id: root_inode as u32,
            ..DirEntry::EMPTY
        };
    }

    /// 按名字查找，返回第一个匹配项的槽位与 inode 编号。
    /// 根目录不参与匹配。
    pub fn find(&self, name: &str) -> Option<(usize, usize)> {
        self.entries
            .iter()
            .enumerate()
            .skip(Self::ROOT + 1)
            .filter(|(_, entry)| entry.is_used())
            .find(|(_, entry)| entry.name() == name.as_bytes())
            .and_then(|(slot, entry)| entry.inode_id().map(|inode_id| (slot, inode_id)))
    }

    /// 第一个空槽位
    pub fn free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|entry| !entry.is_used())
    }

    #[inline]
    pub fn insert(&mut self, slot: usize, name: &str, inode_id: usize) {
        debug_assert!(!self.entries[slot].is_used());
        self.entries[slot] = DirEntry::new(name, inode_id);
    }

    /// 清空槽位，不压缩目录表
    #[inline]
    pub fn remove(&mut self, slot: usize) {
        self.entries[slot] = DirEntry::EMPTY;
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<&DirEntry> {
        self.entries.get(slot)
    }
}
