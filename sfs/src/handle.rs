//! # 打开文件表
//!
//! 每个句柄是一次独立的会话：(inode 编号, 读写指针)。
//! 同一 inode 可以被多个句柄同时引用，各自的指针互不影响。

use derive_more::{From, Into};

use crate::{Error, MAX_OPEN_FILES, Result};

/// 文件句柄，即打开文件表的槽位号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, From, Into)]
pub struct Fd(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    pub inode_id: usize,
    /// 读写指针（字节偏移）
    pub cursor: usize,
}

#[derive(Debug)]
pub struct HandleTable {
    slots: [Option<Handle>; MAX_OPEN_FILES],
}

impl HandleTable {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_OPEN_FILES],
        }
    }

    /// 占用第一个空槽位
    pub fn open(&mut self, inode_id: usize, cursor: usize) -> Result<Fd> {
        let (fd, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(Error::NoHandleSpace)?;
        *slot = Some(Handle { inode_id, cursor });
        Ok(Fd(fd))
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        self.slots
            .get_mut(fd.0)
            .and_then(Option::take)
            .map(|_| ())
            .ok_or(Error::NotOpen)
    }

    /// 关闭所有引用`inode_id`的句柄，返回关闭的个数
    pub fn close_inode(&mut self, inode_id: usize) -> usize {
        let mut closed = 0;
        for slot in &mut self.slots {
            if slot.is_some_and(|handle| handle.inode_id == inode_id) {
                *slot = None;
                closed += 1;
            }
        }
        closed
    }

    #[inline]
    pub fn get(&self, fd: Fd) -> Result<Handle> {
        self.slots
            .get(fd.0)
            .copied()
            .flatten()
            .ok_or(Error::NotOpen)
    }

    #[inline]
    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut Handle> {
        self.slots
            .get_mut(fd.0)
            .and_then(Option::as_mut)
            .ok_or(Error::NotOpen)
    }
}
