use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NameTooLong,
    /// 空文件名，或名字中含有 \0
    InvalidName,
    NotFound,
    NoDirectorySpace,
    NoInodeSpace,
    NoHandleSpace,
    /// 句柄没有绑定打开的文件
    NotOpen,
    /// 空闲块耗尽
    NoSpace,
    /// 设备的几何参数与卷不符
    InvalidVolume,
    IoFailure(block_dev::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<block_dev::Error> for Error {
    #[inline]
    fn from(e: block_dev::Error) -> Self {
        Self::IoFailure(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NameTooLong => write!(f, "file name longer than {} bytes", crate::NAME_MAX_LEN),
            Error::InvalidName => f.write_str("invalid file name"),
            Error::NotFound => f.write_str("no such file"),
            Error::NoDirectorySpace => f.write_str("directory table is full"),
            Error::NoInodeSpace => f.write_str("inode table is full"),
            Error::NoHandleSpace => f.write_str("too many open files"),
            Error::NotOpen => f.write_str("file handle is not open"),
            Error::NoSpace => f.write_str("no free block left on volume"),
            Error::InvalidVolume => f.write_str("device geometry does not match the volume"),
            Error::IoFailure(e) => write!(f, "I/O failure: {e}"),
        }
    }
}

impl core::error::Error for Error {}
