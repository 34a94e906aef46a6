use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 魔数不符、容量越界或元数据块不可读，挂载失败
    Format,
    /// 设备容纳不下元数据块与至少一个数据块
    DeviceTooSmall,
    /// 没有空闲 inode、没有空闲数据块，或文件将超出直接索引的容量
    SpaceExhausted,
    NotFound,
    /// 磁盘上的记录自相矛盾
    Corruption,
    AlreadyExists,
    InvalidName,
    IsADirectory,
    NotADirectory,
    Io(block_dev::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

impl From<block_dev::Error> for Error {
    #[inline]
    fn from(err: block_dev::Error) -> Self {
        Self::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format => f.write_str("not a valid arcofs image"),
            Self::DeviceTooSmall => f.write_str("device too small for arcofs"),
            Self::SpaceExhausted => f.write_str("no space left on device"),
            Self::NotFound => f.write_str("no such file"),
            Self::Corruption => f.write_str("filesystem metadata is corrupted"),
            Self::AlreadyExists => f.write_str("file exists"),
            Self::InvalidName => f.write_str("invalid file name"),
            Self::IsADirectory => f.write_str("is a directory"),
            Self::NotADirectory => f.write_str("not a directory"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}
