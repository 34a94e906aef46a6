//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、镜像文件等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 块大小由上层文件系统决定，驱动只负责按块编号搬运整块数据。

#![no_std]

use core::any::Any;
use core::fmt;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 设备拥有的块数
    fn num_blocks(&self) -> usize;

    /// 读出整块数据，`buf` 的长度即块大小
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error>;

    /// 写入整块数据，`buf` 的长度即块大小
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 块编号超出设备范围
    OutOfRange { block_id: usize },
    /// 底层设备读写失败
    Io { block_id: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { block_id } => write!(f, "block {block_id} is out of range"),
            Self::Io { block_id } => write!(f, "I/O error on block {block_id}"),
        }
    }
}
