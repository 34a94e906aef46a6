//! 测试用的内存块设备

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use arco_fs::{ArcoFileSystem, BLOCK_SIZE, BlockDevice, Directory};
use block_dev::Error;

pub struct RamDisk {
    blocks: Mutex<Vec<[u8; BLOCK_SIZE]>>,
    /// 置位后所有写入都失败
    broken: AtomicBool,
    /// 读这一块总是失败，`usize::MAX` 表示没有
    unreadable: AtomicUsize,
}

impl RamDisk {
    pub fn new(num_blocks: usize) -> Arc<Self> {
        Arc::new(Self {
            blocks: Mutex::new(vec![[0; BLOCK_SIZE]; num_blocks]),
            broken: AtomicBool::new(false),
            unreadable: AtomicUsize::new(usize::MAX),
        })
    }

    /// 直接读取设备上的块，绕过文件系统缓存
    pub fn raw(&self, block_id: usize) -> [u8; BLOCK_SIZE] {
        self.blocks.lock().unwrap()[block_id]
    }

    pub fn patch(&self, block_id: usize, offset: usize, bytes: &[u8]) {
        self.blocks.lock().unwrap()[block_id][offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }

    pub fn set_unreadable(&self, block_id: Option<usize>) {
        self.unreadable
            .store(block_id.unwrap_or(usize::MAX), Ordering::SeqCst);
    }
}

impl BlockDevice for RamDisk {
    fn num_blocks(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error> {
        if self.unreadable.load(Ordering::SeqCst) == block_id {
            return Err(Error::Io { block_id });
        }
        let blocks = self.blocks.lock().unwrap();
        let block = blocks.get(block_id).ok_or(Error::OutOfRange { block_id })?;
        buf.copy_from_slice(block);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::Io { block_id });
        }
        let mut blocks = self.blocks.lock().unwrap();
        let block = blocks
            .get_mut(block_id)
            .ok_or(Error::OutOfRange { block_id })?;
        block.copy_from_slice(buf);
        Ok(())
    }
}

pub type Fs = Arc<spin::Mutex<ArcoFileSystem>>;

/// 格式化一张新盘并返回根目录
pub fn fresh(num_blocks: usize) -> (Arc<RamDisk>, Fs, Directory) {
    let disk = RamDisk::new(num_blocks);
    let afs = ArcoFileSystem::format(disk.clone()).unwrap();
    let root = ArcoFileSystem::root_inode(&afs);
    (disk, afs, root)
}

/// 超级块的空闲计数必须与字节图一致
pub fn assert_counts_consistent(afs: &Fs) {
    let mut fs = afs.lock();
    let stat = fs.statfs();
    let (free_inodes, free_blocks) = fs.count_free().unwrap();
    assert_eq!(stat.free_inodes, free_inodes as u64);
    assert_eq!(stat.free_blocks, free_blocks as u64);
}

/// 可预测的测试数据
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}
