//! # 索引节点层
//!
//! 交给宿主使用的文件句柄，确立了文件系统的操作逻辑。
//! 命名空间是扁平的：inode 表本身就是唯一的目录，
//! 不存在单独的目录项结构。
//!
//! 句柄按类型分为两种：[`Directory`] 只能查找、列举、创建与删除，
//! [`RegularFile`] 只能读写。每个操作都在文件系统锁内完成。

use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;
use vfs::{DirEntry, DirEntryType, Stat};

use crate::layout::{DiskInode, DiskInodeKind};
use crate::{ArcoFileSystem, BLOCK_SIZE, Error, Result};

/// 按类型打开的 inode
pub enum Inode {
    File(RegularFile),
    Directory(Directory),
}

impl Inode {
    #[inline]
    pub fn inode_id(&self) -> u32 {
        match self {
            Self::File(file) => file.inode_id,
            Self::Directory(dir) => dir.inode_id,
        }
    }

    #[inline]
    pub fn kind(&self) -> DirEntryType {
        match self {
            Self::File(_) => DirEntryType::Regular,
            Self::Directory(_) => DirEntryType::Directory,
        }
    }

    pub fn into_file(self) -> Result<RegularFile> {
        match self {
            Self::File(file) => Ok(file),
            Self::Directory(_) => Err(Error::IsADirectory),
        }
    }

    pub fn into_dir(self) -> Result<Directory> {
        match self {
            Self::File(_) => Err(Error::NotADirectory),
            Self::Directory(dir) => Ok(dir),
        }
    }

    pub fn stat(&self) -> Result<Stat> {
        match self {
            Self::File(file) => file.stat(),
            Self::Directory(dir) => dir.stat(),
        }
    }
}

#[derive(Clone)]
pub struct Directory {
    inode_id: u32,
    fs: Arc<Mutex<ArcoFileSystem>>,
}

impl Directory {
    #[inline]
    pub(crate) fn new(inode_id: u32, fs: Arc<Mutex<ArcoFileSystem>>) -> Self {
        Self { inode_id, fs }
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }

    /// 创建普通文件，同名项已存在时拒绝。
    /// 写回失败时撤销分配，名字不会留下。
    pub fn create(&self, name: &str) -> Result<RegularFile> {
        DiskInode::check_name(name)?;
        let mut fs = self.fs.lock();

        // 确认没有已创建的同名项
        match lookup(&mut fs, name) {
            Ok(_) => return Err(Error::AlreadyExists),
            Err(Error::NotFound) => {}
            Err(err) => return Err(err),
        }

        let inode_id = fs.transact(|fs| fs.alloc_inode(name))?;

        Ok(RegularFile::new(inode_id, self.fs.clone()))
    }

    /// 根据文件名获取 inode 编号
    pub fn lookup(&self, name: &str) -> Result<u32> {
        lookup(&mut self.fs.lock(), name)
    }

    /// 根据文件名打开 inode
    pub fn find(&self, name: &str) -> Result<Inode> {
        let inode_id = self.lookup(name)?;
        ArcoFileSystem::inode(&self.fs, inode_id)
    }

    /// 删除普通文件，回收其数据块与 inode。
    /// 失败时什么都不改变，文件仍可查到、读到。
    pub fn unlink(&self, name: &str) -> Result<()> {
        let mut fs = self.fs.lock();

        let inode_id = lookup(&mut fs, name)?;
        let mut disk_inode = fs.disk_inode(inode_id)?;
        if disk_inode.is_dir() {
            return Err(Error::IsADirectory);
        }

        fs.transact(|fs| {
            disk_inode.truncate(fs)?;
            fs.dealloc_inode(inode_id)
        })?;

        log::debug!("unlinked {name:?} (inode {inode_id})");
        Ok(())
    }

    /// 从槽位 `at` 起读取至多 `count` 个目录项，并返回下一次读取的位置。
    ///
    /// `at` 不小于表长时返回空。
    pub fn ls_at(&self, at: usize, count: usize) -> Result<(Vec<DirEntry>, usize)> {
        let mut fs = self.fs.lock();
        let inodes = fs.super_block().inodes as usize;

        let mut entries = Vec::with_capacity(count.min(inodes));
        let mut pos = at;
        while pos < inodes && entries.len() < count {
            let inode_id = pos as u32 + 1;
            let disk_inode = fs.disk_inode(inode_id)?;
            pos += 1;

            let ty = match disk_inode.kind {
                DiskInodeKind::Empty => continue,
                DiskInodeKind::File => DirEntryType::Regular,
                DiskInodeKind::Directory => DirEntryType::Directory,
            };
            entries.push(DirEntry {
                inode: inode_id as u64,
                ty,
                name: disk_inode.name()?.to_string(),
            });
        }

        Ok((entries, pos))
    }

    /// 从头开始的一次性列举
    #[inline]
    pub fn list(&self) -> Listing {
        Listing {
            dir: self.clone(),
            pos: 0,
            done: false,
        }
    }

    pub fn stat(&self) -> Result<Stat> {
        stat(&mut self.fs.lock(), self.inode_id)
    }
}

/// 目录的惰性列举，每次向前推进一个目录项
pub struct Listing {
    dir: Directory,
    pos: usize,
    done: bool,
}

impl Listing {
    /// 下一次读取的槽位
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl Iterator for Listing {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.dir.ls_at(self.pos, 1) {
            Ok((mut entries, next)) => {
                self.pos = next;
                let entry = entries.pop();
                self.done = entry.is_none();
                entry.map(Ok)
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[derive(Clone)]
pub struct RegularFile {
    inode_id: u32,
    fs: Arc<Mutex<ArcoFileSystem>>,
}

impl RegularFile {
    #[inline]
    pub(crate) fn new(inode_id: u32, fs: Arc<Mutex<ArcoFileSystem>>) -> Self {
        Self { inode_id, fs }
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }

    pub fn size(&self) -> Result<usize> {
        let mut fs = self.fs.lock();
        Ok(self.on_disk(&mut fs)?.size as usize)
    }

    /// 从 `offset` 起读出数据填充 `buf`，返回读到的字节数；越过文件尾时为 0
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let mut fs = self.fs.lock();
        let disk_inode = self.on_disk(&mut fs)?;
        disk_inode.read_at(offset, buf, &mut fs)
    }

    /// 从头读出整个文件
    pub fn read_to_end(&self) -> Result<Vec<u8>> {
        let mut fs = self.fs.lock();
        let disk_inode = self.on_disk(&mut fs)?;

        let mut buf = vec![0; disk_inode.size as usize];
        let read_size = disk_inode.read_at(0, &mut buf, &mut fs)?;
        debug_assert_eq!(read_size, buf.len());

        Ok(buf)
    }

    /// 写入 `buf`：`append` 时接在文件尾，否则先截断再写。
    ///
    /// 超出容量时返回 [`Error::SpaceExhausted`]，此前已提交的块保留。
    pub fn write(&self, buf: &[u8], append: bool) -> Result<usize> {
        let mut fs = self.fs.lock();
        let mut disk_inode = self.on_disk(&mut fs)?;

        let written = disk_inode.write(buf, append, &mut fs);
        // 无论成败都写回：部分提交的大小也要落盘
        fs.write_disk_inode(self.inode_id, &disk_inode)?;
        fs.sync()?;

        written
    }

    /// 截断为空文件，失败时保持原样
    pub fn truncate(&self) -> Result<()> {
        let mut fs = self.fs.lock();
        let mut disk_inode = self.on_disk(&mut fs)?;

        fs.transact(|fs| {
            disk_inode.truncate(fs)?;
            fs.write_disk_inode(self.inode_id, &disk_inode)
        })
    }

    pub fn stat(&self) -> Result<Stat> {
        stat(&mut self.fs.lock(), self.inode_id)
    }

    /// 读出磁盘上的记录，确认它仍是普通文件
    fn on_disk(&self, fs: &mut ArcoFileSystem) -> Result<DiskInode> {
        let disk_inode = fs.disk_inode(self.inode_id)?;
        match disk_inode.kind {
            DiskInodeKind::File => Ok(disk_inode),
            DiskInodeKind::Directory => Err(Error::IsADirectory),
            DiskInodeKind::Empty => Err(Error::NotFound),
        }
    }
}

/// 线性扫描整张 inode 表，第一个同名项胜出
fn lookup(fs: &mut ArcoFileSystem, name: &str) -> Result<u32> {
    let inodes = fs.super_block().inodes;
    for inode_id in 1..=inodes {
        if fs.disk_inode(inode_id)?.name_matches(name) {
            return Ok(inode_id);
        }
    }

    Err(Error::NotFound)
}

fn stat(fs: &mut ArcoFileSystem, inode_id: u32) -> Result<Stat> {
    let disk_inode = fs.disk_inode(inode_id)?;
    let mode = match disk_inode.kind {
        DiskInodeKind::Empty => return Err(Error::NotFound),
        DiskInodeKind::File => DirEntryType::Regular,
        DiskInodeKind::Directory => DirEntryType::Directory,
    };

    Ok(Stat {
        inode: inode_id as u64,
        mode,
        block_size: BLOCK_SIZE as u64,
        blocks: disk_inode.data_blocks().count() as u64,
        size: disk_inode.size as u64,
    })
}
