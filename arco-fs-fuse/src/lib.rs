//! 在宿主机上制作 arcofs 镜像：以普通文件或块设备作镜像，格式化并打包宿主文件。


use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arco_fs::{
    ArcoFileSystem, BLOCK_SIZE, BlockDevice, Directory, MAX_FILE_SIZE, MIN_DEVICE_SIZE,
};
use block_dev::Error;

/// 以宿主文件模拟的块设备，文件尾不足一块的部分不可用
#[derive(Debug)]
pub struct BlockFile {
    file: Mutex<File>,
    blocks: usize,
}

impl BlockFile {
    pub fn new(mut file: File) -> io::Result<Self> {
        let len = device_len(&mut file)? as usize;
        Ok(Self {
            file: Mutex::new(file),
            blocks: len / BLOCK_SIZE,
        })
    }

    fn seek(&self, file: &mut File, block_id: usize) -> Result<(), Error> {
        if block_id >= self.blocks {
            return Err(Error::OutOfRange { block_id });
        }
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .map_err(|err| io_error(block_id, err))?;
        Ok(())
    }
}

impl BlockDevice for BlockFile {
    fn num_blocks(&self) -> usize {
        self.blocks
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), Error> {
        let mut file = self.file.lock().map_err(|_| Error::Io { block_id })?;
        self.seek(&mut file, block_id)?;
        file.read_exact(buf).map_err(|err| io_error(block_id, err))
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), Error> {
        let mut file = self.file.lock().map_err(|_| Error::Io { block_id })?;
        self.seek(&mut file, block_id)?;
        file.write_all(buf).map_err(|err| io_error(block_id, err))
    }
}

/// 块设备的元数据长度为 0，只能靠定位到末尾得知容量
fn device_len(file: &mut File) -> io::Result<u64> {
    let len = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;
    Ok(len)
}

/// 普通文件与块设备都可以作镜像
fn is_image(file_type: fs::FileType) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_block_device() {
            return true;
        }
    }
    file_type.is_file()
}

fn io_error(block_id: usize, err: io::Error) -> Error {
    log::error!("block {block_id}: {err}");
    Error::Io { block_id }
}

#[derive(Debug)]
pub enum MkfsError {
    Io(io::Error),
    Fs(arco_fs::Error),
    NotAFile(PathBuf),
    TooSmall { len: u64 },
    BadName(PathBuf),
}

impl From<io::Error> for MkfsError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<arco_fs::Error> for MkfsError {
    fn from(err: arco_fs::Error) -> Self {
        Self::Fs(err)
    }
}

impl fmt::Display for MkfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Fs(err) => write!(f, "{err}"),
            Self::NotAFile(path) => {
                write!(f, "{} is neither a regular file nor a block device", path.display())
            }
            Self::TooSmall { len } => {
                write!(f, "image too small: {len} bytes, at least {MIN_DEVICE_SIZE} required")
            }
            Self::BadName(path) => write!(f, "cannot name {} inside the image", path.display()),
        }
    }
}

impl std::error::Error for MkfsError {}

pub type Fs = Arc<spin::Mutex<ArcoFileSystem>>;

/// 格式化镜像。给出 `size` 时先创建文件或调整为该长度，否则镜像必须已存在。
pub fn format_image(path: &Path, size: Option<u64>) -> Result<Fs, MkfsError> {
    let mut file = match size {
        Some(size) => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?;
            file.set_len(size)?;
            file
        }
        None => OpenOptions::new().read(true).write(true).open(path)?,
    };

    if !is_image(file.metadata()?.file_type()) {
        return Err(MkfsError::NotAFile(path.to_owned()));
    }
    let len = device_len(&mut file)?;
    if len < MIN_DEVICE_SIZE as u64 {
        return Err(MkfsError::TooSmall { len });
    }

    let block_file = Arc::new(BlockFile::new(file)?);
    Ok(ArcoFileSystem::format(block_file)?)
}

/// 打开已有镜像
pub fn open_image(path: &Path) -> Result<Fs, MkfsError> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let block_file = Arc::new(BlockFile::new(file)?);
    Ok(ArcoFileSystem::open(block_file)?)
}

/// 把宿主文件按文件名逐个拷入根目录。
/// 某个文件写不进去时，它在镜像里的项会被删掉，不留下空文件。
pub fn pack(root: &Directory, files: &[PathBuf]) -> Result<(), MkfsError> {
    for path in files {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| MkfsError::BadName(path.clone()))?;

        let data = fs::read(path)?;
        if data.len() > MAX_FILE_SIZE {
            log::error!("{name:?} has {} bytes, at most {MAX_FILE_SIZE} fit", data.len());
            return Err(MkfsError::Fs(arco_fs::Error::SpaceExhausted));
        }

        let file = root.create(name).map_err(|err| match err {
            arco_fs::Error::InvalidName => MkfsError::BadName(path.clone()),
            err => MkfsError::Fs(err),
        })?;
        if let Err(err) = file.write(&data, true) {
            if let Err(unlink_err) = root.unlink(name) {
                log::error!("unable to remove partial {name:?}: {unlink_err}");
            }
            return Err(err.into());
        }

        log::info!("packed {name:?}: {} bytes", data.len());
    }

    Ok(())
}
