use crate::block_cache::BlockCacheManager;
use crate::{BYTEMAP_CAP, Error, Result};

/// 字节图的一项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Slot {
    /// 元数据块或设备之外，永不参与分配
    Reserved = 0,
    Free = 1,
    Allocated = 2,
}

impl TryFrom<u8> for Slot {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Self::Reserved),
            1 => Ok(Self::Free),
            2 => Ok(Self::Allocated),
            _ => {
                log::error!("unknown bytemap entry {byte:#x}");
                Err(Error::Corruption)
            }
        }
    }
}

/// 字节图区域，一字节记录其指示区域内一项的分配情况
#[derive(Debug)]
pub struct Bytemap {
    /// 字节图所在块
    block_id: usize,
    /// 参与扫描的项数
    capacity: usize,
}

impl Bytemap {
    #[inline]
    pub fn new(block_id: usize, capacity: usize) -> Self {
        Self {
            block_id,
            capacity: capacity.min(BYTEMAP_CAP),
        }
    }

    /// 格式化：逐项写入初始状态
    pub fn init(
        &self,
        cache: &mut BlockCacheManager,
        slot_of: impl Fn(usize) -> Slot,
    ) -> Result<()> {
        cache.get(self.block_id)?.lock().map_mut(|entries| {
            for (index, entry) in entries.iter_mut().enumerate() {
                *entry = slot_of(index) as u8;
            }
        });
        Ok(())
    }

    /// 从 `start` 起首次适配，把找到的空闲项翻转为已分配并返回其编号。
    /// 若字节图的空间用尽，则返回空。
    ///
    /// 扫描与翻转在同一次块锁内完成。
    pub fn alloc(&self, cache: &mut BlockCacheManager, start: usize) -> Result<Option<u32>> {
        let cache = cache.get(self.block_id)?;
        let mut cache = cache.lock();

        let Some(index) = first_fit(&cache.data()[..self.capacity], start)? else {
            return Ok(None);
        };

        let entry = &mut cache.data_mut()[index];
        debug_assert_eq!(*entry, Slot::Free as u8);
        *entry = Slot::Allocated as u8;

        Ok(Some(index as u32))
    }

    /// 释放一项，返回它之前的状态。
    /// 重复释放什么都不做；保留项保持保留。
    pub fn dealloc(&self, cache: &mut BlockCacheManager, index: u32) -> Result<Slot> {
        let index = index as usize;
        if index >= self.capacity {
            log::error!("bytemap index {index} out of {}", self.capacity);
            return Err(Error::Corruption);
        }

        let cache = cache.get(self.block_id)?;
        let mut cache = cache.lock();

        let prev = Slot::try_from(cache.data()[index])?;
        match prev {
            Slot::Allocated => cache.data_mut()[index] = Slot::Free as u8,
            Slot::Free => {}
            Slot::Reserved => log::warn!("refused to free reserved entry {index}"),
        }

        Ok(prev)
    }

    pub fn get(&self, cache: &mut BlockCacheManager, index: usize) -> Result<Slot> {
        if index >= self.capacity {
            return Err(Error::NotFound);
        }
        cache.get(self.block_id)?.lock().map(|entries| Slot::try_from(entries[index]))
    }

    /// 统计某种状态的项数
    pub fn count(&self, cache: &mut BlockCacheManager, slot: Slot) -> Result<usize> {
        cache.get(self.block_id)?.lock().map(|entries| {
            entries[..self.capacity]
                .iter()
                .try_fold(0, |count, &byte| -> Result<usize> {
                    Ok(count + usize::from(Slot::try_from(byte)? == slot))
                })
        })
    }
}

/// 最低编号优先的线性扫描
fn first_fit(entries: &[u8], start: usize) -> Result<Option<usize>> {
    for (index, &byte) in entries.iter().enumerate().skip(start) {
        if Slot::try_from(byte)? == Slot::Free {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use block_dev::BlockDevice;

    use super::*;

    type DevResult = core::result::Result<(), block_dev::Error>;

    /// 读出全零、写入即丢的设备
    struct Blank;

    impl BlockDevice for Blank {
        fn num_blocks(&self) -> usize {
            8
        }

        fn read_block(&self, _block_id: usize, buf: &mut [u8]) -> DevResult {
            buf.fill(0);
            Ok(())
        }

        fn write_block(&self, _block_id: usize, _buf: &[u8]) -> DevResult {
            Ok(())
        }
    }

    const R: u8 = Slot::Reserved as u8;
    const F: u8 = Slot::Free as u8;
    const A: u8 = Slot::Allocated as u8;

    #[test]
    fn lowest_free_first() {
        assert_eq!(first_fit(&[R, A, F, F], 0), Ok(Some(2)));
        assert_eq!(first_fit(&[R, A, F, F], 3), Ok(Some(3)));
    }

    #[test]
    fn exhausted() {
        assert_eq!(first_fit(&[R, A, A, R], 0), Ok(None));
        assert_eq!(first_fit(&[F, F], 2), Ok(None));
    }

    #[test]
    fn garbage_entry_is_corruption() {
        assert_eq!(first_fit(&[A, 7, F], 0), Err(Error::Corruption));
    }

    #[test]
    fn entries_past_capacity_are_out_of_range() {
        let mut cache = BlockCacheManager::new(Arc::new(Blank));
        let map = Bytemap::new(3, 16);
        map.init(&mut cache, |index| {
            if index < 16 { Slot::Free } else { Slot::Reserved }
        })
        .unwrap();

        assert_eq!(map.get(&mut cache, 15), Ok(Slot::Free));
        assert_eq!(map.get(&mut cache, 16), Err(Error::NotFound));
        assert_eq!(map.dealloc(&mut cache, 16), Err(Error::Corruption));
        assert_eq!(map.count(&mut cache, Slot::Free), Ok(16));

        assert_eq!(map.alloc(&mut cache, 15), Ok(Some(15)));
        assert_eq!(map.alloc(&mut cache, 15), Ok(None));
        assert_eq!(map.get(&mut cache, 15), Ok(Slot::Allocated));
    }
}
