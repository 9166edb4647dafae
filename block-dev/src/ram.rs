use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::{BlockDevice, SECTOR_SIZE};

/// 内存盘：以一段堆内存模拟磁盘，供测试与镜像构建使用
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    sectors: usize,
}

impl RamDisk {
    /// 创建`sectors`个扇区、内容全零的内存盘
    pub fn new(sectors: usize) -> Self {
        Self {
            data: Mutex::new(vec![0; sectors * SECTOR_SIZE]),
            sectors,
        }
    }

    #[inline]
    pub fn sectors(&self) -> usize {
        self.sectors
    }

    /// 整盘内容的快照
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn range(&self, block_id: usize, len: usize) -> core::ops::Range<usize> {
        assert!(
            block_id < self.sectors,
            "sector {block_id} out of range ({} sectors)",
            self.sectors
        );
        assert_eq!(len, SECTOR_SIZE, "not a complete sector!");

        let start = block_id * SECTOR_SIZE;
        start..start + SECTOR_SIZE
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let range = self.range(block_id, buf.len());
        buf.copy_from_slice(&self.data.lock()[range]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let range = self.range(block_id, buf.len());
        self.data.lock()[range].copy_from_slice(buf);
    }
}
