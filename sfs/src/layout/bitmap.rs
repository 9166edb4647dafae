use alloc::vec;
use alloc::vec::Vec;

use crate::{BITS_PER_SECTOR, SECTOR_SIZE};

/// 位图，第 i 位为 1 表示第 i 个单元已分配
///
/// 位图整体常驻内存，修改后由调用者按扇区写回。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
}

impl Bitmap {
    /// 占用`sectors`个扇区的全零位图
    pub fn new(sectors: usize) -> Self {
        Self {
            bits: vec![0; sectors * SECTOR_SIZE],
        }
    }

    pub fn from_bytes(bits: Vec<u8>) -> Self {
        assert_eq!(bits.len() % SECTOR_SIZE, 0, "bitmap must fill whole sectors");
        Self { bits }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// 位图能指示的单元总数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bits.len() * 8
    }

    #[inline]
    pub fn test(&self, index: usize) -> bool {
        self.bits[index / 8] & (1 << (index % 8)) != 0
    }

    pub fn set(&mut self, index: usize, value: bool) {
        let mask = 1 << (index % 8);
        if value {
            self.bits[index / 8] |= mask;
        } else {
            self.bits[index / 8] &= !mask;
        }
    }

    /// 寻找`count`个连续的空闲位，返回编号最小的一段的起点
    pub fn scan(&self, count: usize) -> Option<usize> {
        assert!(count > 0, "scan for an empty run");

        // 先跳过全满的字节
        let byte = self.bits.iter().position(|&b| b != u8::MAX)?;
        let first = byte * 8 + self.bits[byte].trailing_ones() as usize;
        if count == 1 {
            return Some(first);
        }

        let mut run = 0;
        for index in first..self.capacity() {
            if self.test(index) {
                run = 0;
                continue;
            }

            run += 1;
            if run == count {
                return Some(index + 1 - count);
            }
        }

        None
    }

    /// 已分配的单元数
    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// `index`所在的扇区：(位图内的扇区序号, 该扇区的内容)
    pub fn sector(&self, index: usize) -> (usize, &[u8]) {
        let sector = index / BITS_PER_SECTOR;
        let start = sector * SECTOR_SIZE;
        (sector, &self.bits[start..start + SECTOR_SIZE])
    }
}
