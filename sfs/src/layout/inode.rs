//! 索引节点的地址表
//!
//! - 直接块：前 12 个地址各指向一个数据块；
//! - 一级间接块：第 13 个地址指向一个间接块，
//!   间接块整块连续存放 128 个数据块地址。
//!
//! 目录的数据块用于存放目录项；
//! 文件的数据块用于存放它的数据。
//! 地址为 0 表示尚未分配。

use crate::SECTOR_SIZE;

/// 直接块的数量
pub const DIRECT_COUNT: usize = 12;
/// 间接块可容纳的地址数
pub const INDIRECT_COUNT: usize = SECTOR_SIZE / 4;
/// 单个 inode 可寻址的块数
pub const MAX_FILE_BLOCKS: usize = DIRECT_COUNT + INDIRECT_COUNT;

/// 间接块
pub type IndirectBlock = [u32; INDIRECT_COUNT];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DiskInode {
    pub no: u32,
    /// 文件为字节数，目录为所有目录项大小之和
    pub size: u32,
    /// 12 个直接块地址，最后一个为间接块地址
    sectors: [u32; DIRECT_COUNT + 1],
}

/// 逻辑块在地址表中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSlot {
    /// 直接块，下标位于`0..12`
    Direct(usize),
    /// 间接块内的下标，位于`0..128`
    Indirect(usize),
}

impl BlockSlot {
    /// 第`index`个逻辑块的位置，超出寻址范围时返回空
    #[inline]
    pub fn of(index: usize) -> Option<Self> {
        match index {
            i if i < DIRECT_COUNT => Some(Self::Direct(i)),
            i if i < MAX_FILE_BLOCKS => Some(Self::Indirect(i - DIRECT_COUNT)),
            _ => None,
        }
    }
}

impl DiskInode {
    #[inline]
    pub fn new(no: u32) -> Self {
        Self {
            no,
            ..Default::default()
        }
    }

    #[inline]
    pub fn direct(&self, index: usize) -> u32 {
        self.sectors[index]
    }

    #[inline]
    pub fn set_direct(&mut self, index: usize, lba: u32) {
        self.sectors[index] = lba;
    }

    /// 间接块地址
    #[inline]
    pub fn indirect(&self) -> u32 {
        self.sectors[DIRECT_COUNT]
    }

    #[inline]
    pub fn set_indirect(&mut self, lba: u32) {
        self.sectors[DIRECT_COUNT] = lba;
    }

    /// 存放`size`字节所需的块数
    #[inline]
    pub fn blocks_for(size: u32) -> usize {
        (size as usize).div_ceil(SECTOR_SIZE)
    }
}
