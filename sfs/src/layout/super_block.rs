use core::mem;

use crate::layout::{DirEntry, DiskInode};
use crate::{BITS_PER_SECTOR, MAGIC, MAX_FILES_PER_PART, SECTOR_SIZE};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域。
///
/// 所有位置都是磁盘上的绝对扇区号，恰好占满一个扇区。
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 分区占据扇区数
    pub total_sectors: u32,
    pub inode_count: u32,
    /// 分区起始扇区
    pub base_lba: u32,

    pub block_bitmap_lba: u32,
    pub block_bitmap_sects: u32,

    pub inode_bitmap_lba: u32,
    pub inode_bitmap_sects: u32,

    pub inode_table_lba: u32,
    pub inode_table_sects: u32,

    /// 数据区起始扇区，块位图的第 0 位对应它
    pub data_start_lba: u32,
    pub root_inode_no: u32,
    pub dir_entry_size: u32,

    _pad: [u8; 460],
}

impl SuperBlock {
    /// 按分区大小规划布局。分区连一个数据块都放不下时返回空。
    pub fn new(base_lba: u32, total_sectors: u32) -> Option<Self> {
        let inode_bitmap_sects = MAX_FILES_PER_PART.div_ceil(BITS_PER_SECTOR) as u32;
        let inode_table_sects =
            (MAX_FILES_PER_PART * mem::size_of::<DiskInode>()).div_ceil(SECTOR_SIZE) as u32;
        // 引导扇区 + 超级块 + inode 位图 + inode 表
        let used_sects = 2 + inode_bitmap_sects + inode_table_sects;
        let free_sects = total_sectors.checked_sub(used_sects)?;

        // 块位图自身也要占用空闲扇区，先估算再按剩余位数修正
        let block_bitmap_sects = free_sects.div_ceil(BITS_PER_SECTOR as u32);
        let bit_len = free_sects.checked_sub(block_bitmap_sects)?;
        let block_bitmap_sects = bit_len.div_ceil(BITS_PER_SECTOR as u32);
        if bit_len == 0 {
            return None;
        }

        let block_bitmap_lba = base_lba + 2;
        let inode_bitmap_lba = block_bitmap_lba + block_bitmap_sects;
        let inode_table_lba = inode_bitmap_lba + inode_bitmap_sects;

        Some(Self {
            magic: MAGIC,
            total_sectors,
            inode_count: MAX_FILES_PER_PART as u32,
            base_lba,
            block_bitmap_lba,
            block_bitmap_sects,
            inode_bitmap_lba,
            inode_bitmap_sects,
            inode_table_lba,
            inode_table_sects,
            data_start_lba: inode_table_lba + inode_table_sects,
            root_inode_no: crate::ROOT_INODE,
            dir_entry_size: mem::size_of::<DirEntry>() as u32,
            _pad: [0; 460],
        })
    }

    /// 超级块所在扇区：紧跟分区的引导扇区
    #[inline]
    pub fn lba(base_lba: u32) -> u32 {
        base_lba + 1
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// 块位图中真正对应数据块的位数
    #[inline]
    pub fn data_blocks(&self) -> u32 {
        self.base_lba + self.total_sectors - self.data_start_lba
    }
}
