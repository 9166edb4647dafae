//! # 分区层
//!
//! 构建出分区的布局并使用：格式化、挂载、两张位图的分配与落盘。
//!
//! 分配遵循“扫描 → 内存置位 → 写回所在扇区”三步，
//! 调用者必须独占分区（见 [`FileSystem`](crate::FileSystem)）。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;

use block_dev::BlockDevice;
use vfs::{DirEntryType, Error, Result};

use crate::inode::Inode;
use crate::layout::*;
use crate::{DataBlock, ROOT_INODE, SECTOR_SIZE};

/// 位图的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapKind {
    Inode,
    Block,
}

pub struct Partition {
    pub(crate) device: Arc<dyn BlockDevice>,
    sb: SuperBlock,
    block_bitmap: Bitmap,
    inode_bitmap: Bitmap,
    /// 已打开的 inode，每个 inode 号至多一份
    pub(crate) open_inodes: BTreeMap<u32, Inode>,
}

impl Partition {
    /// 在`device`上从`base_lba`起的`total_sectors`个扇区内建立文件系统
    pub fn format(
        device: &Arc<dyn BlockDevice>,
        base_lba: u32,
        total_sectors: u32,
    ) -> Result<()> {
        let sb = SuperBlock::new(base_lba, total_sectors).ok_or(Error::NoSpace)?;
        log::info!(
            "format partition at {base_lba}: {total_sectors} sectors, \
             block bitmap {}+{}, inode bitmap {}+{}, inode table {}+{}, data from {}",
            sb.block_bitmap_lba,
            sb.block_bitmap_sects,
            sb.inode_bitmap_lba,
            sb.inode_bitmap_sects,
            sb.inode_table_lba,
            sb.inode_table_sects,
            sb.data_start_lba,
        );

        let mut sector: DataBlock = [0; SECTOR_SIZE];
        sb.write_to(&mut sector);
        device.write_block(SuperBlock::lba(base_lba) as usize, &sector);

        // 块位图：第 0 块给根目录，位图末尾不对应数据块的位一律置 1
        let mut block_bitmap = Bitmap::new(sb.block_bitmap_sects as usize);
        block_bitmap.set(0, true);
        let data_blocks = (sb.data_blocks() as usize).min(block_bitmap.capacity());
        for i in data_blocks..block_bitmap.capacity() {
            block_bitmap.set(i, true);
        }
        device.write_blocks(sb.block_bitmap_lba as usize, block_bitmap.as_bytes());

        let mut inode_bitmap = Bitmap::new(sb.inode_bitmap_sects as usize);
        inode_bitmap.set(ROOT_INODE as usize, true);
        device.write_blocks(sb.inode_bitmap_lba as usize, inode_bitmap.as_bytes());

        // inode 表清零，再写入根目录的 inode
        let zero: DataBlock = [0; SECTOR_SIZE];
        for i in 0..sb.inode_table_sects {
            device.write_block((sb.inode_table_lba + i) as usize, &zero);
        }
        let mut root = DiskInode::new(ROOT_INODE);
        root.size = 2 * sb.dir_entry_size;
        root.set_direct(0, sb.data_start_lba);
        let mut sector = zero;
        root.write_to(&mut sector);
        device.write_block(sb.inode_table_lba as usize, &sector);

        // 根目录的 . 与 .. 都指向自己
        let mut sector = zero;
        DirEntry::new(".", ROOT_INODE, DirEntryType::Directory).write_to(&mut sector);
        DirEntry::new("..", ROOT_INODE, DirEntryType::Directory)
            .write_to(&mut sector[DirEntry::SIZE..]);
        device.write_block(sb.data_start_lba as usize, &sector);

        Ok(())
    }

    /// 读入超级块与两张位图，并常驻根目录的 inode
    pub fn mount(device: Arc<dyn BlockDevice>, base_lba: u32) -> Result<Self> {
        let mut sector: DataBlock = [0; SECTOR_SIZE];
        device.read_block(SuperBlock::lba(base_lba) as usize, &mut sector);
        let sb = SuperBlock::read_from(&sector);
        if !sb.is_valid() || sb.base_lba != base_lba {
            return Err(Error::InvalidFileSystem);
        }

        let mut bits = vec![0; sb.block_bitmap_sects as usize * SECTOR_SIZE];
        device.read_blocks(sb.block_bitmap_lba as usize, &mut bits);
        let block_bitmap = Bitmap::from_bytes(bits);

        let mut bits = vec![0; sb.inode_bitmap_sects as usize * SECTOR_SIZE];
        device.read_blocks(sb.inode_bitmap_lba as usize, &mut bits);
        let inode_bitmap = Bitmap::from_bytes(bits);

        let mut part = Self {
            device,
            sb,
            block_bitmap,
            inode_bitmap,
            open_inodes: BTreeMap::new(),
        };
        part.open_inode(ROOT_INODE);
        log::info!(
            "mount partition at {base_lba}: {} of {} blocks, {} of {} inodes in use",
            part.block_bitmap.count_ones(),
            part.block_bitmap.capacity(),
            part.inode_bitmap.count_ones(),
            sb.inode_count,
        );

        Ok(part)
    }

    /// 分区上是否已有本文件系统
    pub fn is_formatted(device: &Arc<dyn BlockDevice>, base_lba: u32) -> bool {
        let mut sector: DataBlock = [0; SECTOR_SIZE];
        device.read_block(SuperBlock::lba(base_lba) as usize, &mut sector);
        SuperBlock::read_from(&sector).is_valid()
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    #[inline]
    pub fn block_bitmap(&self) -> &Bitmap {
        &self.block_bitmap
    }

    #[inline]
    pub fn inode_bitmap(&self) -> &Bitmap {
        &self.inode_bitmap
    }

    #[inline]
    pub(crate) fn read_sector(&self, lba: u32, buf: &mut [u8]) {
        self.device.read_block(lba as usize, buf);
    }

    #[inline]
    pub(crate) fn write_sector(&self, lba: u32, buf: &[u8]) {
        self.device.write_block(lba as usize, buf);
    }

    /// 在 inode 位图上分配一位，只改内存；创建流程的最后才写回
    pub(crate) fn alloc_inode(&mut self) -> Result<u32> {
        let index = self.inode_bitmap.scan(1).ok_or(Error::NoSpace)?;
        self.inode_bitmap.set(index, true);
        log::debug!("alloc inode {index}");

        Ok(index as u32)
    }

    /// 撤销一次尚未写回的 inode 分配
    pub(crate) fn undo_inode(&mut self, inode_no: u32) {
        self.inode_bitmap.set(inode_no as usize, false);
    }

    /// 回收 inode 号并写回位图
    pub(crate) fn free_inode(&mut self, inode_no: u32) {
        assert!(
            self.inode_bitmap.test(inode_no as usize),
            "freeing unallocated inode {inode_no}"
        );
        self.inode_bitmap.set(inode_no as usize, false);
        self.sync_bitmap(BitmapKind::Inode, inode_no as usize);
    }

    /// 分配一个数据块并立即写回块位图，返回其扇区号
    pub(crate) fn alloc_block(&mut self) -> Result<u32> {
        let index = self.block_bitmap.scan(1).ok_or(Error::NoSpace)?;
        self.block_bitmap.set(index, true);
        self.sync_bitmap(BitmapKind::Block, index);
        let lba = self.sb.data_start_lba + index as u32;
        log::debug!("alloc block {lba}");

        Ok(lba)
    }

    /// 回收数据块并写回块位图
    pub(crate) fn free_block(&mut self, lba: u32) {
        assert!(lba >= self.sb.data_start_lba, "block {lba} below data region");
        let index = (lba - self.sb.data_start_lba) as usize;
        assert!(self.block_bitmap.test(index), "freeing unallocated block {lba}");

        self.block_bitmap.set(index, false);
        self.sync_bitmap(BitmapKind::Block, index);
        log::debug!("free block {lba}");
    }

    /// 把`bit`所在的位图扇区写回磁盘
    pub(crate) fn sync_bitmap(&self, kind: BitmapKind, bit: usize) {
        let (bitmap, start) = match kind {
            BitmapKind::Inode => (&self.inode_bitmap, self.sb.inode_bitmap_lba),
            BitmapKind::Block => (&self.block_bitmap, self.sb.block_bitmap_lba),
        };
        let (sector, bytes) = bitmap.sector(bit);
        self.write_sector(start + sector as u32, bytes);
    }
}
