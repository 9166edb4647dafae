//! # 索引节点层
//!
//! inode 在磁盘上以 60 字节为单位紧密排列，因此一个 inode 可能跨两个扇区。
//! 打开的 inode 以 inode 号为键缓存在分区中，靠打开计数决定去留。

use core::mem;
use core::sync::atomic::{AtomicBool, Ordering};

use alloc::vec;
use alloc::vec::Vec;

use crate::layout::*;
use crate::partition::Partition;
use crate::{DataBlock, SECTOR_SIZE};

const INODE_SIZE: usize = mem::size_of::<DiskInode>();

/// 内存中的 inode
#[derive(Debug)]
pub struct Inode {
    /// 需要持久化的部分
    pub disk: DiskInode,
    open_cnt: u32,
    /// 单写者标记
    write_deny: AtomicBool,
}

impl Inode {
    pub fn new(disk: DiskInode) -> Self {
        Self {
            disk,
            open_cnt: 1,
            write_deny: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    #[inline]
    pub fn open_cnt(&self) -> u32 {
        self.open_cnt
    }

    /// 试图成为唯一的写者，已有写者时返回假
    #[inline]
    pub fn try_deny_write(&self) -> bool {
        !self.write_deny.swap(true, Ordering::Acquire)
    }

    #[inline]
    pub fn allow_write(&self) {
        self.write_deny.store(false, Ordering::Release);
    }
}

/// inode 在磁盘上的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodePos {
    pub lba: u32,
    /// 扇区内偏移
    pub offset: usize,
    /// 是否跨越两个扇区
    pub two_sectors: bool,
}

impl Partition {
    /// 通过 inode 号计算它在 inode 表中的位置
    pub(crate) fn locate(&self, inode_no: u32) -> InodePos {
        let sb = self.super_block();
        assert!(inode_no < sb.inode_count, "inode {inode_no} out of range");

        let byte = inode_no as usize * INODE_SIZE;
        let offset = byte % SECTOR_SIZE;

        InodePos {
            lba: sb.inode_table_lba + (byte / SECTOR_SIZE) as u32,
            offset,
            two_sectors: SECTOR_SIZE - offset < INODE_SIZE,
        }
    }

    fn load_inode(&self, inode_no: u32) -> DiskInode {
        let pos = self.locate(inode_no);
        let mut buf = [0; 2 * SECTOR_SIZE];
        let len = SECTOR_SIZE * if pos.two_sectors { 2 } else { 1 };
        self.device.read_blocks(pos.lba as usize, &mut buf[..len]);

        DiskInode::read_from(&buf[pos.offset..])
    }

    /// 把 inode 的持久部分写回磁盘
    pub(crate) fn write_inode(&self, disk: &DiskInode) {
        let pos = self.locate(disk.no);
        let mut buf = [0; 2 * SECTOR_SIZE];
        let len = SECTOR_SIZE * if pos.two_sectors { 2 } else { 1 };

        self.device.read_blocks(pos.lba as usize, &mut buf[..len]);
        disk.write_to(&mut buf[pos.offset..]);
        self.device.write_blocks(pos.lba as usize, &buf[..len]);
    }

    /// 同步一个已打开的 inode
    #[inline]
    pub(crate) fn sync_inode(&self, inode_no: u32) {
        let disk = self.inode(inode_no).disk;
        self.write_inode(&disk);
    }

    /// 打开 inode：已缓存则增加打开计数，否则从磁盘读入
    pub(crate) fn open_inode(&mut self, inode_no: u32) {
        if let Some(inode) = self.open_inodes.get_mut(&inode_no) {
            inode.open_cnt += 1;
            return;
        }

        let disk = self.load_inode(inode_no);
        assert_eq!(disk.no, inode_no, "inode table corrupted");
        self.open_inodes.insert(inode_no, Inode::new(disk));
    }

    /// 缓存一个新建的 inode，打开计数为 1
    pub(crate) fn insert_inode(&mut self, inode: Inode) {
        let inode_no = inode.disk.no;
        let old = self.open_inodes.insert(inode_no, inode);
        assert!(old.is_none(), "inode {inode_no} cached twice");
    }

    /// 关闭 inode，打开计数归零时移出缓存
    pub(crate) fn close_inode(&mut self, inode_no: u32) {
        let inode = self.inode_mut(inode_no);
        inode.open_cnt -= 1;
        if inode.open_cnt == 0 {
            self.open_inodes.remove(&inode_no);
        }
    }

    #[inline]
    pub(crate) fn is_open(&self, inode_no: u32) -> bool {
        self.open_inodes.contains_key(&inode_no)
    }

    pub(crate) fn inode(&self, inode_no: u32) -> &Inode {
        self.open_inodes
            .get(&inode_no)
            .unwrap_or_else(|| panic!("inode {inode_no} is not open"))
    }

    pub(crate) fn inode_mut(&mut self, inode_no: u32) -> &mut Inode {
        self.open_inodes
            .get_mut(&inode_no)
            .unwrap_or_else(|| panic!("inode {inode_no} is not open"))
    }

    pub(crate) fn read_indirect(&self, lba: u32) -> IndirectBlock {
        let mut sector: DataBlock = [0; SECTOR_SIZE];
        self.read_sector(lba, &mut sector);
        IndirectBlock::read_from(&sector)
    }

    pub(crate) fn write_indirect(&self, lba: u32, table: &IndirectBlock) {
        let mut sector: DataBlock = [0; SECTOR_SIZE];
        table.write_to(&mut sector);
        self.write_sector(lba, &sector);
    }

    /// 把地址表展开为 140 项的块地址列表，0 表示未分配
    pub(crate) fn block_list(&self, disk: &DiskInode) -> Vec<u32> {
        let mut blocks = vec![0; MAX_FILE_BLOCKS];
        for (i, block) in blocks.iter_mut().take(DIRECT_COUNT).enumerate() {
            *block = disk.direct(i);
        }
        if disk.indirect() != 0 {
            blocks[DIRECT_COUNT..].copy_from_slice(&self.read_indirect(disk.indirect()));
        }

        blocks
    }

    /// 删除 inode：回收其全部数据块与间接块，清空记录并释放 inode 号
    pub(crate) fn release_inode(&mut self, inode_no: u32) {
        self.open_inode(inode_no);
        let disk = self.inode(inode_no).disk;

        for lba in self.block_list(&disk) {
            if lba != 0 {
                self.free_block(lba);
            }
        }
        if disk.indirect() != 0 {
            self.free_block(disk.indirect());
        }

        self.write_inode(&DiskInode::new(inode_no));
        self.free_inode(inode_no);
        self.close_inode(inode_no);
        log::debug!("release inode {inode_no}");
    }
}
