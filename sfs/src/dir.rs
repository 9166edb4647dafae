//! # 目录层
//!
//! 目录的数据块是一串定长的目录项，按块、按槽位线性扫描。
//! 空闲槽位（类型为 0）可以复用；除第一块外，清空的块会被回收。

use vfs::{DirEntryType, Error, Result};

use crate::layout::*;
use crate::partition::Partition;
use crate::{DataBlock, ROOT_INODE, SECTOR_SIZE};

/// 目录句柄，带有遍历游标
///
/// 根目录的句柄是常驻的，关闭它不会有任何效果。
#[derive(Debug, PartialEq, Eq)]
pub struct Dir {
    inode: u32,
    /// 已遍历过的目录项字节数
    pos: u32,
}

impl Dir {
    #[inline]
    pub(crate) fn root() -> Self {
        Self {
            inode: ROOT_INODE,
            pos: 0,
        }
    }

    #[inline]
    pub fn inode(&self) -> u32 {
        self.inode
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.inode == ROOT_INODE
    }

    #[inline]
    pub(crate) fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl Partition {
    /// 打开目录。根目录的 inode 挂载时已打开，不再计数。
    pub(crate) fn open_dir(&mut self, inode_no: u32) -> Dir {
        if inode_no != ROOT_INODE {
            self.open_inode(inode_no);
        }

        Dir {
            inode: inode_no,
            pos: 0,
        }
    }

    pub(crate) fn close_dir(&mut self, dir: Dir) {
        if !dir.is_root() {
            self.close_inode(dir.inode);
        }
    }

    /// 在目录中按名字查找目录项
    pub(crate) fn search_entry(&self, dir_no: u32, name: &str) -> Option<DirEntry> {
        let blocks = self.block_list(&self.inode(dir_no).disk);
        let mut sector: DataBlock = [0; SECTOR_SIZE];

        for lba in blocks.into_iter().filter(|&lba| lba != 0) {
            self.read_sector(lba, &mut sector);
            let found = sector
                .chunks_exact(DirEntry::SIZE)
                .map(DirEntry::read_from)
                .find(|entry| entry.is_used() && entry.name() == name);
            if found.is_some() {
                return found;
            }
        }

        None
    }

    /// 把目录项写入父目录，必要时为目录分配新块。
    /// 只更新内存中父目录的大小，由调用者同步父目录的 inode。
    pub(crate) fn insert_entry(&mut self, dir_no: u32, entry: &DirEntry) -> Result<()> {
        let disk = self.inode(dir_no).disk;
        assert_eq!(
            disk.size as usize % DirEntry::SIZE,
            0,
            "directory {dir_no} has a torn entry"
        );

        let blocks = self.block_list(&disk);
        let mut sector: DataBlock = [0; SECTOR_SIZE];

        for (index, &lba) in blocks.iter().enumerate() {
            if lba == 0 {
                let lba = self.extend_dir(dir_no, index)?;
                sector.fill(0);
                entry.write_to(&mut sector);
                self.write_sector(lba, &sector);
                self.inode_mut(dir_no).disk.size += DirEntry::SIZE as u32;
                return Ok(());
            }

            self.read_sector(lba, &mut sector);
            let free = sector
                .chunks_exact_mut(DirEntry::SIZE)
                .find(|slot| !DirEntry::read_from(slot).is_used());
            if let Some(slot) = free {
                entry.write_to(slot);
                self.write_sector(lba, &sector);
                self.inode_mut(dir_no).disk.size += DirEntry::SIZE as u32;
                return Ok(());
            }
        }

        log::warn!("directory {dir_no} is full");
        Err(Error::DirectoryFull)
    }

    /// 为目录的第`index`个逻辑块分配数据块，返回其扇区号
    fn extend_dir(&mut self, dir_no: u32, index: usize) -> Result<u32> {
        match BlockSlot::of(index) {
            Some(BlockSlot::Direct(i)) => {
                let lba = self.alloc_block()?;
                self.inode_mut(dir_no).disk.set_direct(i, lba);
                Ok(lba)
            }
            Some(BlockSlot::Indirect(i)) => {
                let old_table = self.inode(dir_no).disk.indirect();
                let table_lba = match old_table {
                    0 => self.alloc_block()?,
                    lba => lba,
                };
                let lba = match self.alloc_block() {
                    Ok(lba) => lba,
                    Err(e) => {
                        if old_table == 0 {
                            self.free_block(table_lba);
                        }
                        return Err(e);
                    }
                };

                let mut table = match old_table {
                    0 => [0; INDIRECT_COUNT],
                    lba => self.read_indirect(lba),
                };
                table[i] = lba;
                self.write_indirect(table_lba, &table);
                self.inode_mut(dir_no).disk.set_indirect(table_lba);

                Ok(lba)
            }
            None => unreachable!("block index {index} beyond the address table"),
        }
    }

    /// 从目录中删除指向`inode_no`的目录项，并同步目录的 inode。
    ///
    /// 若该项是某个非首块中唯一的目录项，直接回收整块。
    pub(crate) fn remove_entry(&mut self, dir_no: u32, inode_no: u32) {
        let blocks = self.block_list(&self.inode(dir_no).disk);
        let mut sector: DataBlock = [0; SECTOR_SIZE];

        for (index, &lba) in blocks.iter().enumerate() {
            if lba == 0 {
                continue;
            }
            self.read_sector(lba, &mut sector);

            // 首块以 . 开头
            let mut first_block = false;
            let mut entries = 0;
            let mut target = None;
            for (i, slot) in sector.chunks_exact(DirEntry::SIZE).enumerate() {
                let entry = DirEntry::read_from(slot);
                if !entry.is_used() {
                    continue;
                }
                if entry.name() == "." {
                    first_block = true;
                } else if !entry.is_dot() {
                    entries += 1;
                    if entry.inode_no() == inode_no {
                        target = Some(i);
                    }
                }
            }

            let Some(i) = target else {
                continue;
            };
            if entries == 1 && !first_block {
                self.reclaim_dir_block(dir_no, index, lba);
            } else {
                sector[i * DirEntry::SIZE..(i + 1) * DirEntry::SIZE].fill(0);
                self.write_sector(lba, &sector);
            }

            self.inode_mut(dir_no).disk.size -= DirEntry::SIZE as u32;
            self.sync_inode(dir_no);
            return;
        }

        panic!("directory {dir_no} has no entry for inode {inode_no}");
    }

    fn reclaim_dir_block(&mut self, dir_no: u32, index: usize, lba: u32) {
        self.free_block(lba);

        match BlockSlot::of(index) {
            Some(BlockSlot::Direct(i)) => self.inode_mut(dir_no).disk.set_direct(i, 0),
            Some(BlockSlot::Indirect(i)) => {
                let table_lba = self.inode(dir_no).disk.indirect();
                let mut table = self.read_indirect(table_lba);
                table[i] = 0;

                // 间接块里已经没有地址了，连同间接块一并回收
                if table.iter().all(|&lba| lba == 0) {
                    self.free_block(table_lba);
                    self.inode_mut(dir_no).disk.set_indirect(0);
                } else {
                    self.write_indirect(table_lba, &table);
                }
            }
            None => unreachable!("block index {index} beyond the address table"),
        }
    }

    /// 读取游标处的下一个目录项，读完返回空
    pub(crate) fn read_entry(&self, dir: &mut Dir) -> Option<DirEntry> {
        let disk = self.inode(dir.inode).disk;
        if dir.pos >= disk.size {
            return None;
        }

        let mut sector: DataBlock = [0; SECTOR_SIZE];
        let mut cur = 0;
        for lba in self.block_list(&disk).into_iter().filter(|&lba| lba != 0) {
            self.read_sector(lba, &mut sector);
            for slot in sector.chunks_exact(DirEntry::SIZE) {
                let entry = DirEntry::read_from(slot);
                if !entry.is_used() {
                    continue;
                }
                if cur < dir.pos {
                    cur += DirEntry::SIZE as u32;
                    continue;
                }

                dir.pos += DirEntry::SIZE as u32;
                return Some(entry);
            }
        }

        None
    }

    /// 目录中只剩 . 与 ..
    #[inline]
    pub(crate) fn dir_is_empty(&self, dir_no: u32) -> bool {
        self.inode(dir_no).disk.size == 2 * DirEntry::SIZE as u32
    }

    /// 删除空目录：先从父目录中摘除，再回收它的 inode 与数据块
    pub(crate) fn remove_dir(&mut self, parent_no: u32, child_no: u32) {
        assert!(self.dir_is_empty(child_no), "removing non-empty directory {child_no}");

        self.remove_entry(parent_no, child_no);
        self.release_inode(child_no);
    }

    /// 在新目录的首块写入 . 与 ..
    pub(crate) fn init_dir_block(&self, lba: u32, self_no: u32, parent_no: u32) {
        let mut sector: DataBlock = [0; SECTOR_SIZE];
        DirEntry::new(".", self_no, DirEntryType::Directory).write_to(&mut sector);
        DirEntry::new("..", parent_no, DirEntryType::Directory)
            .write_to(&mut sector[DirEntry::SIZE..]);
        self.write_sector(lba, &sector);
    }
}
