//! # 文件层
//!
//! 全局打开文件表记录每次打开的读写位置、打开标志与所属 inode；
//! 任务的文件描述符只是这张表的下标。

use alloc::vec::Vec;

use enumflags2::{bitflags, BitFlags};
use vfs::{DirEntryType, Error, Result};

use crate::inode::Inode;
use crate::layout::*;
use crate::partition::{BitmapKind, Partition};
use crate::undo::{Step, UndoLog};
use crate::{DataBlock, MAX_FILE_NAME_LEN, MAX_FILE_OPEN, MAX_FILE_SIZE, SECTOR_SIZE, STD_STREAMS};

#[rustfmt::skip]
#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 只写
    WRONLY = 0b001,
    /// 读写兼备
    RDWR   = 0b010,
    /// 创建文件，文件已存在则失败
    CREATE = 0b100,
}

impl OpenFlag {
    // enumflags2拒绝值为0的标志
    /// 只读
    pub const RDONLY: u32 = 0b000;

    #[inline]
    pub fn read_only() -> BitFlags<OpenFlag> {
        BitFlags::from_bits_truncate(Self::RDONLY)
    }
}

/// lseek 的基准位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Whence {
    Set = 1,
    Cur = 2,
    End = 3,
}

impl TryFrom<u32> for Whence {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::Set),
            2 => Ok(Self::Cur),
            3 => Ok(Self::End),
            _ => Err(Error::InvalidArgument),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenFile {
    pub pos: u32,
    pub flags: BitFlags<OpenFlag>,
    pub inode: u32,
}

impl OpenFile {
    #[inline]
    pub fn readable(&self) -> bool {
        !self.flags.contains(OpenFlag::WRONLY)
    }

    #[inline]
    pub fn writable(&self) -> bool {
        self.flags.intersects(OpenFlag::WRONLY | OpenFlag::RDWR)
    }
}

/// 全局打开文件表
#[derive(Debug)]
pub(crate) struct FileTable {
    slots: [Option<OpenFile>; MAX_FILE_OPEN],
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            slots: [None; MAX_FILE_OPEN],
        }
    }

    /// 占用一个空闲槽位，跳过标准流
    fn reserve(&mut self, file: OpenFile) -> Result<usize> {
        let (slot, free) = self
            .slots
            .iter_mut()
            .enumerate()
            .skip(STD_STREAMS)
            .find(|(_, slot)| slot.is_none())
            .ok_or_else(|| {
                log::warn!("exceed max open files");
                Error::TooManyOpenFiles
            })?;
        *free = Some(file);

        Ok(slot)
    }

    #[inline]
    pub fn clear(&mut self, slot: usize) {
        self.slots[slot] = None;
    }

    pub fn get(&self, slot: usize) -> Result<&OpenFile> {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .ok_or(Error::BadDescriptor)
    }

    fn get_mut(&mut self, slot: usize) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(Error::BadDescriptor)
    }

    /// 表中是否有文件指向该 inode
    pub fn holds_inode(&self, inode_no: u32) -> bool {
        self.slots.iter().flatten().any(|file| file.inode == inode_no)
    }

    /// 在父目录中创建空的普通文件并打开它，返回槽位
    pub fn create(
        &mut self,
        part: &mut Partition,
        parent_no: u32,
        name: &str,
        flags: BitFlags<OpenFlag>,
    ) -> Result<usize> {
        if name.len() > MAX_FILE_NAME_LEN {
            return Err(Error::NameTooLong);
        }

        let mut undo = UndoLog::new();
        match self.try_create(part, &mut undo, parent_no, name, flags) {
            Ok(slot) => {
                undo.commit();
                Ok(slot)
            }
            Err(e) => {
                undo.unwind(part, self);
                Err(e)
            }
        }
    }

    fn try_create(
        &mut self,
        part: &mut Partition,
        undo: &mut UndoLog,
        parent_no: u32,
        name: &str,
        flags: BitFlags<OpenFlag>,
    ) -> Result<usize> {
        let inode_no = part.alloc_inode()?;
        undo.record(Step::InodeBit(inode_no));

        let slot = self.reserve(OpenFile {
            pos: 0,
            flags,
            inode: inode_no,
        })?;
        undo.record(Step::FileSlot(slot));

        let entry = DirEntry::new(name, inode_no, DirEntryType::Regular);
        part.insert_entry(parent_no, &entry)?;

        // 目录项 → 父目录 inode → 新 inode → inode 位图
        part.sync_inode(parent_no);
        let inode = Inode::new(DiskInode::new(inode_no));
        part.write_inode(&inode.disk);
        part.insert_inode(inode);
        part.sync_bitmap(BitmapKind::Inode, inode_no as usize);
        log::debug!("create {name:?} as inode {inode_no} in directory {parent_no}");

        Ok(slot)
    }

    /// 打开已存在的文件。写者必须独占，否则返回 [`Error::Busy`]。
    pub fn open(
        &mut self,
        part: &mut Partition,
        inode_no: u32,
        flags: BitFlags<OpenFlag>,
    ) -> Result<usize> {
        let file = OpenFile {
            pos: 0,
            flags,
            inode: inode_no,
        };
        let slot = self.reserve(file)?;
        part.open_inode(inode_no);

        if file.writable() && !part.inode(inode_no).try_deny_write() {
            log::warn!("inode {inode_no} already has a writer");
            part.close_inode(inode_no);
            self.clear(slot);
            return Err(Error::Busy);
        }

        Ok(slot)
    }

    pub fn close(&mut self, part: &mut Partition, slot: usize) -> Result<()> {
        let file = *self.get(slot)?;
        part.inode(file.inode).allow_write();
        part.close_inode(file.inode);
        self.clear(slot);

        Ok(())
    }

    /// 从当前文件尾追加写入，返回写入的字节数
    pub fn write(&mut self, part: &mut Partition, slot: usize, data: &[u8]) -> Result<usize> {
        let file = *self.get(slot)?;
        if !file.writable() {
            return Err(Error::PermissionDenied);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let size = part.inode(file.inode).disk.size as usize;
        if size + data.len() > MAX_FILE_SIZE {
            log::warn!(
                "write {} bytes to inode {}: exceed max file size {MAX_FILE_SIZE}",
                data.len(),
                file.inode
            );
            return Err(Error::FileTooLarge);
        }

        let snapshot = part.inode(file.inode).disk;
        let mut undo = UndoLog::new();
        let blocks = match grow(part, &mut undo, file.inode, size + data.len()) {
            Ok(blocks) => {
                undo.commit();
                blocks
            }
            Err(e) => {
                part.inode_mut(file.inode).disk = snapshot;
                undo.unwind(part, self);
                return Err(e);
            }
        };

        let mut sector: DataBlock = [0; SECTOR_SIZE];
        let mut pos = size;
        for chunk in split_at_sectors(pos, data) {
            let offset = pos % SECTOR_SIZE;
            // 首个扇区可能已有数据，需先读出
            if offset != 0 {
                part.read_sector(blocks[pos / SECTOR_SIZE], &mut sector);
            } else {
                sector.fill(0);
            }
            sector[offset..offset + chunk.len()].copy_from_slice(chunk);
            part.write_sector(blocks[pos / SECTOR_SIZE], &sector);
            pos += chunk.len();
        }

        part.inode_mut(file.inode).disk.size = pos as u32;
        part.sync_inode(file.inode);
        self.get_mut(slot)?.pos = pos as u32;

        Ok(data.len())
    }

    /// 从读写位置起读到`buf`中，返回读到的字节数，已到文件尾时为 0
    pub fn read(&mut self, part: &Partition, slot: usize, buf: &mut [u8]) -> Result<usize> {
        let file = *self.get(slot)?;
        if !file.readable() {
            return Err(Error::PermissionDenied);
        }

        let disk = part.inode(file.inode).disk;
        let pos = file.pos as usize;
        let size = disk.size as usize;
        if pos >= size {
            return Ok(0);
        }

        let len = buf.len().min(size - pos);
        let blocks = part.block_list(&disk);
        let mut sector: DataBlock = [0; SECTOR_SIZE];
        let mut cur = pos;
        let mut read = 0;
        while read < len {
            let offset = cur % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - offset).min(len - read);
            part.read_sector(blocks[cur / SECTOR_SIZE], &mut sector);
            buf[read..read + chunk].copy_from_slice(&sector[offset..offset + chunk]);
            read += chunk;
            cur += chunk;
        }

        self.get_mut(slot)?.pos = cur as u32;
        Ok(len)
    }

    /// 设置读写位置，新位置必须落在文件内
    pub fn seek(
        &mut self,
        part: &Partition,
        slot: usize,
        offset: i32,
        whence: Whence,
    ) -> Result<u32> {
        let file = *self.get(slot)?;
        let size = part.inode(file.inode).disk.size as i64;
        let offset = offset as i64;

        let pos = match whence {
            Whence::Set => offset,
            Whence::Cur => file.pos as i64 + offset,
            Whence::End => size + offset,
        };
        if !(0..size).contains(&pos) {
            return Err(Error::InvalidArgument);
        }

        self.get_mut(slot)?.pos = pos as u32;
        Ok(pos as u32)
    }
}

/// 为文件分配足以容纳`new_size`字节的块，返回分配后的块地址列表。
///
/// 新分配的块逐个写回块位图并记入回滚记录；间接块的内容最后一次性写回。
fn grow(
    part: &mut Partition,
    undo: &mut UndoLog,
    inode_no: u32,
    new_size: usize,
) -> Result<Vec<u32>> {
    let disk = part.inode(inode_no).disk;
    let mut blocks = part.block_list(&disk);
    let used = DiskInode::blocks_for(disk.size);
    let need = DiskInode::blocks_for(new_size as u32);
    if need <= used {
        return Ok(blocks);
    }

    // 第一次用到间接寻址，先分配间接块
    if need > DIRECT_COUNT && disk.indirect() == 0 {
        let lba = part.alloc_block()?;
        undo.record(Step::Block(lba));
        part.inode_mut(inode_no).disk.set_indirect(lba);
    }

    for (index, block) in blocks.iter_mut().enumerate().take(need).skip(used) {
        assert_eq!(*block, 0, "inode {inode_no} has a hole at block {index}");
        let lba = part.alloc_block()?;
        undo.record(Step::Block(lba));
        *block = lba;

        if let Some(BlockSlot::Direct(i)) = BlockSlot::of(index) {
            part.inode_mut(inode_no).disk.set_direct(i, lba);
        }
    }

    if need > DIRECT_COUNT {
        let mut table: IndirectBlock = [0; INDIRECT_COUNT];
        table.copy_from_slice(&blocks[DIRECT_COUNT..]);
        part.write_indirect(part.inode(inode_no).disk.indirect(), &table);
    }

    Ok(blocks)
}

/// 以`pos`为起点，把数据切分为不跨扇区的片段
fn split_at_sectors(pos: usize, data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let first = (SECTOR_SIZE - pos % SECTOR_SIZE).min(data.len());
    let (head, rest) = data.split_at(first);
    core::iter::once(head).chain(rest.chunks(SECTOR_SIZE))
}
