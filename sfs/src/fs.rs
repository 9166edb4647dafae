//! # 文件系统上下文
//!
//! 一个 [`FileSystem`] 拥有当前分区与全局打开文件表，根目录的 inode 挂载后常驻。
//! 所有操作都以`&mut self`进行，因此位图的扫描与置位、inode 缓存的插入
//! 都不会与其它操作交错。多任务共享时把它放进一把锁里，见 [`syscall`](crate::syscall)。

use alloc::string::String;
use alloc::sync::Arc;

use block_dev::BlockDevice;
use enumflags2::BitFlags;
use vfs::{DirEntry, DirEntryType, Error, Result, Stat};

use crate::dir::Dir;
use crate::file::{FileTable, OpenFlag, Whence};
use crate::layout::{self, DiskInode};
use crate::partition::{BitmapKind, Partition};
use crate::path::{self, Path, SearchRecord};
use crate::task::Task;
use crate::undo::{Step, UndoLog};
use crate::{MAX_FILE_NAME_LEN, MAX_PATH_LEN, ROOT_INODE, SECTOR_SIZE};

pub struct FileSystem {
    part: Partition,
    files: FileTable,
}

impl FileSystem {
    /// 格式化分区，不挂载
    #[inline]
    pub fn format(
        device: &Arc<dyn BlockDevice>,
        base_lba: u32,
        total_sectors: u32,
    ) -> Result<()> {
        Partition::format(device, base_lba, total_sectors)
    }

    pub fn mount(device: Arc<dyn BlockDevice>, base_lba: u32) -> Result<Self> {
        Ok(Self {
            part: Partition::mount(device, base_lba)?,
            files: FileTable::new(),
        })
    }

    /// 挂载分区，分区上还没有文件系统时先格式化
    pub fn init(device: Arc<dyn BlockDevice>, base_lba: u32, total_sectors: u32) -> Result<Self> {
        if !Partition::is_formatted(&device, base_lba) {
            log::info!("no filesystem at sector {base_lba}, formatting");
            Partition::format(&device, base_lba, total_sectors)?;
        }

        Self::mount(device, base_lba)
    }

    #[inline]
    pub fn partition(&self) -> &Partition {
        &self.part
    }

    /// 查找路径并在结束后关闭查找途中打开的父目录
    fn with_search<T>(
        &mut self,
        path: &str,
        f: impl FnOnce(&mut Self, Option<u32>, &SearchRecord) -> Result<T>,
    ) -> Result<T> {
        let (found, record) = self.part.search_file(path)?;
        let result = f(self, found, &record);
        self.part.close_dir(record.parent);

        result
    }

    pub fn open(
        &mut self,
        task: &mut Task,
        path: &str,
        flags: BitFlags<OpenFlag>,
    ) -> Result<usize> {
        if path.ends_with('/') {
            log::warn!("can't open a directory {path}");
            return Err(Error::IsADirectory);
        }

        let path = resolve(task, path)?;
        let slot = self.with_search(&path, |fs, found, record| {
            if found.is_some() && record.kind.is_dir() {
                log::warn!("can't open a directory with open(), use opendir() instead");
                return Err(Error::IsADirectory);
            }
            check_depth(&path, record)?;

            let create = flags.contains(OpenFlag::CREATE);
            match found {
                None if !create => {
                    log::warn!("in path {path}, file {} does not exist", record.searched_path);
                    Err(Error::NotFound)
                }
                Some(_) if create => {
                    log::warn!("{path} has already exist");
                    Err(Error::AlreadyExists)
                }
                None => {
                    let name = file_name(&path)?;
                    fs.files
                        .create(&mut fs.part, record.parent.inode(), name, flags)
                }
                Some(inode_no) => fs.files.open(&mut fs.part, inode_no, flags),
            }
        })?;

        task.install(slot).inspect_err(|_| {
            // 描述符表满了，撤销这次打开
            if let Err(e) = self.files.close(&mut self.part, slot) {
                log::error!("close file slot {slot}: {e}");
            }
        })
    }

    pub fn close(&mut self, task: &mut Task, fd: usize) -> Result<()> {
        let slot = task.uninstall(fd)?;
        self.files.close(&mut self.part, slot)
    }

    /// 关闭任务的全部描述符，任务退出时调用
    pub fn release_task(&mut self, task: &mut Task) {
        let fds: alloc::vec::Vec<usize> = task.open_fds().collect();
        for fd in fds {
            if let Err(e) = self.close(task, fd) {
                log::error!("task {}: close fd {fd}: {e}", task.pid);
            }
        }
    }

    pub fn read(&mut self, task: &Task, fd: usize, buf: &mut [u8]) -> Result<usize> {
        let slot = task.global(fd)?;
        self.files.read(&self.part, slot, buf)
    }

    pub fn write(&mut self, task: &Task, fd: usize, data: &[u8]) -> Result<usize> {
        let slot = task.global(fd)?;
        self.files.write(&mut self.part, slot, data)
    }

    pub fn lseek(&mut self, task: &Task, fd: usize, offset: i32, whence: Whence) -> Result<u32> {
        let slot = task.global(fd)?;
        self.files.seek(&self.part, slot, offset, whence)
    }

    /// 删除普通文件，文件仍被打开时拒绝
    pub fn unlink(&mut self, task: &Task, path: &str) -> Result<()> {
        let path = resolve(task, path)?;
        self.with_search(&path, |fs, found, record| {
            let Some(inode_no) = found else {
                log::warn!("file {path} not found");
                return Err(Error::NotFound);
            };
            check_depth(&path, record)?;
            if record.kind.is_dir() {
                log::warn!("can't delete a directory with unlink(), use rmdir() instead");
                return Err(Error::IsADirectory);
            }
            if fs.files.holds_inode(inode_no) {
                log::warn!("file {path} is in use, not allowed to delete");
                return Err(Error::Busy);
            }

            fs.part.remove_entry(record.parent.inode(), inode_no);
            fs.part.release_inode(inode_no);
            Ok(())
        })
    }

    pub fn mkdir(&mut self, task: &Task, path: &str) -> Result<()> {
        let path = resolve(task, path)?;
        self.with_search(&path, |fs, found, record| {
            if found.is_some() {
                log::warn!("file or directory {path} exist");
                return Err(Error::AlreadyExists);
            }
            check_depth(&path, record)?;
            let name = file_name(&path)?;

            let mut undo = UndoLog::new();
            match fs.try_mkdir(&mut undo, record.parent.inode(), name) {
                Ok(()) => {
                    undo.commit();
                    Ok(())
                }
                Err(e) => {
                    undo.unwind(&mut fs.part, &mut fs.files);
                    Err(e)
                }
            }
        })
    }

    fn try_mkdir(&mut self, undo: &mut UndoLog, parent_no: u32, name: &str) -> Result<()> {
        let part = &mut self.part;

        let inode_no = part.alloc_inode()?;
        undo.record(Step::InodeBit(inode_no));
        let lba = part.alloc_block()?;
        undo.record(Step::Block(lba));

        let mut disk = DiskInode::new(inode_no);
        disk.size = 2 * layout::DirEntry::SIZE as u32;
        disk.set_direct(0, lba);
        part.init_dir_block(lba, inode_no, parent_no);

        let entry = layout::DirEntry::new(name, inode_no, DirEntryType::Directory);
        part.insert_entry(parent_no, &entry)?;

        // 父目录 inode → 新 inode → inode 位图
        part.sync_inode(parent_no);
        part.write_inode(&disk);
        part.sync_bitmap(BitmapKind::Inode, inode_no as usize);
        log::debug!("mkdir {name:?} as inode {inode_no} in directory {parent_no}");

        Ok(())
    }

    /// 删除空目录
    pub fn rmdir(&mut self, task: &Task, path: &str) -> Result<()> {
        let path = resolve(task, path)?;
        self.with_search(&path, |fs, found, record| {
            let Some(inode_no) = found else {
                log::warn!("directory {path} not found");
                return Err(Error::NotFound);
            };
            check_depth(&path, record)?;
            if !record.kind.is_dir() {
                log::warn!("{path} is a regular file");
                return Err(Error::NotADirectory);
            }
            if inode_no == ROOT_INODE {
                return Err(Error::InvalidArgument);
            }
            // 还有人打开着它
            if fs.part.is_open(inode_no) {
                return Err(Error::Busy);
            }

            let dir = fs.part.open_dir(inode_no);
            let result = if fs.part.dir_is_empty(inode_no) {
                fs.part.remove_dir(record.parent.inode(), inode_no);
                Ok(())
            } else {
                log::warn!("dir {path} is not empty, it is not allowed to delete");
                Err(Error::DirectoryNotEmpty)
            };
            fs.part.close_dir(dir);

            result
        })
    }

    pub fn opendir(&mut self, task: &Task, path: &str) -> Result<Dir> {
        let path = resolve(task, path)?;
        if path == "/" {
            return Ok(Dir::root());
        }

        self.with_search(&path, |fs, found, record| {
            let Some(inode_no) = found else {
                log::warn!("in {path}, sub path {} not exist", record.searched_path);
                return Err(Error::NotFound);
            };
            check_depth(&path, record)?;
            if !record.kind.is_dir() {
                log::warn!("{path} is regular file");
                return Err(Error::NotADirectory);
            }

            Ok(fs.part.open_dir(inode_no))
        })
    }

    #[inline]
    pub fn closedir(&mut self, dir: Dir) {
        self.part.close_dir(dir);
    }

    pub fn readdir(&mut self, dir: &mut Dir) -> Option<DirEntry> {
        self.part.read_entry(dir).map(|entry| DirEntry {
            inode: entry.inode_no() as u64,
            ty: entry.kind(),
            name: String::from(entry.name()),
        })
    }

    #[inline]
    pub fn rewinddir(&mut self, dir: &mut Dir) {
        dir.rewind();
    }

    pub fn stat(&mut self, task: &Task, path: &str) -> Result<Stat> {
        let path = resolve(task, path)?;
        self.with_search(&path, |fs, found, record| {
            let Some(inode_no) = found else {
                log::warn!("{path} not found");
                return Err(Error::NotFound);
            };
            check_depth(&path, record)?;

            fs.part.open_inode(inode_no);
            let size = fs.part.inode(inode_no).disk.size;
            fs.part.close_inode(inode_no);

            Ok(Stat {
                inode: inode_no as u64,
                mode: record.kind,
                block_size: SECTOR_SIZE as u64,
                blocks: DiskInode::blocks_for(size) as u64,
                size: size as u64,
            })
        })
    }

    /// 切换任务的工作目录
    pub fn chdir(&mut self, task: &mut Task, path: &str) -> Result<()> {
        let path = resolve(task, path)?;
        self.with_search(&path, |_, found, record| {
            if found.is_none() {
                return Err(Error::NotFound);
            }
            check_depth(&path, record)?;
            if !record.kind.is_dir() {
                return Err(Error::NotADirectory);
            }
            Ok(())
        })?;

        task.set_cwd(path);
        Ok(())
    }

    #[inline]
    pub fn getcwd<'t>(&self, task: &'t Task) -> &'t str {
        task.cwd()
    }
}

/// 相对工作目录规范化路径。过长的参数先行拒绝，不论其中的 .. 能否把它缩短。
fn resolve(task: &Task, path: &str) -> Result<String> {
    if path.len() >= MAX_PATH_LEN {
        log::warn!("path of {} bytes is too long", path.len());
        return Err(Error::PathTooLong);
    }

    Ok(path.canonicalize(task.cwd()))
}

/// 查找停在了中间某一层：缺少的是途经的目录，而不只是最后一项
fn check_depth(path: &str, record: &SearchRecord) -> Result<()> {
    if path::depth(path) == path::depth(&record.searched_path) {
        return Ok(());
    }

    log::warn!(
        "cannot access {path}: subpath {} is not a directory or does not exist",
        record.searched_path
    );
    if record.kind == DirEntryType::Regular {
        Err(Error::NotADirectory)
    } else {
        Err(Error::NotFound)
    }
}

/// 新建文件或目录的名字
fn file_name(path: &str) -> Result<&str> {
    let (_, name) = path.parent_file().ok_or(Error::AlreadyExists)?;
    if name.len() > MAX_FILE_NAME_LEN {
        log::warn!("file name {name:?} too long");
        return Err(Error::NameTooLong);
    }

    Ok(name)
}
