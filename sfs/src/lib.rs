#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* sfs 的整体架构，自上而下 */

// 系统调用层：把文件系统操作的结果折算为系统调用返回值
pub mod syscall;

// 文件系统上下文：分区、全局打开文件表与根目录
mod fs;

// 路径解析层
mod path;

// 文件层：打开文件表、文件的创建与读写
mod file;

// 目录层：目录项的查找、插入、删除与遍历
mod dir;

// 索引节点层：inode 的定位、缓存与同步
mod inode;

// 分区层：格式化、挂载与位图分配
mod partition;

// 多步操作的回滚记录
mod undo;

// 任务：文件描述符表与工作目录
mod task;

// 磁盘数据结构层
pub mod layout;

pub use block_dev::{BlockDevice, SECTOR_SIZE};

pub use self::{
    dir::Dir,
    file::{OpenFlag, Whence},
    fs::FileSystem,
    partition::Partition,
    path::Path,
    task::Task,
};

pub const MAGIC: u32 = 0x19590318;
pub const BITS_PER_SECTOR: usize = SECTOR_SIZE * 8;

/// 分区内 inode 数量上限
pub const MAX_FILES_PER_PART: usize = 4096;
/// 根目录的 inode 号
pub const ROOT_INODE: u32 = 0;

pub const MAX_FILE_NAME_LEN: usize = 16;
pub const MAX_PATH_LEN: usize = 512;

/// 单个文件的最大字节数
pub const MAX_FILE_SIZE: usize = layout::MAX_FILE_BLOCKS * SECTOR_SIZE;

/// 全局打开文件表容量，0~2 留给标准流
pub const MAX_FILE_OPEN: usize = 32;
/// 每个任务的文件描述符数量，0~2 为标准流
pub const MAX_FILES_OPEN_PER_PROC: usize = 8;
/// 标准输入、输出、错误
pub const STD_STREAMS: usize = 3;

type DataBlock = [u8; SECTOR_SIZE];
