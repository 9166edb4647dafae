//! # 磁盘数据结构层
//!
//! 分区的磁盘布局（以扇区计）：
//! 引导扇区 | 超级块 | 块位图 | inode 位图 | inode 表 | 数据区

use core::{mem, ptr};

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{BlockSlot, DiskInode, IndirectBlock, DIRECT_COUNT, INDIRECT_COUNT, MAX_FILE_BLOCKS};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, ENTRIES_PER_SECTOR};

/// 可以与磁盘上的字节直接互转的结构
///
/// # Safety
///
/// 实现者须为`#[repr(C)]`、不含隐式填充，且任意位模式都是合法值。
pub unsafe trait Plain: Copy {
    const SIZE: usize = mem::size_of::<Self>();

    /// 从`bytes`开头读出一个值，不要求对齐
    #[inline]
    fn read_from(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= Self::SIZE);
        // SAFETY: 长度已检查，Plain 保证任意字节都构成合法值
        unsafe { ptr::read_unaligned(bytes.as_ptr().cast()) }
    }

    /// 把值写到`bytes`开头，不要求对齐
    #[inline]
    fn write_to(&self, bytes: &mut [u8]) {
        assert!(bytes.len() >= Self::SIZE);
        // SAFETY: 长度已检查
        unsafe { ptr::write_unaligned(bytes.as_mut_ptr().cast(), *self) }
    }
}

unsafe impl Plain for SuperBlock {}
unsafe impl Plain for DiskInode {}
unsafe impl Plain for DirEntry {}
unsafe impl Plain for IndirectBlock {}
