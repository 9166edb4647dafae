//! # 块设备接口层
//!
//! 块设备是以**扇区**为单位存储数据的设备，例如磁盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 读写都是同步的：调用返回时传输已经完成。
//! 驱动无法完成传输时直接 panic，文件系统不处理设备错误。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod ram;

use core::any::Any;

pub use self::ram::RamDisk;

/// 扇区大小
pub const SECTOR_SIZE: usize = 512;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 读取一个扇区，`buf`长度为[`SECTOR_SIZE`]
    fn read_block(&self, block_id: usize, buf: &mut [u8]);

    /// 写入一个扇区，`buf`长度为[`SECTOR_SIZE`]
    fn write_block(&self, block_id: usize, buf: &[u8]);

    /// 从`start`起连续读取`buf.len() / SECTOR_SIZE`个扇区
    fn read_blocks(&self, start: usize, buf: &mut [u8]) {
        assert_eq!(buf.len() % SECTOR_SIZE, 0, "partial sector transfer");
        for (i, sector) in buf.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            self.read_block(start + i, sector);
        }
    }

    /// 从`start`起连续写入`buf.len() / SECTOR_SIZE`个扇区
    fn write_blocks(&self, start: usize, buf: &[u8]) {
        assert_eq!(buf.len() % SECTOR_SIZE, 0, "partial sector transfer");
        for (i, sector) in buf.chunks_exact(SECTOR_SIZE).enumerate() {
            self.write_block(start + i, sector);
        }
    }
}
