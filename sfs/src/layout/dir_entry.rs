use core::mem;

use vfs::DirEntryType;

use crate::{MAX_FILE_NAME_LEN, SECTOR_SIZE};

/// 每个扇区容纳的目录项数，目录项从不跨扇区
pub const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / mem::size_of::<DirEntry>();

/// 目录项：名字、inode 号与类型
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DirEntry {
    // 名字恰好 16 字节时没有结尾的 \0
    name: [u8; MAX_FILE_NAME_LEN],
    inode_no: u32,
    /// 见 [`DirEntryType`]，0 表示空闲槽位
    kind: u8,
    _pad: [u8; 3],
}

impl DirEntry {
    /// 目录项大小恒为24字节
    pub const SIZE: usize = 24;

    pub fn new(name: &str, inode_no: u32, kind: DirEntryType) -> Self {
        let bytes = name.as_bytes();
        assert!(
            !bytes.is_empty() && bytes.len() <= MAX_FILE_NAME_LEN,
            "bad entry name {name:?}"
        );

        let mut buf = [0; MAX_FILE_NAME_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);

        Self {
            name: buf,
            inode_no,
            kind: kind as u8,
            _pad: [0; 3],
        }
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_FILE_NAME_LEN);
        // 名字只能经由 &str 写入；损坏的名字当作空名，不会与任何查找匹配
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    #[inline]
    pub fn inode_no(&self) -> u32 {
        self.inode_no
    }

    #[inline]
    pub fn kind(&self) -> DirEntryType {
        DirEntryType::from_tag(self.kind)
    }

    /// 是否为占用中的槽位
    #[inline]
    pub fn is_used(&self) -> bool {
        self.kind() != DirEntryType::Unknown
    }

    /// 是否为`.`或`..`
    #[inline]
    pub fn is_dot(&self) -> bool {
        matches!(self.name(), "." | "..")
    }
}
