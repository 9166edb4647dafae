use alloc::string::String;

/// 读目录所得的目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number
    pub inode: u64,
    pub ty: DirEntryType,
    pub name: String,
}

/// 目录项类型，数值即磁盘上的类型标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DirEntryType {
    /// 空闲槽位
    #[default]
    Unknown = 0,
    Regular = 1,
    Directory = 2,
}

impl DirEntryType {
    /// 从磁盘标记解析，未知的值视作空闲槽位
    #[inline]
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            1 => Self::Regular,
            2 => Self::Directory,
            _ => Self::Unknown,
        }
    }

    #[inline]
    pub fn is_dir(self) -> bool {
        self == Self::Directory
    }
}
