use core::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 位图中已无空闲的 inode 或数据块
    NoSpace,
    /// 目录的 140 个块都已写满
    DirectoryFull,
    /// 全局打开文件表或任务的描述符表已满
    TooManyOpenFiles,
    /// 写入后会超出单文件容量上限
    FileTooLarge,
    NameTooLong,
    PathTooLong,
    NotFound,
    AlreadyExists,
    IsADirectory,
    NotADirectory,
    DirectoryNotEmpty,
    /// 文件正被使用：已打开、或已有写者
    Busy,
    BadDescriptor,
    PermissionDenied,
    InvalidArgument,
    /// 分区上没有可识别的文件系统
    InvalidFileSystem,
}

/// 错误的大类，供系统调用层记录诊断信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    AllocationExhausted,
    CapacityExceeded,
    NotFound,
    TypeMismatch,
    Busy,
    Usage,
}

impl Error {
    pub fn class(self) -> ErrorClass {
        use Error::*;

        match self {
            NoSpace | DirectoryFull | TooManyOpenFiles => ErrorClass::AllocationExhausted,
            FileTooLarge | NameTooLong | PathTooLong => ErrorClass::CapacityExceeded,
            NotFound => ErrorClass::NotFound,
            AlreadyExists | IsADirectory | NotADirectory | DirectoryNotEmpty => {
                ErrorClass::TypeMismatch
            }
            Busy => ErrorClass::Busy,
            BadDescriptor | PermissionDenied | InvalidArgument | InvalidFileSystem => {
                ErrorClass::Usage
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NoSpace => "no space left on partition",
            Self::DirectoryFull => "directory is full",
            Self::TooManyOpenFiles => "too many open files",
            Self::FileTooLarge => "file too large",
            Self::NameTooLong => "file name too long",
            Self::PathTooLong => "path too long",
            Self::NotFound => "no such file or directory",
            Self::AlreadyExists => "file exists",
            Self::IsADirectory => "is a directory",
            Self::NotADirectory => "not a directory",
            Self::DirectoryNotEmpty => "directory not empty",
            Self::Busy => "file is busy",
            Self::BadDescriptor => "bad file descriptor",
            Self::PermissionDenied => "permission denied",
            Self::InvalidArgument => "invalid argument",
            Self::InvalidFileSystem => "no filesystem on partition",
        };
        f.write_str(msg)
    }
}
