//! File and filesystem-related syscalls
//!
//! 每个调用锁住整个文件系统后转发，失败时记录原因并返回 -1。

use enumflags2::BitFlags;
use spin::Mutex;
use vfs::{DirEntry, Error, Result, Stat};

use crate::{Dir, FileSystem, OpenFlag, Task, Whence};

fn code(syscall: &str, result: Result<isize>) -> isize {
    result.unwrap_or_else(|e| {
        log::error!("{syscall}: {e} ({:?})", e.class());
        -1
    })
}

pub fn sys_open(fs: &Mutex<FileSystem>, task: &mut Task, path: &str, flags: u32) -> isize {
    let result = BitFlags::<OpenFlag>::from_bits(flags)
        .map_err(|_| Error::InvalidArgument)
        .and_then(|flags| fs.lock().open(task, path, flags));

    code("sys_open", result.map(|fd| fd as isize))
}

pub fn sys_close(fs: &Mutex<FileSystem>, task: &mut Task, fd: usize) -> isize {
    code("sys_close", fs.lock().close(task, fd).map(|_| 0))
}

/// try to read bytes with length `buf.len()` from the file with `fd` to `buf`
pub fn sys_read(fs: &Mutex<FileSystem>, task: &Task, fd: usize, buf: &mut [u8]) -> isize {
    code("sys_read", fs.lock().read(task, fd, buf).map(|n| n as isize))
}

/// try to write `buf` to the file with `fd`
pub fn sys_write(fs: &Mutex<FileSystem>, task: &Task, fd: usize, buf: &[u8]) -> isize {
    code("sys_write", fs.lock().write(task, fd, buf).map(|n| n as isize))
}

pub fn sys_lseek(
    fs: &Mutex<FileSystem>,
    task: &Task,
    fd: usize,
    offset: i32,
    whence: u32,
) -> isize {
    let result = Whence::try_from(whence)
        .and_then(|whence| fs.lock().lseek(task, fd, offset, whence))
        .map(|pos| pos as isize);

    code("sys_lseek", result)
}

pub fn sys_unlink(fs: &Mutex<FileSystem>, task: &Task, path: &str) -> isize {
    code("sys_unlink", fs.lock().unlink(task, path).map(|_| 0))
}

pub fn sys_mkdir(fs: &Mutex<FileSystem>, task: &Task, path: &str) -> isize {
    code("sys_mkdir", fs.lock().mkdir(task, path).map(|_| 0))
}

pub fn sys_rmdir(fs: &Mutex<FileSystem>, task: &Task, path: &str) -> isize {
    code("sys_rmdir", fs.lock().rmdir(task, path).map(|_| 0))
}

pub fn sys_opendir(fs: &Mutex<FileSystem>, task: &Task, path: &str) -> Option<Dir> {
    fs.lock()
        .opendir(task, path)
        .inspect_err(|e| log::error!("sys_opendir: {e}"))
        .ok()
}

pub fn sys_closedir(fs: &Mutex<FileSystem>, dir: Dir) {
    fs.lock().closedir(dir);
}

pub fn sys_readdir(fs: &Mutex<FileSystem>, dir: &mut Dir) -> Option<DirEntry> {
    fs.lock().readdir(dir)
}

pub fn sys_rewinddir(fs: &Mutex<FileSystem>, dir: &mut Dir) {
    fs.lock().rewinddir(dir);
}

pub fn sys_stat(fs: &Mutex<FileSystem>, task: &Task, path: &str, stat: &mut Stat) -> isize {
    let result = fs.lock().stat(task, path).map(|st| {
        *stat = st;
        0
    });

    code("sys_stat", result)
}

pub fn sys_chdir(fs: &Mutex<FileSystem>, task: &mut Task, path: &str) -> isize {
    code("sys_chdir", fs.lock().chdir(task, path).map(|_| 0))
}

/// 把工作目录以 NULL 结尾写入`buf`，返回路径长度；`buf`放不下时返回 -1
pub fn sys_getcwd(fs: &Mutex<FileSystem>, task: &Task, buf: &mut [u8]) -> isize {
    let fs = fs.lock();
    let cwd = fs.getcwd(task).as_bytes();
    if cwd.len() + 1 > buf.len() {
        log::error!("sys_getcwd: buffer of {} bytes is too small", buf.len());
        return -1;
    }

    buf[..cwd.len()].copy_from_slice(cwd);
    buf[cwd.len()] = 0;
    cwd.len() as isize
}
