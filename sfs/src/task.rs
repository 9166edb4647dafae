use alloc::string::String;

use vfs::{Error, Result};

use crate::{MAX_FILES_OPEN_PER_PROC, STD_STREAMS};

/// 任务中与文件系统有关的部分
#[derive(Debug, Clone)]
pub struct Task {
    pub pid: usize,
    /// 描述符 → 全局打开文件表下标，0~2 绑定标准流
    fd_table: [Option<usize>; MAX_FILES_OPEN_PER_PROC],
    /// 工作目录：绝对路径，非根时不以`/`结束
    cwd: String,
}

impl Task {
    pub fn new(pid: usize) -> Self {
        let mut fd_table = [None; MAX_FILES_OPEN_PER_PROC];
        for (fd, slot) in fd_table.iter_mut().take(STD_STREAMS).enumerate() {
            *slot = Some(fd);
        }

        Self {
            pid,
            fd_table,
            cwd: String::from("/"),
        }
    }

    #[inline]
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    #[inline]
    pub(crate) fn set_cwd(&mut self, cwd: String) {
        self.cwd = cwd;
    }

    /// 把全局表下标装入描述符表，返回描述符
    pub(crate) fn install(&mut self, global: usize) -> Result<usize> {
        let (fd, slot) = self
            .fd_table
            .iter_mut()
            .enumerate()
            .skip(STD_STREAMS)
            .find(|(_, slot)| slot.is_none())
            .ok_or_else(|| {
                log::warn!("task {}: exceed max open files per task", self.pid);
                Error::TooManyOpenFiles
            })?;
        *slot = Some(global);

        Ok(fd)
    }

    /// 描述符对应的全局表下标。标准流由控制台处理，不在此列。
    pub(crate) fn global(&self, fd: usize) -> Result<usize> {
        if fd < STD_STREAMS {
            return Err(Error::BadDescriptor);
        }

        self.fd_table
            .get(fd)
            .copied()
            .flatten()
            .ok_or(Error::BadDescriptor)
    }

    pub(crate) fn uninstall(&mut self, fd: usize) -> Result<usize> {
        let global = self.global(fd)?;
        self.fd_table[fd] = None;

        Ok(global)
    }

    /// 除标准流外所有已打开的描述符
    pub fn open_fds(&self) -> impl Iterator<Item = usize> + '_ {
        self.fd_table
            .iter()
            .enumerate()
            .skip(STD_STREAMS)
            .filter_map(|(fd, slot)| slot.map(|_| fd))
    }
}
