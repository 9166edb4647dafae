//! 多步操作的回滚记录
//!
//! 每完成一步就记下如何撤销它，失败时按相反的顺序逐一撤销。

use alloc::vec::Vec;

use crate::file::FileTable;
use crate::partition::Partition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// 在内存中置位、尚未写回的 inode 号
    InodeBit(u32),
    /// 已分配并写回位图的数据块
    Block(u32),
    /// 已占用的全局打开文件表槽位
    FileSlot(usize),
}

#[derive(Debug, Default)]
#[must_use]
pub(crate) struct UndoLog {
    steps: Vec<Step>,
}

impl UndoLog {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// 操作成功，丢弃记录
    #[inline]
    pub fn commit(self) {}

    pub fn unwind(self, part: &mut Partition, files: &mut FileTable) {
        for step in self.steps.into_iter().rev() {
            log::debug!("roll back {step:?}");
            match step {
                Step::InodeBit(inode_no) => part.undo_inode(inode_no),
                Step::Block(lba) => part.free_block(lba),
                Step::FileSlot(slot) => files.clear(slot),
            }
        }
    }
}
