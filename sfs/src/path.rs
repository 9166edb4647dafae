//! # 路径解析层
//!
//! 路径先经 [`Path::canonicalize`] 化为不含`.`与`..`的绝对路径，
//! 再由 [`Partition::search_file`] 从根目录逐级查找。

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec::Vec;

use vfs::{DirEntryType, Error, Result};

use crate::dir::Dir;
use crate::partition::Partition;
use crate::{MAX_PATH_LEN, ROOT_INODE};

pub trait Path: ToOwned {
    fn is_absolute(&self) -> bool;

    /// 返回不以`/`结束、不包含相对项的绝对路径。
    ///
    /// # 参数
    ///
    /// `cwd`: 来自于[`Task`](crate::Task)，为绝对路径，
    ///        且非根时不以`/`结束。
    fn canonicalize(&self, cwd: &Self) -> Self::Owned;

    /// 返回路径的`(父目录, 文件名)`，根目录没有文件名
    fn parent_file(&self) -> Option<(&Self, &Self)>;

    fn is_relative(&self) -> bool {
        !self.is_absolute()
    }
}

impl Path for str {
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn canonicalize(&self, cwd: &Self) -> Self::Owned {
        let mut cmps = Vec::new();
        if self.is_relative() {
            cmps.extend(cwd.split('/').filter(|s| !s.is_empty()));
        }

        for cmp in self.split('/') {
            match cmp {
                // 根目录的上级仍是根目录
                ".." => {
                    cmps.pop();
                }
                "." | "" => (),
                s => cmps.push(s),
            }
        }

        if cmps.is_empty() {
            return String::from("/");
        }
        cmps.insert(0, ""); // 在接下来的拼接中代表根目录
        cmps.join("/")
    }

    fn parent_file(&self) -> Option<(&Self, &Self)> {
        if self == "/" {
            return None;
        }

        self.rsplit_once('/')
            .map(|(p, f)| if p.is_empty() { ("/", f) } else { (p, f) })
    }
}

/// 取出路径的第一项，返回`(该项, 剩余部分)`，剩余部分为空时返回空
pub fn parse_component(path: &str) -> (&str, Option<&str>) {
    let path = path.trim_start_matches('/');
    match path.find('/') {
        Some(end) => (&path[..end], Some(&path[end..])),
        None if path.is_empty() => ("", None),
        None => (path, None),
    }
}

/// 路径的层数，即其中文件名的个数
pub fn depth(path: &str) -> usize {
    let mut depth = 0;
    let mut rest = Some(path);
    while let Some(path) = rest {
        let (name, next) = parse_component(path);
        if name.is_empty() {
            break;
        }
        depth += 1;
        rest = next;
    }

    depth
}

/// 路径查找的过程记录
#[derive(Debug)]
pub struct SearchRecord {
    /// 已查找过的路径，查找失败时可据此判断缺失的是哪一层
    pub searched_path: String,
    /// 最后到达的目录：找到时为目标的父目录，没找到时为最深的已存在目录
    pub parent: Dir,
    pub kind: DirEntryType,
}

impl Partition {
    /// 从根目录起按`path`逐级查找，找到时返回 inode 号。
    ///
    /// 途经的普通文件会终止查找。不论成败，调用者都要关闭记录中的父目录。
    pub(crate) fn search_file(&mut self, path: &str) -> Result<(Option<u32>, SearchRecord)> {
        if path.len() >= MAX_PATH_LEN {
            return Err(Error::PathTooLong);
        }
        if !path.is_absolute() {
            return Err(Error::InvalidArgument);
        }

        let mut record = SearchRecord {
            searched_path: String::new(),
            parent: Dir::root(),
            kind: DirEntryType::Unknown,
        };
        if matches!(path, "/" | "/." | "/..") {
            record.kind = DirEntryType::Directory;
            return Ok((Some(ROOT_INODE), record));
        }

        let mut grandparent = ROOT_INODE;
        let mut rest = Some(path);
        let mut found = None;
        while let Some(path) = rest {
            let (name, next) = parse_component(path);
            if name.is_empty() {
                break;
            }
            record.searched_path.push('/');
            record.searched_path.push_str(name);

            let Some(entry) = self.search_entry(record.parent.inode(), name) else {
                return Ok((None, record));
            };
            found = Some(entry.inode_no());
            record.kind = entry.kind();
            match entry.kind() {
                DirEntryType::Directory => {
                    grandparent = record.parent.inode();
                    let parent = core::mem::replace(&mut record.parent, Dir::root());
                    self.close_dir(parent);
                    record.parent = self.open_dir(entry.inode_no());
                    rest = next;
                }
                _ => return Ok((found, record)),
            }
        }

        // 目标是目录：父目录退回上一级
        if found.is_some() {
            let dir = core::mem::replace(&mut record.parent, Dir::root());
            self.close_dir(dir);
            record.parent = self.open_dir(grandparent);
        }

        Ok((found, record))
    }
}
