#![allow(dead_code)]

use std::sync::Arc;

use block_dev::{BlockDevice, RamDisk};
use sfs::FileSystem;

pub const SECTORS: u32 = 65536;

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 格式化并挂载一块新的内存盘
pub fn new_fs() -> (Arc<dyn BlockDevice>, FileSystem) {
    init_log();
    let device: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(SECTORS as usize));
    FileSystem::format(&device, 0, SECTORS).unwrap();
    let fs = FileSystem::mount(device.clone(), 0).unwrap();

    (device, fs)
}

/// 两张位图的快照
pub fn bitmaps(fs: &FileSystem) -> (Vec<u8>, Vec<u8>) {
    let part = fs.partition();
    (
        part.inode_bitmap().as_bytes().to_vec(),
        part.block_bitmap().as_bytes().to_vec(),
    )
}
