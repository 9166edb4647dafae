
use std::fs::File;
use std::io::{Read, Write};
use std::io::{Seek, SeekFrom};
use std::sync::Mutex;

use block_dev::{BlockDevice, SECTOR_SIZE};

/// 以宿主机上的文件充当磁盘
pub struct BlockFile(pub Mutex<File>);

impl BlockFile {
    /// 打开或创建镜像文件，并把它扩展到`sectors`个扇区
    pub fn create(file: File, sectors: u32) -> std::io::Result<Self> {
        file.set_len(sectors as u64 * SECTOR_SIZE as u64)?;
        Ok(Self(Mutex::new(file)))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete sector!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete sector!");
    }
}
