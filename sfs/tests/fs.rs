mod common;

use std::sync::Arc;
use std::thread;

use block_dev::{BlockDevice, RamDisk};
use sfs::syscall::*;
use sfs::{FileSystem, OpenFlag, Path, Task, Whence, MAGIC};
use spin::Mutex;
use vfs::{DirEntryType, Error, Stat};

use common::{bitmaps, new_fs};

const CREATE_RDWR: u32 = OpenFlag::CREATE as u32 | OpenFlag::RDWR as u32;

fn names(fs: &mut FileSystem, task: &Task, path: &str) -> Vec<String> {
    let mut dir = fs.opendir(task, path).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = fs.readdir(&mut dir) {
        names.push(entry.name);
    }
    fs.closedir(dir);
    names
}

#[test]
fn fresh_partition() {
    let (device, mut fs) = new_fs();
    let sb = *fs.partition().super_block();
    assert!(sb.is_valid());
    assert_eq!(sb.root_inode_no, 0);
    assert_eq!(sb.inode_count, 4096);
    assert_eq!(sb.dir_entry_size, 24);
    assert_eq!(
        (sb.block_bitmap_lba, sb.block_bitmap_sects),
        (2, 16),
        "65053 free sectors need 16 bitmap sectors"
    );
    assert_eq!(sb.inode_bitmap_lba, 18);
    assert_eq!((sb.inode_table_lba, sb.inode_table_sects), (19, 480));
    assert_eq!(sb.data_start_lba, 499);

    let mut sector = [0u8; 512];
    device.read_block(1, &mut sector);
    assert_eq!(sector[..4], MAGIC.to_le_bytes());

    let task = Task::new(0);
    let root = fs.stat(&task, "/").unwrap();
    assert_eq!(root.inode, 0);
    assert_eq!(root.size, 48);
    assert_eq!(root.mode, DirEntryType::Directory);
    assert_eq!(names(&mut fs, &task, "/"), [".", ".."]);

    // 根目录占用的第 0 块，外加位图末尾 499 个不对应数据块的位
    assert_eq!(fs.partition().inode_bitmap().count_ones(), 1);
    assert_eq!(fs.partition().block_bitmap().count_ones(), 1 + 499);
}

#[test]
fn create_then_unlink_restores_bitmaps() {
    let (device, mut fs) = new_fs();
    let mut task = Task::new(1);
    let before = bitmaps(&fs);

    let fd = fs.open(&mut task, "/a", OpenFlag::CREATE | OpenFlag::RDWR).unwrap();
    assert_eq!(fd, 3);
    assert_eq!(fs.write(&task, fd, b"hello").unwrap(), 5);
    fs.close(&mut task, fd).unwrap();
    assert_ne!(bitmaps(&fs), before);

    fs.unlink(&task, "/a").unwrap();
    assert_eq!(bitmaps(&fs), before);
    assert_eq!(fs.stat(&task, "/").unwrap().size, 48);
    assert_eq!(fs.stat(&task, "/a"), Err(Error::NotFound));

    // 磁盘上的位图同样复原
    drop(fs);
    let mut fs = FileSystem::mount(device, 0).unwrap();
    assert_eq!(bitmaps(&fs), before);

    // 同名文件复用同一个 inode 与目录槽位
    let fd = fs.open(&mut task, "/a", OpenFlag::CREATE | OpenFlag::RDWR).unwrap();
    assert_eq!(fs.stat(&task, "/a").unwrap().inode, 1);
    assert_eq!(names(&mut fs, &task, "/"), [".", "..", "a"]);
    fs.close(&mut task, fd).unwrap();
}

#[test]
fn oversized_write_is_rejected() {
    let (_, fs) = new_fs();
    let fs = Mutex::new(fs);
    let mut task = Task::new(1);

    let fd = sys_open(&fs, &mut task, "/big", CREATE_RDWR);
    assert_eq!(fd, 3);
    let before = bitmaps(&fs.lock());

    assert_eq!(sys_write(&fs, &task, fd as usize, &vec![7; 100_000]), -1);
    assert_eq!(bitmaps(&fs.lock()), before);

    let mut stat = Stat {
        inode: 0,
        mode: DirEntryType::Unknown,
        block_size: 0,
        blocks: 0,
        size: u64::MAX,
    };
    assert_eq!(sys_stat(&fs, &task, "/big", &mut stat), 0);
    assert_eq!((stat.size, stat.blocks), (0, 0));

    // 恰好写满上限
    assert_eq!(sys_write(&fs, &task, fd as usize, &vec![7; 71680]), 71680);
    assert_eq!(sys_write(&fs, &task, fd as usize, b"x"), -1);
    assert_eq!(sys_stat(&fs, &task, "/big", &mut stat), 0);
    assert_eq!((stat.size, stat.blocks), (71680, 140));
}

#[test]
fn rmdir_requires_empty_directory() {
    let (_, fs) = new_fs();
    let fs = Mutex::new(fs);
    let mut task = Task::new(1);
    let before = bitmaps(&fs.lock());

    assert_eq!(sys_mkdir(&fs, &task, "/a"), 0);
    let fd = sys_open(&fs, &mut task, "/a/f", CREATE_RDWR);
    assert!(fd >= 3);
    assert_eq!(sys_close(&fs, &mut task, fd as usize), 0);

    assert_eq!(sys_rmdir(&fs, &task, "/a"), -1);
    assert_eq!(fs.lock().rmdir(&task, "/a"), Err(Error::DirectoryNotEmpty));

    assert_eq!(sys_unlink(&fs, &task, "/a/f"), 0);
    assert_eq!(sys_rmdir(&fs, &task, "/a"), 0);
    assert!(sys_opendir(&fs, &task, "/a").is_none());
    assert_eq!(bitmaps(&fs.lock()), before);
}

#[test]
fn single_writer_per_file() {
    let (_, fs) = new_fs();
    let fs = Mutex::new(fs);
    let mut task = Task::new(1);

    let fd = sys_open(&fs, &mut task, "/f", CREATE_RDWR);
    assert_eq!(sys_close(&fs, &mut task, fd as usize), 0);

    let first = sys_open(&fs, &mut task, "/f", OpenFlag::WRONLY as u32);
    assert!(first >= 3);
    assert_eq!(sys_open(&fs, &mut task, "/f", OpenFlag::RDWR as u32), -1);
    assert_eq!(fs.lock().open(&mut task, "/f", OpenFlag::RDWR.into()), Err(Error::Busy));

    // 读者不受影响
    let reader = sys_open(&fs, &mut task, "/f", OpenFlag::RDONLY);
    assert!(reader >= 3);
    assert_eq!(sys_close(&fs, &mut task, reader as usize), 0);

    assert_eq!(sys_close(&fs, &mut task, first as usize), 0);
    assert!(sys_open(&fs, &mut task, "/f", OpenFlag::RDWR as u32) >= 3);
}

#[test]
fn data_survives_remount() {
    let (device, mut fs) = new_fs();
    let mut task = Task::new(1);
    let data: Vec<u8> = (0..30_000u32).map(|i| (i * 7 % 256) as u8).collect();

    fs.mkdir(&task, "/d").unwrap();
    let fd = fs.open(&mut task, "/d/f", OpenFlag::CREATE | OpenFlag::WRONLY).unwrap();
    for chunk in data.chunks(1000) {
        fs.write(&task, fd, chunk).unwrap();
    }
    fs.close(&mut task, fd).unwrap();
    let before = bitmaps(&fs);
    drop(fs);

    let mut fs = FileSystem::mount(device, 0).unwrap();
    assert_eq!(bitmaps(&fs), before);

    let fd = fs.open(&mut task, "/d/f", OpenFlag::read_only()).unwrap();
    let mut buf = vec![0; 40_000];
    assert_eq!(fs.read(&task, fd, &mut buf).unwrap(), data.len());
    assert_eq!(&buf[..data.len()], &data[..]);
    assert_eq!(fs.read(&task, fd, &mut buf).unwrap(), 0);

    assert_eq!(fs.lseek(&task, fd, 12_345, Whence::Set).unwrap(), 12_345);
    assert_eq!(fs.read(&task, fd, &mut buf[..10]).unwrap(), 10);
    assert_eq!(&buf[..10], &data[12_345..12_355]);
    assert_eq!(fs.lseek(&task, fd, -1, Whence::End).unwrap(), 29_999);
    assert_eq!(fs.lseek(&task, fd, 1, Whence::Cur), Err(Error::InvalidArgument));
}

#[test]
fn directory_listing() {
    let (_, mut fs) = new_fs();
    let mut task = Task::new(1);

    fs.mkdir(&task, "/d").unwrap();
    fs.mkdir(&task, "/d/sub").unwrap();
    for name in ["x", "y"] {
        let fd = fs
            .open(&mut task, &format!("/d/{name}"), OpenFlag::CREATE | OpenFlag::RDWR)
            .unwrap();
        fs.close(&mut task, fd).unwrap();
    }

    let mut dir = fs.opendir(&task, "/d").unwrap();
    let mut entries = Vec::new();
    while let Some(entry) = fs.readdir(&mut dir) {
        entries.push((entry.name, entry.ty));
    }
    assert_eq!(
        entries,
        [
            (".".to_string(), DirEntryType::Directory),
            ("..".to_string(), DirEntryType::Directory),
            ("sub".to_string(), DirEntryType::Directory),
            ("x".to_string(), DirEntryType::Regular),
            ("y".to_string(), DirEntryType::Regular),
        ]
    );

    fs.rewinddir(&mut dir);
    assert_eq!(fs.readdir(&mut dir).unwrap().name, ".");
    fs.closedir(dir);

    // .. 指回父目录
    let parent = fs.stat(&task, "/d").unwrap().inode;
    let mut dir = fs.opendir(&task, "/d/sub").unwrap();
    fs.readdir(&mut dir);
    assert_eq!(fs.readdir(&mut dir).unwrap().inode, parent);
    fs.closedir(dir);

    assert_eq!(fs.opendir(&task, "/d/x").unwrap_err(), Error::NotADirectory);
    assert_eq!(fs.opendir(&task, "/nope").unwrap_err(), Error::NotFound);
    assert_eq!(fs.stat(&task, "/d").unwrap().size, 5 * 24);
}

#[test]
fn relative_paths_and_cwd() {
    let (_, fs) = new_fs();
    let fs = Mutex::new(fs);
    let mut task = Task::new(1);

    assert_eq!(sys_mkdir(&fs, &task, "/home"), 0);
    assert_eq!(sys_mkdir(&fs, &task, "home/u"), 0);
    assert_eq!(sys_chdir(&fs, &mut task, "/home/u"), 0);

    let mut buf = [0u8; 32];
    assert_eq!(sys_getcwd(&fs, &task, &mut buf), 7);
    assert_eq!(&buf[..8], b"/home/u\0");
    assert_eq!(sys_getcwd(&fs, &task, &mut buf[..7]), -1);

    let fd = sys_open(&fs, &mut task, "notes", CREATE_RDWR);
    assert!(fd >= 3);
    assert_eq!(sys_write(&fs, &task, fd as usize, b"abc"), 3);

    assert_eq!(sys_chdir(&fs, &mut task, ".."), 0);
    assert_eq!(task.cwd(), "/home");
    assert_eq!(fs.lock().stat(&task, "u/notes").unwrap().size, 3);
    assert_eq!(fs.lock().stat(&task, "./u/../u/notes").unwrap().size, 3);

    assert_eq!(sys_chdir(&fs, &mut task, "u/notes"), -1);
    assert_eq!(fs.lock().chdir(&mut task, "/missing"), Err(Error::NotFound));
    assert_eq!(task.cwd(), "/home");
}

#[test]
fn open_errors() {
    let (_, mut fs) = new_fs();
    let mut task = Task::new(1);
    let create = OpenFlag::CREATE | OpenFlag::RDWR;

    assert_eq!(fs.open(&mut task, "/dir/", create), Err(Error::IsADirectory));
    fs.mkdir(&task, "/dir").unwrap();
    assert_eq!(fs.mkdir(&task, "/dir"), Err(Error::AlreadyExists));
    assert_eq!(fs.open(&mut task, "/dir", OpenFlag::read_only()), Err(Error::IsADirectory));
    assert_eq!(fs.open(&mut task, "/", OpenFlag::read_only()), Err(Error::IsADirectory));
    assert_eq!(fs.open(&mut task, "/nope/f", create), Err(Error::NotFound));
    assert_eq!(fs.mkdir(&task, "/nope/d"), Err(Error::NotFound));
    assert_eq!(fs.open(&mut task, "/missing", OpenFlag::read_only()), Err(Error::NotFound));

    let fd = fs.open(&mut task, "/f", create).unwrap();
    assert_eq!(fs.open(&mut task, "/f", create), Err(Error::AlreadyExists));
    assert_eq!(fs.open(&mut task, "/f/g", create), Err(Error::NotADirectory));
    assert_eq!(fs.read(&task, fd, &mut [0; 4]), Ok(0));

    // 名字最长 16 字节
    assert_eq!(
        fs.open(&mut task, "/abcdefghijklmnopq", create),
        Err(Error::NameTooLong)
    );
    let fd16 = fs.open(&mut task, "/abcdefghijklmnop", create).unwrap();
    assert_eq!(fs.stat(&task, "/abcdefghijklmnop").unwrap().mode, DirEntryType::Regular);

    let long = format!("/{}", "d/".repeat(300));
    assert_eq!(fs.stat(&task, &long), Err(Error::PathTooLong));

    // 标准流不经过文件系统
    assert_eq!(fs.write(&task, 1, b"x"), Err(Error::BadDescriptor));
    assert_eq!(fs.close(&mut task, 0), Err(Error::BadDescriptor));
    assert_eq!(fs.close(&mut task, 7), Err(Error::BadDescriptor));

    let wronly = fs.open(&mut task, "/w", OpenFlag::CREATE | OpenFlag::WRONLY).unwrap();
    assert_eq!(fs.read(&task, wronly, &mut [0; 4]), Err(Error::PermissionDenied));

    for fd in [fd, fd16, wronly] {
        fs.close(&mut task, fd).unwrap();
    }
}

#[test]
fn unlink_and_rmdir_refusals() {
    let (_, mut fs) = new_fs();
    let mut task = Task::new(1);

    let fd = fs.open(&mut task, "/f", OpenFlag::CREATE | OpenFlag::RDWR).unwrap();
    assert_eq!(fs.unlink(&task, "/f"), Err(Error::Busy));
    fs.close(&mut task, fd).unwrap();
    fs.unlink(&task, "/f").unwrap();
    assert_eq!(fs.unlink(&task, "/f"), Err(Error::NotFound));

    fs.mkdir(&task, "/d").unwrap();
    assert_eq!(fs.unlink(&task, "/d"), Err(Error::IsADirectory));
    assert_eq!(fs.rmdir(&task, "/"), Err(Error::InvalidArgument));

    let dir = fs.opendir(&task, "/d").unwrap();
    assert_eq!(fs.rmdir(&task, "/d"), Err(Error::Busy));
    fs.closedir(dir);

    let fd = fs.open(&mut task, "/d/g", OpenFlag::CREATE | OpenFlag::RDWR).unwrap();
    fs.close(&mut task, fd).unwrap();
    assert_eq!(fs.rmdir(&task, "/d/g"), Err(Error::NotADirectory));
    assert_eq!(fs.rmdir(&task, "/d/g/h"), Err(Error::NotADirectory));
    assert_eq!(fs.rmdir(&task, "/e"), Err(Error::NotFound));
}

#[test]
fn descriptor_table_exhaustion() {
    let (_, mut fs) = new_fs();
    let mut task = Task::new(1);

    for i in 0..5 {
        let fd = fs
            .open(&mut task, &format!("/f{i}"), OpenFlag::CREATE | OpenFlag::RDWR)
            .unwrap();
        assert_eq!(fd, 3 + i);
    }
    assert_eq!(
        fs.open(&mut task, "/f0", OpenFlag::read_only()),
        Err(Error::TooManyOpenFiles)
    );

    // 任务退出后所有文件都可以删除
    fs.release_task(&mut task);
    assert_eq!(task.open_fds().count(), 0);
    for i in 0..5 {
        fs.unlink(&task, &format!("/f{i}")).unwrap();
    }
}

#[test]
fn init_formats_only_once() {
    common::init_log();
    let device: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(8192));
    assert!(matches!(
        FileSystem::mount(device.clone(), 0),
        Err(Error::InvalidFileSystem)
    ));

    let task = Task::new(1);
    let mut fs = FileSystem::init(device.clone(), 0, 8192).unwrap();
    fs.mkdir(&task, "/keep").unwrap();
    drop(fs);

    let mut fs = FileSystem::init(device, 0, 8192).unwrap();
    assert!(fs.stat(&task, "/keep").unwrap().mode.is_dir());
}

#[test]
fn partition_with_offset() {
    common::init_log();
    let device: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(8192));
    FileSystem::format(&device, 2048, 4096).unwrap();
    assert!(FileSystem::mount(device.clone(), 0).is_err());

    let mut fs = FileSystem::mount(device.clone(), 2048).unwrap();
    let sb = *fs.partition().super_block();
    assert_eq!(sb.base_lba, 2048);
    assert_eq!(sb.block_bitmap_lba, 2050);

    let mut task = Task::new(1);
    let fd = fs.open(&mut task, "/f", OpenFlag::CREATE | OpenFlag::RDWR).unwrap();
    fs.write(&task, fd, &[0xee; 2000]).unwrap();

    // 分区之外的扇区保持不变
    let mut sector = [0u8; 512];
    for lba in (0..2048).chain(2048 + 4096..8192) {
        device.read_block(lba, &mut sector);
        assert!(sector.iter().all(|&b| b == 0), "sector {lba} touched");
    }
}

#[test]
fn tasks_share_one_filesystem() {
    let (_, fs) = new_fs();
    let fs = Arc::new(Mutex::new(fs));
    let (inodes, blocks) = {
        let fs = fs.lock();
        let part = fs.partition();
        (part.inode_bitmap().count_ones(), part.block_bitmap().count_ones())
    };

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let fs = fs.clone();
            thread::spawn(move || {
                let mut task = Task::new(t);
                let dir = format!("/t{t}");
                assert_eq!(sys_mkdir(&fs, &task, &dir), 0);
                for i in 0..5 {
                    let fd = sys_open(&fs, &mut task, &format!("{dir}/f{i}"), CREATE_RDWR);
                    assert!(fd >= 3);
                    assert_eq!(sys_write(&fs, &task, fd as usize, &[t as u8; 700]), 700);
                    assert_eq!(sys_close(&fs, &mut task, fd as usize), 0);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // 每个目录 1 块，每个文件 2 块
    let mut fs = fs.lock();
    let part = fs.partition();
    assert_eq!(part.inode_bitmap().count_ones(), inodes + 4 + 20);
    assert_eq!(part.block_bitmap().count_ones(), blocks + 4 + 40);

    let mut task = Task::new(9);
    for t in 0..4usize {
        for i in 0..5 {
            let fd = fs
                .open(&mut task, &format!("/t{t}/f{i}"), OpenFlag::read_only())
                .unwrap();
            let mut buf = [0; 1024];
            assert_eq!(fs.read(&task, fd, &mut buf).unwrap(), 700);
            assert!(buf[..700].iter().all(|&b| b == t as u8));
            fs.close(&mut task, fd).unwrap();
        }
    }
}

#[test]
fn directory_growth_rolls_back_when_out_of_blocks() {
    common::init_log();
    // 数据区共 20 块
    let device: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(504));
    let mut fs = FileSystem::init(device.clone(), 0, 504).unwrap();
    let mut task = Task::new(1);

    let fd = fs.open(&mut task, "/data", OpenFlag::CREATE | OpenFlag::WRONLY).unwrap();
    fs.write(&task, fd, &[0xd7; 7 * 512]).unwrap();
    fs.close(&mut task, fd).unwrap();
    // 根目录的 12 个直接块恰好写满 250 项
    for i in 0..249 {
        let fd = fs
            .open(&mut task, &format!("/f{i}"), OpenFlag::CREATE | OpenFlag::RDWR)
            .unwrap();
        fs.close(&mut task, fd).unwrap();
    }
    let root = fs.stat(&task, "/").unwrap();
    assert_eq!((root.size, root.blocks), (252 * 24, 12));
    let blocks = fs.partition().block_bitmap();
    assert_eq!(blocks.capacity() - blocks.count_ones(), 1);

    // 间接块分配到了，目录的新数据块却分配不到
    let before = bitmaps(&fs);
    assert_eq!(
        fs.open(&mut task, "/g", OpenFlag::CREATE | OpenFlag::RDWR),
        Err(Error::NoSpace)
    );
    assert_eq!(bitmaps(&fs), before);
    // 新目录拿走最后一块，父目录却无处安放它的目录项
    assert_eq!(fs.mkdir(&task, "/d"), Err(Error::NoSpace));
    assert_eq!(bitmaps(&fs), before);

    assert_eq!(fs.stat(&task, "/g"), Err(Error::NotFound));
    assert_eq!(fs.stat(&task, "/d"), Err(Error::NotFound));
    assert_eq!(fs.stat(&task, "/").unwrap().size, 252 * 24);
    assert_eq!(task.open_fds().count(), 0);
    drop(fs);

    let mut fs = FileSystem::mount(device, 0).unwrap();
    assert_eq!(bitmaps(&fs), before);

    // 剩下的一块照常可用
    let fd = fs.open(&mut task, "/data", OpenFlag::WRONLY.into()).unwrap();
    assert_eq!(fs.write(&task, fd, &[0xd7; 512]).unwrap(), 512);
    fs.close(&mut task, fd).unwrap();
}

#[test]
fn overlong_arguments_are_rejected_before_folding() {
    let (_, mut fs) = new_fs();
    let mut task = Task::new(1);
    let before = bitmaps(&fs);

    // 折叠后只剩 /d，但参数本身超过了上限
    let long = format!("/{}d", "x/../".repeat(110));
    assert!(long.len() >= 512);
    assert_eq!(long.as_str().canonicalize("/"), "/d");

    assert_eq!(fs.mkdir(&task, &long), Err(Error::PathTooLong));
    assert_eq!(
        fs.open(&mut task, &long, OpenFlag::CREATE | OpenFlag::RDWR),
        Err(Error::PathTooLong)
    );
    assert_eq!(fs.stat(&task, &long), Err(Error::PathTooLong));
    assert_eq!(fs.chdir(&mut task, &long), Err(Error::PathTooLong));
    assert_eq!(bitmaps(&fs), before);

    // 相对路径同样按参数长度计
    let relative = format!("{}.", "./".repeat(256));
    assert_eq!(fs.opendir(&task, &relative).unwrap_err(), Error::PathTooLong);
    assert!(fs.opendir(&task, &relative[500..]).is_ok());
}
