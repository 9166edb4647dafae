mod cli;

use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use block_dev::BlockDevice;
use clap::Parser;
use cli::Cli;
use sfs::{FileSystem, OpenFlag, Task, MAX_FILE_SIZE};
use sfs_fuse::BlockFile;

fn to_io(e: vfs::Error) -> io::Error {
    io::Error::other(e.to_string())
}

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("image={:?}\nsectors={}", cli.image, cli.sectors);

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(!cli.keep)
        .open(&cli.image)?;
    let device: Arc<dyn BlockDevice> = Arc::new(BlockFile::create(file, cli.sectors)?);
    if !cli.keep {
        FileSystem::format(&device, 0, cli.sectors).map_err(to_io)?;
    }
    let mut efs = FileSystem::init(device, 0, cli.sectors).map_err(to_io)?;
    let mut task = Task::new(0);

    if let Some(source) = &cli.source {
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                log::warn!("skip {:?}: file name is not UTF-8", entry.path());
                continue;
            };

            let data = fs::read(entry.path())?;
            if data.len() > MAX_FILE_SIZE {
                log::warn!("skip {name}: {} bytes exceeds {MAX_FILE_SIZE}", data.len());
                continue;
            }

            let fd = match efs.open(
                &mut task,
                &format!("/{name}"),
                OpenFlag::CREATE | OpenFlag::WRONLY,
            ) {
                Ok(fd) => fd,
                Err(vfs::Error::NameTooLong) => {
                    log::warn!("skip {name}: file name too long");
                    continue;
                }
                Err(e) => return Err(to_io(e)),
            };
            println!("file: {name:?} ({} bytes)", data.len());
            efs.write(&task, fd, &data).map_err(to_io)?;
            efs.close(&mut task, fd).map_err(to_io)?;
        }
    }

    if cli.list {
        let mut dir = efs.opendir(&task, "/").map_err(to_io)?;
        while let Some(entry) = efs.readdir(&mut dir) {
            let stat = efs.stat(&task, &format!("/{}", entry.name)).map_err(to_io)?;
            println!(
                "{:>5} {:>9} {:<9?} {}",
                entry.inode, stat.size, entry.ty, entry.name
            );
        }
        efs.closedir(dir);
    }

    Ok(())
}
