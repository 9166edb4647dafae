use clap::Parser;
use std::path::PathBuf;

/// Pack host files into the root directory of an sfs disk image
#[derive(Parser)]
pub struct Cli {
    /// Directory whose regular files are copied into the image
    #[arg(long, short)]
    pub source: Option<PathBuf>,

    /// Image file to create
    #[arg(long, short = 'o', default_value = "fs.img")]
    pub image: PathBuf,

    /// Partition size in sectors
    #[arg(long, default_value_t = 65536)]
    pub sectors: u32,

    /// Keep the filesystem already in the image instead of formatting it
    #[arg(long)]
    pub keep: bool,

    /// List the root directory when done
    #[arg(long, short)]
    pub list: bool,
}
