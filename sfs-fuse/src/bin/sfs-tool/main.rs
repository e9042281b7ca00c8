mod cli;

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use sfs::{BLOCK_COUNT, BLOCK_SIZE, NAME_MAX_LEN, SimpleFileSystem};
use sfs_fuse::BlockFile;
use typed_bytesize::ByteSizeIec;

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    log::info!("image={:?}", cli.image);

    match cli.command {
        Command::Format => {
            create_volume(&cli.image)?;
        }
        Command::Pack { source } => pack(&cli.image, &source)?,
        Command::Ls => {
            let mut volume = open_volume(&cli.image)?;
            while let Some(name) = volume.next_filename() {
                let size = volume.file_size(&name).map_err(io::Error::other)?;
                println!("{size:>8}  {name}");
            }
        }
        Command::Cat { name } => cat(&cli.image, &name)?,
        Command::Put { file, name } => {
            let name = match name {
                Some(name) => name,
                None => host_file_name(&file)?,
            };
            let data = fs::read(&file)?;

            let mut volume = open_volume(&cli.image)?;
            store(&mut volume, &name, &data)?;
        }
        Command::Rm { name } => {
            let mut volume = open_volume(&cli.image)?;
            volume.remove(&name).map_err(io::Error::other)?;
        }
        Command::Df => {
            let volume = open_volume(&cli.image)?;
            let free = volume.free_blocks();
            let used = BLOCK_COUNT - free;
            println!(
                "blocks: {used} used, {free} free, {BLOCK_COUNT} total\nbytes:  {} used, {} free",
                ByteSizeIec((used * BLOCK_SIZE) as u64),
                ByteSizeIec((free * BLOCK_SIZE) as u64),
            );
        }
    }

    Ok(())
}

fn create_volume(image: &Path) -> io::Result<SimpleFileSystem> {
    let block_file = BlockFile::create(image, BLOCK_SIZE, BLOCK_COUNT)?;
    SimpleFileSystem::format(Arc::new(block_file)).map_err(io::Error::other)
}

fn open_volume(image: &Path) -> io::Result<SimpleFileSystem> {
    let block_file = BlockFile::open(image, BLOCK_SIZE, BLOCK_COUNT)?;
    SimpleFileSystem::mount(Arc::new(block_file)).map_err(io::Error::other)
}

fn pack(image: &Path, source: &Path) -> io::Result<()> {
    let mut volume = create_volume(image)?;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = host_file_name(&entry.path())?;
        if name.len() > NAME_MAX_LEN {
            log::warn!("skipping {name:?}: name longer than {NAME_MAX_LEN} bytes");
            continue;
        }

        let data = fs::read(entry.path())?;
        store(&mut volume, &name, &data)?;
    }

    Ok(())
}

/// 把数据追加到卷上的文件末尾
fn store(volume: &mut SimpleFileSystem, name: &str, data: &[u8]) -> io::Result<()> {
    let fd = volume.open(name).map_err(io::Error::other)?;
    let written = volume.write(fd, data).map_err(io::Error::other)?;
    volume.close(fd).map_err(io::Error::other)?;

    if written < data.len() {
        log::warn!("{name:?} truncated to {written} of {} bytes", data.len());
    }
    log::info!("file={name:?}, {written} bytes");
    Ok(())
}

fn cat(image: &Path, name: &str) -> io::Result<()> {
    let mut volume = open_volume(image)?;
    // open 会创建不存在的文件
    volume.file_size(name).map_err(io::Error::other)?;

    let fd = volume.open(name).map_err(io::Error::other)?;
    volume.seek(fd, 0).map_err(io::Error::other)?;

    let mut stdout = io::stdout().lock();
    let mut buf = [0; BLOCK_SIZE];
    loop {
        let len = volume.read(fd, &mut buf).map_err(io::Error::other)?;
        if len == 0 {
            break;
        }
        stdout.write_all(&buf[..len])?;
    }
    stdout.flush()?;

    volume.close(fd).map_err(io::Error::other)
}

fn host_file_name(path: &Path) -> io::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| io::Error::other(format!("{path:?} has no UTF-8 file name")))
}
