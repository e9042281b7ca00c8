use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use block_dev::{BlockDevice, Error};
use sfs::{BLOCK_COUNT, BLOCK_SIZE, SimpleFileSystem};

use crate::BlockFile;

fn image(name: &str) -> PathBuf {
    env::temp_dir().join(format!("sfs-fuse-{}-{name}.img", std::process::id()))
}

#[test]
fn block_io() {
    let path = image("block-io");
    let file = BlockFile::create(&path, 64, 8).unwrap();
    assert_eq!(512, fs::metadata(&path).unwrap().len());

    let data: Vec<u8> = (0..128).collect();
    file.write_blocks(3, &data).unwrap();
    let mut buf = [0; 128];
    file.read_blocks(3, &mut buf).unwrap();
    assert_eq!(data[..], buf[..]);

    assert_eq!(Err(Error::OutOfRange), file.read_blocks(7, &mut buf));
    assert_eq!(Err(Error::Misaligned), file.write_blocks(0, &data[..10]));

    drop(file);
    fs::remove_file(path).unwrap();
}

#[test]
fn short_image_is_rejected() {
    let path = image("short");
    drop(BlockFile::create(&path, 64, 4).unwrap());
    assert!(BlockFile::open(&path, 64, 8).is_err());
    assert!(BlockFile::open(&path, 64, 4).is_ok());
    fs::remove_file(path).unwrap();
}

#[test]
fn volume_on_image() {
    let path = image("volume");
    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();

    {
        let file = BlockFile::create(&path, BLOCK_SIZE, BLOCK_COUNT).unwrap();
        let mut volume = SimpleFileSystem::format(Arc::new(file)).unwrap();
        let fd = volume.open("data.bin").unwrap();
        assert_eq!(data.len(), volume.write(fd, &data).unwrap());
    }

    let file = BlockFile::open(&path, BLOCK_SIZE, BLOCK_COUNT).unwrap();
    let mut volume = SimpleFileSystem::mount(Arc::new(file)).unwrap();
    assert!(volume.super_block().is_valid());
    assert_eq!(data.len(), volume.file_size("data.bin").unwrap());

    let fd = volume.open("data.bin").unwrap();
    volume.seek(fd, 0).unwrap();
    let mut buf = vec![0; data.len()];
    assert_eq!(data.len(), volume.read(fd, &mut buf).unwrap());
    assert_eq!(data, buf);

    drop(volume);
    fs::remove_file(path).unwrap();
}
