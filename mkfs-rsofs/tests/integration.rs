use std::process::Command;

use assert_cmd::prelude::*;
use rsofs::{Sofs, BLOCK_SIZE};

fn mkfs() -> Command {
	Command::cargo_bin("mkfs.rsofs").unwrap()
}

fn device(nblocks: u64) -> tempfile::NamedTempFile {
	let f = tempfile::NamedTempFile::new().unwrap();
	f.as_file().set_len(nblocks * BLOCK_SIZE as u64).unwrap();
	f
}

#[test]
fn formats_a_volume() {
	let dev = device(1024);
	mkfs()
		.arg("-n")
		.arg("testvol")
		.arg(dev.path())
		.assert()
		.success();

	let fs = Sofs::open(dev.path(), false).unwrap();
	assert_eq!(fs.superblock().volume_name(), "testvol");
	assert_eq!(fs.superblock().ntotal, 1024);
}

#[test]
fn formatted_volume_accepts_files() {
	let dev = device(512);
	mkfs().arg("-q").arg(dev.path()).assert().success().stdout("");

	let mut fs = Sofs::open(dev.path(), true).unwrap();
	fs.mkdir("/tmp", 0o755).unwrap();
	fs.mknod("/tmp/hello", 0o644).unwrap();
	fs.write("/tmp/hello", b"hi there", 0).unwrap();
	fs.unmount().unwrap();
}

#[test]
fn requested_inode_count() {
	let dev = device(1024);
	mkfs()
		.arg("-i")
		.arg("64")
		.arg("-q")
		.arg(dev.path())
		.assert()
		.success();

	let fs = Sofs::open(dev.path(), false).unwrap();
	assert!(fs.superblock().itotal >= 64);
}

#[test]
fn zero_fill_flag() {
	let dev = device(256);
	std::fs::write(dev.path(), vec![0x5Au8; 256 * BLOCK_SIZE]).unwrap();
	mkfs().arg("-z").arg("-q").arg(dev.path()).assert().success();
	Sofs::open(dev.path(), false).unwrap();
}

#[test]
fn help_exits_zero() {
	mkfs().arg("-h").assert().success();
}

#[test]
fn missing_device_fails() {
	mkfs().assert().failure();
}

#[test]
fn odd_sized_device_rejected() {
	let f = tempfile::NamedTempFile::new().unwrap();
	f.as_file().set_len(1000).unwrap(); // not a multiple of 512
	mkfs().arg("-q").arg(f.path()).assert().failure();
}

#[test]
fn tiny_device_rejected() {
	let dev = device(4);
	mkfs().arg("-q").arg(dev.path()).assert().failure();
}
