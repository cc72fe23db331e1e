use std::{
	fs::File,
	path::Path,
	time::{SystemTime, UNIX_EPOCH},
};

mod cluster;
mod consist;
mod dir;
mod dzone;
mod format;
mod ialloc;
mod inode;
mod ops;
mod symlink;

pub use cluster::ClusterAddr;
pub use consist::ClusterStatus;
pub use dir::{AttachMode, DetachMode, DirSearch};
pub use format::{format, format_path, FormatOpts};

use crate::{
	blockreader::{Backend, BlockReader},
	data::*,
	decoder::Decoder,
	error::{Error, Result},
};

/// Summary of filesystem statistics.
#[derive(Debug, Clone)]
#[doc(alias = "Statfs")]
pub struct Info {
	/// Number of blocks.
	pub blocks: u64,

	/// Number of free data clusters.
	pub cfree: u64,

	/// Number of data clusters.
	pub clusters: u64,

	/// Number of inodes.
	pub files: u64,

	/// Number of free inodes.
	pub ffree: u64,

	/// Block size.
	pub bsize: u32,

	/// Cluster size.
	pub csize: u32,
}

/// A mounted volume.
///
/// Owns the device channel, the in-memory superblock image and the caller
/// credentials; every operation of the engine is a method on this type, so
/// the single-writer discipline of the on-disk structures is enforced by
/// exclusive borrows instead of a load/store bracket protocol.
#[derive(Debug)]
pub struct Sofs<R: Backend> {
	file:       Decoder<BlockReader<R>>,
	superblock: Superblock,
	uid:        u32,
	gid:        u32,
}

impl Sofs<File> {
	pub fn open(path: &Path, rw: bool) -> Result<Self> {
		let file = BlockReader::open(path, rw)?;
		Self::new(file)
	}
}

impl<R: Backend> Sofs<R> {
	pub fn new(file: BlockReader<R>) -> Result<Self> {
		let mut file = Decoder::new(file);

		let superblock: Superblock = file.decode_at(0)?;
		if superblock.magic != MAGIC {
			log::error!("invalid superblock magic number: {:#x}", superblock.magic);
			return Err(Error::SuperBlockHeaderInvalid);
		}
		if superblock.version != VERSION {
			log::error!("unsupported version: {:#x}", superblock.version);
			return Err(Error::SuperBlockHeaderInvalid);
		}

		let (uid, gid) = process_ids();
		let mut s = Self {
			file,
			superblock,
			uid,
			gid,
		};
		s.check()?;
		if s.write_enabled() {
			// Readers of a crashed volume will see the flag still set.
			s.superblock.mstat = MSTAT_DIRTY;
			s.store_sb()?;
		}
		Ok(s)
	}

	/// Internal constructor for the formatter; performs no validation.
	pub(crate) fn assemble(file: Decoder<BlockReader<R>>, superblock: Superblock) -> Self {
		let (uid, gid) = process_ids();
		Self {
			file,
			superblock,
			uid,
			gid,
		}
	}

	pub fn write_enabled(&self) -> bool {
		self.file.inner().write_enabled()
	}

	pub(crate) fn assert_rw(&self) -> Result<()> {
		if self.write_enabled() {
			Ok(())
		} else {
			Err(Error::NotPermitted)
		}
	}

	pub fn superblock(&self) -> &Superblock {
		&self.superblock
	}

	/// Credentials used by permission checks.
	pub fn credentials(&self) -> (u32, u32) {
		(self.uid, self.gid)
	}

	/// Override the credentials captured at open time. A shim serving
	/// multiple callers sets these per request.
	pub fn set_credentials(&mut self, uid: u32, gid: u32) {
		self.uid = uid;
		self.gid = gid;
	}

	/// Get filesystem metadata.
	#[doc(alias("statfs", "statvfs"))]
	pub fn info(&self) -> Info {
		let sb = &self.superblock;
		Info {
			blocks:   sb.ntotal as u64,
			cfree:    sb.dzone_free as u64,
			clusters: sb.dzone_total as u64,
			files:    sb.itotal as u64,
			ffree:    sb.ifree as u64,
			bsize:    BLOCK_SIZE as u32,
			csize:    CLUSTER_SIZE as u32,
		}
	}

	pub(crate) fn check(&mut self) -> Result<()> {
		let sb = &self.superblock;
		log::debug!("Superblock: {sb:#?}");

		log::info!("Summary:");
		log::info!("Volume Name: {:?}", sb.volume_name());
		log::info!("# Blocks: {}", sb.ntotal);
		log::info!("# Inodes: {} ({} free)", sb.itotal, sb.ifree);
		log::info!("# Data Clusters: {} ({} free)", sb.dzone_total, sb.dzone_free);

		self.check_superblock()?;
		self.check_itable()?;
		self.check_dzone()?;

		let root = self.get_inode_raw(ROOT_INODE)?;
		consist::check_inode_in_use(&root)?;
		if !root.is_dir() {
			log::error!("root inode is not a directory");
			return Err(Error::InodeInUseInvalid);
		}
		self.check_inode_refs(&root)?;
		self.check_dir_contents(ROOT_INODE, &root)?;

		log::info!("OK");
		Ok(())
	}

	/// Flip the clean-unmount flag back and flush the device.
	pub fn unmount(mut self) -> Result<()> {
		if self.write_enabled() {
			self.superblock.mstat = MSTAT_CLEAN;
			self.store_sb()?;
		}
		self.flush()
	}

	pub(crate) fn flush(&mut self) -> Result<()> {
		use std::io::Write;
		self.file.inner_mut().flush()?;
		Ok(())
	}

	/// Write the in-memory superblock image out.
	pub(crate) fn store_sb(&mut self) -> Result<()> {
		self.file.encode_at(0, &self.superblock)?;
		Ok(())
	}

	pub(crate) fn update_sb(&mut self, f: impl FnOnce(&mut Superblock)) -> Result<()> {
		f(&mut self.superblock);
		self.store_sb()
	}

	pub(crate) fn sb(&self) -> &Superblock {
		&self.superblock
	}

	pub(crate) fn sb_mut(&mut self) -> &mut Superblock {
		&mut self.superblock
	}

	pub(crate) fn file(&mut self) -> &mut Decoder<BlockReader<R>> {
		&mut self.file
	}

	/// Current time as a 32-bit Unix timestamp.
	pub(crate) fn now(&self) -> u32 {
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.map(|d| d.as_secs() as u32)
			.unwrap_or(0)
	}
}

fn process_ids() -> (u32, u32) {
	// SAFETY: getuid/getgid cannot fail.
	unsafe { (libc::getuid() as u32, libc::getgid() as u32) }
}
