use bincode::{Decode, Encode};

/// rsofs magic number.
pub const MAGIC: u32 = 0x65FE;

/// Magic value carried while formatting is still in progress, so that a
/// partly formatted volume can never be mounted.
pub const MAGIC_INCOMPLETE: u32 = 0xFFFF;

/// rsofs version number.
pub const VERSION: u32 = 0x2015;

/// Smallest unit of device I/O.
pub const BLOCK_SIZE: usize = 512;

/// Blocks per data cluster.
pub const BLOCKS_PER_CLUSTER: usize = 4;

/// Allocation unit for file data.
pub const CLUSTER_SIZE: usize = BLOCK_SIZE * BLOCKS_PER_CLUSTER;

/// Bytes of stream data per cluster.
pub const BSLPC: usize = CLUSTER_SIZE;

/// Size of an on-disk inode.
pub const INODE_SIZE: usize = 64;

/// Inodes per block.
pub const IPB: usize = BLOCK_SIZE / INODE_SIZE;

/// 32-bit cluster references per block.
pub const RPB: usize = BLOCK_SIZE / 4;

/// Cluster references per cluster.
pub const RPC: usize = CLUSTER_SIZE / 4;

/// Size of an on-disk directory entry.
pub const DIRENT_SIZE: usize = 64;

/// Directory entries per cluster.
pub const DPC: usize = CLUSTER_SIZE / DIRENT_SIZE;

/// Direct cluster references in an inode.
pub const N_DIRECT: usize = 7;

/// Maximum length of an entry name, excluding the NUL terminator.
pub const MAX_NAME: usize = 59;

/// Maximum length of a path.
pub const MAX_PATH: usize = 255;

/// Maximum length of a volume name, excluding the NUL terminator.
pub const PARTITION_NAME_SIZE: usize = 23;

/// Capacity of each free-cluster reference cache in the superblock.
pub const DZONE_CACHE_SIZE: usize = 50;

/// Highest file-relative cluster index + 1.
pub const MAX_FILE_CLUSTERS: u32 = (N_DIRECT + RPC + RPC * RPC) as u32;

/// Maximum file size in bytes.
pub const MAX_FILE_SIZE: u32 = MAX_FILE_CLUSTERS * CLUSTER_SIZE as u32;

/// Inode number of the root directory.
pub const ROOT_INODE: u32 = 0;

/// Reference to no inode; also marks a free directory entry.
pub const NULL_INODE: u32 = u32::MAX;

/// Reference to no data cluster.
pub const NULL_CLUSTER: u32 = u32::MAX;

/// Filler stored in free-cluster-table slots past the data-zone length.
pub const FCT_UNUSED: u32 = 0xFFFF_FFFE;

/// Volume was cleanly unmounted.
pub const MSTAT_CLEAN: u32 = 0;

/// Volume was not cleanly unmounted.
pub const MSTAT_DIRTY: u32 = 1;

/// Mode bit: inode describes a regular file.
pub const INODE_FILE: u16 = 0x0200;
/// Mode bit: inode describes a directory.
pub const INODE_DIR: u16 = 0x0400;
/// Mode bit: inode describes a symbolic link.
pub const INODE_SYMLINK: u16 = 0x0800;
/// Mode bit: inode is free.
pub const INODE_FREE: u16 = 0x1000;
/// Mask of the file-type bits.
pub const INODE_TYPE_MASK: u16 = INODE_FILE | INODE_DIR | INODE_SYMLINK;
/// Mask of the rwx permission bits.
pub const PERM_MASK: u16 = 0o777;

/// Access request bit: read.
pub const R: u16 = 0o4;
/// Access request bit: write.
pub const W: u16 = 0o2;
/// Access request bit: execute / search.
pub const X: u16 = 0o1;

/// The legal inode file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
	RegularFile,
	Directory,
	Symlink,
}

impl InodeType {
	pub fn mode_bit(self) -> u16 {
		match self {
			Self::RegularFile => INODE_FILE,
			Self::Directory => INODE_DIR,
			Self::Symlink => INODE_SYMLINK,
		}
	}
}

/// Reference cache resident in the superblock.
///
/// The retrieval cache is indexed by the next element to return and is empty
/// at `cache_idx == DZONE_CACHE_SIZE`; the insertion cache is indexed by the
/// next free slot and is empty at `cache_idx == 0`.
#[derive(Debug, Clone, Encode, Decode)]
pub struct FcNode {
	pub cache_idx: u32,
	pub cache:     [u32; DZONE_CACHE_SIZE],
}

impl FcNode {
	pub fn empty_retrieval() -> Self {
		Self {
			cache_idx: DZONE_CACHE_SIZE as u32,
			cache:     [NULL_CLUSTER; DZONE_CACHE_SIZE],
		}
	}

	pub fn empty_insertion() -> Self {
		Self {
			cache_idx: 0,
			cache:     [NULL_CLUSTER; DZONE_CACHE_SIZE],
		}
	}
}

/// The superblock, stored in physical block 0.
#[derive(Debug, Clone, Encode, Decode)]
pub struct Superblock {
	/* header */
	pub magic:   u32,
	pub version: u32,
	pub name:    [u8; PARTITION_NAME_SIZE + 1],
	/// Total number of blocks on the device.
	pub ntotal:  u32,
	pub mstat:   u32,

	/* inode table metadata */
	pub itable_start: u32,
	pub itable_size:  u32,
	pub itotal:       u32,
	pub ifree:        u32,
	/// Head / tail of the double-linked circular list of free inodes.
	pub ihdtl:        u32,

	/* data zone metadata */
	pub dzone_retriev:     FcNode,
	pub dzone_insert:      FcNode,
	pub tbfreeclust_start: u32,
	pub tbfreeclust_size:  u32,
	/// Retrieval point of the free-cluster reference FIFO.
	pub tbfreeclust_head:  u32,
	/// Insertion point of the free-cluster reference FIFO.
	pub tbfreeclust_tail:  u32,
	pub dzone_start:       u32,
	pub dzone_total:       u32,
	pub dzone_free:        u32,

	pub reserved: [u8; 16],
}

impl Superblock {
	pub fn volume_name(&self) -> &str {
		let len = self
			.name
			.iter()
			.position(|b| *b == 0)
			.unwrap_or(self.name.len());
		std::str::from_utf8(&self.name[0..len]).unwrap_or("")
	}

	/// Byte offset of an inode slot in the inode table.
	pub fn inode_addr(&self, inr: u32) -> u64 {
		self.itable_start as u64 * BLOCK_SIZE as u64 + inr as u64 * INODE_SIZE as u64
	}

	/// Byte offset of a free-cluster-table slot.
	pub fn fct_addr(&self, slot: u32) -> u64 {
		self.tbfreeclust_start as u64 * BLOCK_SIZE as u64 + slot as u64 * 4
	}

	/// Byte offset of a data cluster, by logical cluster number.
	pub fn cluster_addr(&self, nclust: u32) -> u64 {
		(self.dzone_start as u64 + nclust as u64 * BLOCKS_PER_CLUSTER as u64) * BLOCK_SIZE as u64
	}
}

/// Split a byte position within a file into (cluster index, byte offset).
pub fn cluster_of_byte(pos: u32) -> (u32, u32) {
	(pos / CLUSTER_SIZE as u32, pos % CLUSTER_SIZE as u32)
}

/// The overlaid `vD1`/`vD2` pair of an inode.
///
/// On disk the two words carry the free-list links of a free inode and the
/// timestamps of one in use; the discriminant is the FREE bit of `mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeAux {
	Free { prev: u32, next: u32 },
	Used { atime: u32, mtime: u32 },
}

/// An inode record. `IPB` of these fit in one block.
#[derive(Debug, Clone)]
pub struct Inode {
	pub mode:     u16,
	pub refcount: u16,
	pub owner:    u32,
	pub group:    u32,
	/// File size in bytes.
	pub size:     u32,
	/// Data clusters in use by this file, indirection clusters included.
	pub clucount: u32,
	pub aux:      InodeAux,
	pub direct:   [u32; N_DIRECT],
	pub i1:       u32,
	pub i2:       u32,
}

/// A directory entry. The entry is in use iff the first name byte is not NUL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct DirEntry {
	pub name: [u8; MAX_NAME + 1],
	pub inr:  u32,
}

impl DirEntry {
	pub fn free() -> Self {
		Self {
			name: [0u8; MAX_NAME + 1],
			inr:  NULL_INODE,
		}
	}

	/// The name must have been validated to fit `MAX_NAME` bytes.
	pub fn new(name: &str, inr: u32) -> Self {
		let mut e = Self {
			name: [0u8; MAX_NAME + 1],
			inr,
		};
		e.set_name(name);
		e
	}

	pub fn is_used(&self) -> bool {
		self.name[0] != 0
	}

	pub fn name_bytes(&self) -> &[u8] {
		let len = self
			.name
			.iter()
			.position(|b| *b == 0)
			.unwrap_or(self.name.len());
		&self.name[0..len]
	}

	pub fn name_is(&self, name: &str) -> bool {
		self.name_bytes() == name.as_bytes()
	}

	pub fn set_name(&mut self, name: &str) {
		let b = name.as_bytes();
		self.name = [0u8; MAX_NAME + 1];
		self.name[0..b.len()].copy_from_slice(b);
	}
}
