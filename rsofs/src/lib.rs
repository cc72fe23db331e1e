//! A small UNIX-style inode filesystem engine over a block-device image:
//! superblock, inode table, free-cluster reference table and data zone,
//! with a three-tier indirect addressing scheme and a directory layer on
//! top.

mod blockreader;
mod data;
mod decoder;
mod error;
mod inode;
mod sofs;

pub use crate::{
	blockreader::{Backend, BlockReader},
	data::{
		cluster_of_byte, DirEntry, FcNode, Inode, InodeAux, InodeType, Superblock, BLOCK_SIZE,
		BLOCKS_PER_CLUSTER, BSLPC, CLUSTER_SIZE, DPC, DZONE_CACHE_SIZE, INODE_SIZE, IPB, MAGIC,
		MAX_FILE_CLUSTERS, MAX_FILE_SIZE, MAX_NAME, MAX_PATH, MSTAT_CLEAN, MSTAT_DIRTY, N_DIRECT,
		NULL_CLUSTER, NULL_INODE, PERM_MASK, R, ROOT_INODE, RPB, RPC, VERSION, W, X,
	},
	error::{Error, Result},
	sofs::{
		format, format_path, AttachMode, ClusterAddr, ClusterStatus, DetachMode, DirSearch,
		FormatOpts, Info, Sofs,
	},
};
