use super::*;

/// Options accepted by the formatter.
#[derive(Debug, Clone)]
pub struct FormatOpts {
	/// Volume name, truncated to fit the superblock field.
	pub name: String,

	/// Requested number of inodes; the layout solver rounds it to whole
	/// inode-table blocks. Defaults to one inode per eight blocks.
	pub itotal: Option<u32>,

	/// Zero-fill every free data cluster.
	pub zero: bool,
}

impl Default for FormatOpts {
	fn default() -> Self {
		Self {
			name:   "rsofs".into(),
			itotal: None,
			zero:   false,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
	ntotal: u32,
	itotal: u32,
	iblk:   u32,
	fcblk:  u32,
	nclust: u32,
}

/// Solve
///
/// ```text
/// ntotal = 1 + iblk + fcblk + nclust * BLOCKS_PER_CLUSTER
/// ```
///
/// for whole-block table sizes. `fcblk` depends on `nclust`, so the solution
/// is refined over three passes and a final adjustment grows the inode table
/// to absorb any slack.
fn solve_layout(ntotal: u32, itotal_req: Option<u32>) -> Result<Layout> {
	let bpc = BLOCKS_PER_CLUSTER as u32;
	let rpb = RPB as u32;
	let ipb = IPB as u32;

	let itotal = match itotal_req {
		None | Some(0) => ntotal >> 3,
		Some(n) => n,
	};
	let mut iblk = itotal.div_ceil(ipb).max(1);

	let too_small = || {
		log::error!("device too small: {ntotal} blocks");
		Error::BadArgument
	};

	let tmp = ntotal
		.checked_sub(1 + iblk)
		.ok_or_else(too_small)? /
		bpc;
	let mut fcblk = tmp.div_ceil(rpb).max(1);

	let mut nclust = ntotal
		.checked_sub(1 + iblk + fcblk)
		.ok_or_else(too_small)? /
		bpc;
	fcblk = nclust.div_ceil(rpb).max(1);

	if nclust % rpb != 0 && ntotal - 1 - iblk - fcblk - nclust * bpc >= bpc {
		nclust += 1;
	}

	iblk = ntotal
		.checked_sub(1 + fcblk + nclust * bpc)
		.ok_or_else(too_small)?;
	let itotal = iblk * ipb;

	if iblk < 1 || itotal < 2 || nclust < 2 {
		return Err(too_small());
	}
	debug_assert_eq!(1 + iblk + fcblk + nclust * bpc, ntotal);

	Ok(Layout {
		ntotal,
		itotal,
		iblk,
		fcblk,
		nclust,
	})
}

fn superblock_for(l: &Layout, name: &str) -> Superblock {
	let mut sbname = [0u8; PARTITION_NAME_SIZE + 1];
	let n = name.len().min(PARTITION_NAME_SIZE);
	sbname[0..n].copy_from_slice(&name.as_bytes()[0..n]);

	Superblock {
		magic: MAGIC_INCOMPLETE,
		version: VERSION,
		name: sbname,
		ntotal: l.ntotal,
		mstat: MSTAT_CLEAN,

		itable_start: 1,
		itable_size: l.iblk,
		itotal: l.itotal,
		ifree: l.itotal - 1,
		ihdtl: 1,

		dzone_retriev: FcNode::empty_retrieval(),
		dzone_insert: FcNode::empty_insertion(),
		tbfreeclust_start: 1 + l.iblk,
		tbfreeclust_size: l.fcblk,
		tbfreeclust_head: 1,
		tbfreeclust_tail: 0,
		dzone_start: 1 + l.iblk + l.fcblk,
		dzone_total: l.nclust,
		dzone_free: l.nclust - 1,

		reserved: [0u8; 16],
	}
}

/// Install an empty filesystem on the device.
///
/// The superblock is written with a sentinel magic number first and only
/// rewritten with the real one once every structure is in place and checked,
/// so an interrupted format leaves an unmountable volume behind.
pub fn format<R: Backend>(mut dev: BlockReader<R>, opts: &FormatOpts) -> Result<()> {
	if !dev.write_enabled() {
		return Err(Error::NotPermitted);
	}
	let nbytes = dev.nbytes()?;
	if nbytes % BLOCK_SIZE as u64 != 0 {
		log::error!("device size {nbytes} is not a multiple of the block size");
		return Err(Error::BadArgument);
	}
	let ntotal = u32::try_from(nbytes / BLOCK_SIZE as u64).map_err(|_| Error::BadArgument)?;

	let layout = solve_layout(ntotal, opts.itotal)?;
	log::info!(
		"formatting: {} blocks, {} inodes, {} data clusters",
		layout.ntotal,
		layout.itotal,
		layout.nclust
	);

	let sb = superblock_for(&layout, &opts.name);
	let mut file = Decoder::new(dev);
	file.encode_at(0, &sb)?;

	fill_itable(&mut file, &sb)?;
	fill_root_dir(&mut file, &sb)?;
	fill_fct(&mut file, &sb)?;
	if opts.zero {
		zero_data_zone(&mut file, &sb)?;
	}

	let mut fs = Sofs::assemble(file, sb);
	fs.check()?;

	fs.update_sb(|sb| sb.magic = MAGIC)?;
	fs.flush()
}

/// Convenience wrapper opening the device read-write.
pub fn format_path(path: &Path, opts: &FormatOpts) -> Result<()> {
	let dev = BlockReader::open(path, true)?;
	format(dev, opts)
}

/// Inode 0 is the root directory; every other inode joins the circular
/// free list, whose first element links back to the last.
fn fill_itable<R: Backend>(file: &mut Decoder<BlockReader<R>>, sb: &Superblock) -> Result<()> {
	let now = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs() as u32)
		.unwrap_or(0);
	let (uid, gid) = process_ids();

	file.seek(sb.inode_addr(0))?;
	for n in 0..sb.itotal {
		let ino = if n == ROOT_INODE {
			let mut root = Inode::new_used(InodeType::Directory, uid, gid, now);
			root.mode |= PERM_MASK;
			root.refcount = 2;
			root.size = CLUSTER_SIZE as u32;
			root.clucount = 1;
			root.direct[0] = 0;
			root
		} else {
			let prev = if n == 1 { sb.itotal - 1 } else { n - 1 };
			let next = if n == sb.itotal - 1 { 1 } else { n + 1 };
			Inode::new_free(prev, next)
		};
		file.encode(&ino)?;
	}
	Ok(())
}

fn fill_root_dir<R: Backend>(file: &mut Decoder<BlockReader<R>>, sb: &Superblock) -> Result<()> {
	file.seek(sb.cluster_addr(0))?;
	for i in 0..DPC {
		let e = match i {
			0 => DirEntry::new(".", ROOT_INODE),
			1 => DirEntry::new("..", ROOT_INODE),
			_ => DirEntry::free(),
		};
		file.encode(&e)?;
	}
	Ok(())
}

/// Lay the free-cluster references out as a circular FIFO: slot 0 carries no
/// reference (cluster 0 belongs to the root directory), slots
/// `1..=dzone_free` name their own cluster, and table padding past the
/// data-zone length gets a distinct filler.
fn fill_fct<R: Backend>(file: &mut Decoder<BlockReader<R>>, sb: &Superblock) -> Result<()> {
	file.seek(sb.fct_addr(0))?;
	let nslots = sb.tbfreeclust_size as usize * RPB;
	for slot in 0..nslots as u32 {
		let r = if slot == 0 {
			NULL_CLUSTER
		} else if slot <= sb.dzone_free {
			slot
		} else {
			FCT_UNUSED
		};
		file.encode(&r)?;
	}
	Ok(())
}

fn zero_data_zone<R: Backend>(file: &mut Decoder<BlockReader<R>>, sb: &Superblock) -> Result<()> {
	for cl in 1..sb.dzone_total {
		file.fill_at(sb.cluster_addr(cl), 0u8, CLUSTER_SIZE)?;
	}
	Ok(())
}
