//! End-to-end scenarios against freshly formatted 1024-block volumes.

use rsofs::{
	format, AttachMode, BlockReader, Error, FormatOpts, InodeType, Sofs, BLOCK_SIZE, BSLPC,
	CLUSTER_SIZE, MAX_FILE_SIZE, ROOT_INODE,
};

fn fresh_volume(nblocks: u64) -> (tempfile::NamedTempFile, Sofs<std::fs::File>) {
	let f = tempfile::NamedTempFile::new().unwrap();
	f.as_file().set_len(nblocks * BLOCK_SIZE as u64).unwrap();
	let dev = BlockReader::open(f.path(), true).unwrap();
	format(dev, &FormatOpts::default()).unwrap();
	let fs = Sofs::open(f.path(), true).unwrap();
	(f, fs)
}

/// Create a file under the root, fill its first cluster, read it back.
#[test]
fn create_and_read_a_file() {
	let (_f, mut fs) = fresh_volume(1024);

	let inr = fs.alloc_inode(InodeType::RegularFile).unwrap();
	fs.add_dir_entry(ROOT_INODE, "hello", inr, AttachMode::Add)
		.unwrap();

	let data = vec![0xABu8; BSLPC];
	fs.write_file_cluster(inr, 0, &data).unwrap();

	let mut back = vec![0u8; BSLPC];
	fs.read_file_cluster(inr, 0, &mut back).unwrap();
	assert_eq!(back, data);

	assert_eq!(fs.lookup_path("/hello").unwrap(), (ROOT_INODE, inr));
}

/// Rename a file into another directory; the inode follows the new name.
#[test]
fn rename_across_directories() {
	let (_f, mut fs) = fresh_volume(1024);
	fs.mkdir("/a", 0o755).unwrap();
	fs.mkdir("/b", 0o755).unwrap();
	fs.mknod("/a/f", 0o644).unwrap();
	let (_, inr) = fs.lookup_path("/a/f").unwrap();

	fs.rename("/a/f", "/b/g").unwrap();
	assert_eq!(fs.lookup_path("/b/g").unwrap().1, inr);
	assert!(matches!(fs.lookup_path("/a/f"), Err(Error::NoEntry)));
}

/// Truncating from ten clusters to three returns seven to the pool.
#[test]
fn truncate_frees_clusters() {
	let (_f, mut fs) = fresh_volume(1024);
	fs.mknod("/blob", 0o644).unwrap();
	let (_, inr) = fs.lookup_path("/blob").unwrap();

	for idx in 0..10u32 {
		fs.write_file_cluster(inr, idx, &vec![idx as u8; BSLPC])
			.unwrap();
	}
	fs.truncate("/blob", 10 * CLUSTER_SIZE as u32).unwrap();

	let free_before = fs.superblock().dzone_free;
	let clucount_before = fs.read_inode(inr).unwrap().clucount;

	fs.truncate("/blob", 3 * CLUSTER_SIZE as u32).unwrap();

	assert_eq!(fs.superblock().dzone_free, free_before + 7);
	assert_eq!(fs.read_inode(inr).unwrap().clucount, clucount_before - 7);

	// the kept prefix is intact
	let mut buf = vec![0u8; BSLPC];
	fs.read_file_cluster(inr, 2, &mut buf).unwrap();
	assert_eq!(buf, vec![2u8; BSLPC]);

	// and truncate-to-zero leaves the entry resolvable with nothing behind
	fs.truncate("/blob", 0).unwrap();
	let blob_inr = fs.lookup_path("/blob").unwrap().1;
	let ino = fs.read_inode(blob_inr).unwrap();
	assert_eq!((ino.size, ino.clucount), (0, 0));
}

/// Removing a populated directory is refused and changes nothing.
#[test]
fn non_empty_rmdir_rejected() {
	let (_f, mut fs) = fresh_volume(1024);
	fs.mkdir("/d", 0o755).unwrap();
	fs.mknod("/d/x", 0o644).unwrap();
	let (_, d) = fs.lookup_path("/d").unwrap();
	let (_, x) = fs.lookup_path("/d/x").unwrap();
	let ifree = fs.superblock().ifree;

	assert!(matches!(fs.rmdir("/d"), Err(Error::NotEmpty)));

	assert_eq!(fs.lookup_path("/d").unwrap().1, d);
	assert_eq!(fs.lookup_path("/d/x").unwrap().1, x);
	assert_eq!(fs.superblock().ifree, ifree);
	assert_eq!(fs.read_inode(d).unwrap().refcount, 2);
}

/// One symlink resolves; a chain of two is a loop.
#[test]
fn symlink_resolution() {
	let (_f, mut fs) = fresh_volume(1024);
	fs.symlink("/target", "/link").unwrap();
	fs.mknod("/target", 0o644).unwrap();

	let (_, target) = fs.lookup_path("/target").unwrap();
	assert_eq!(fs.lookup_path("/link").unwrap().1, target);

	fs.symlink("/link", "/link2").unwrap();
	assert!(matches!(fs.lookup_path("/link2"), Err(Error::Loop)));
}

/// Drain the data zone completely, then return every cluster in reverse
/// order; the free pool is whole again and structurally sound.
#[test]
fn allocate_all_then_free_all() {
	let (_f, mut fs) = fresh_volume(1024);
	let total = fs.superblock().dzone_total;
	let free = fs.superblock().dzone_free;

	let mut got = Vec::new();
	loop {
		match fs.alloc_cluster() {
			Ok(cl) => got.push(cl),
			Err(Error::NoSpace) => break,
			Err(e) => panic!("unexpected error: {e}"),
		}
	}
	assert_eq!(got.len(), free as usize);

	let mut sorted = got.clone();
	sorted.sort_unstable();
	sorted.dedup();
	assert_eq!(sorted.len(), got.len(), "references must be pairwise distinct");
	assert!(sorted.iter().all(|cl| *cl >= 1 && *cl < total));

	for cl in got.iter().rev() {
		fs.free_cluster(*cl).unwrap();
	}
	assert_eq!(fs.superblock().dzone_free, free);

	// a clean reopen re-runs the full structural check
	let f2 = _f;
	fs.unmount().unwrap();
	let mut fs = Sofs::open(f2.path(), true).unwrap();

	// and the whole pool allocates again
	for _ in 0..free {
		fs.alloc_cluster().unwrap();
	}
	assert!(matches!(fs.alloc_cluster(), Err(Error::NoSpace)));
}

/// The used-cluster census matches the superblock counters after a mixed
/// workload: every allocated cluster, cluster 0 included, is accounted for
/// in exactly one in-use inode's `clucount`.
#[test]
fn cluster_accounting_balances() {
	let (_f, mut fs) = fresh_volume(1024);
	fs.mkdir("/docs", 0o755).unwrap();
	fs.mknod("/docs/a", 0o644).unwrap();
	fs.mknod("/docs/b", 0o644).unwrap();
	fs.symlink("/docs/a", "/docs/shortcut").unwrap();
	fs.write("/docs/a", &vec![1u8; 3 * BSLPC], 0).unwrap();
	fs.write("/docs/b", &vec![2u8; BSLPC / 2], 0).unwrap();
	fs.unlink("/docs/b").unwrap();

	let mut inodes = vec![ROOT_INODE];
	for path in ["/docs", "/docs/a", "/docs/shortcut"] {
		inodes.push(fs.lookup_path_nofollow(path).unwrap().1);
	}
	let mut sum = 0;
	for inr in inodes {
		sum += fs.read_inode(inr).unwrap().clucount;
	}

	let sb = fs.superblock();
	assert_eq!(sum, sb.dzone_total - sb.dzone_free);
}

/// A volume survives an unmount/remount cycle with its tree intact.
#[test]
fn remount_preserves_the_tree() {
	let (f, mut fs) = fresh_volume(1024);
	fs.mkdir("/keep", 0o755).unwrap();
	fs.mknod("/keep/data", 0o644).unwrap();
	fs.write("/keep/data", b"persistent", 0).unwrap();
	fs.unmount().unwrap();

	let mut fs = Sofs::open(f.path(), true).unwrap();
	let mut buf = [0u8; 10];
	assert_eq!(fs.read("/keep/data", &mut buf, 0).unwrap(), 10);
	assert_eq!(&buf, b"persistent");
}

/// Oversized requests are refused before touching anything.
#[test]
fn max_file_size_is_enforced() {
	let (_f, mut fs) = fresh_volume(1024);
	fs.mknod("/f", 0o644).unwrap();
	assert!(matches!(
		fs.truncate("/f", MAX_FILE_SIZE + 1),
		Err(Error::FileTooBig)
	));
	assert!(matches!(
		fs.write("/f", b"x", MAX_FILE_SIZE),
		Err(Error::FileTooBig)
	));
}
