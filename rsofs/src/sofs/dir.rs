use std::io::Cursor;

use super::*;

/// Result of scanning a directory for a name: either the entry, or the slot
/// an insertion should use.
#[derive(Debug, Clone, Copy)]
pub enum DirSearch {
	Found { inr: u32, idx: u32 },
	Missing { free_idx: u32 },
}

/// How a new entry relates to its inode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
	/// First link of a newly allocated inode; a directory target gets its
	/// `"."` / `".."` cluster initialised.
	Add,
	/// Re-parent a fully formed subtree; both inodes must be directories.
	Attach,
}

/// How an entry leaves its directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachMode {
	/// Semantic delete: tombstone the entry and reclaim the inode when its
	/// last link goes away.
	Remove,
	/// Blank the entry without ever cascading into inode release; the
	/// removal side of a rename or attach move.
	Detach,
}

fn check_name(name: &str) -> Result<()> {
	if name.is_empty() || name.contains('/') || name.contains('\0') {
		return Err(Error::BadArgument);
	}
	if name.len() > MAX_NAME {
		return Err(Error::NameTooLong);
	}
	Ok(())
}

/// Split an absolute path into (dirname, basename). The root splits into
/// `("/", "/")`.
pub(crate) fn split_path(path: &str) -> (&str, &str) {
	let p = path.trim_end_matches('/');
	if p.is_empty() {
		return ("/", "/");
	}
	match p.rfind('/') {
		Some(0) => ("/", &p[1..]),
		Some(i) => (&p[..i], &p[i + 1..]),
		None => ("/", p),
	}
}

pub(crate) fn check_path(path: &str) -> Result<()> {
	if path.is_empty() {
		return Err(Error::BadArgument);
	}
	if path.len() > MAX_PATH {
		return Err(Error::NameTooLong);
	}
	if !path.starts_with('/') {
		return Err(Error::RelativePath);
	}
	Ok(())
}

impl<R: Backend> Sofs<R> {
	pub(crate) fn read_dir_cluster(&mut self, inr: u32, ci: u32) -> Result<Vec<DirEntry>> {
		let mut buf = vec![0u8; BSLPC];
		self.read_file_cluster(inr, ci, &mut buf)?;
		let mut dec = Decoder::new(Cursor::new(&buf[..]));
		let mut entries = Vec::with_capacity(DPC);
		for _ in 0..DPC {
			entries.push(dec.decode()?);
		}
		Ok(entries)
	}

	pub(crate) fn write_dir_cluster(&mut self, inr: u32, ci: u32, entries: &[DirEntry]) -> Result<()> {
		assert_eq!(entries.len(), DPC);
		let mut buf = vec![0u8; BSLPC];
		{
			let mut enc = Decoder::new(Cursor::new(&mut buf[..]));
			for e in entries {
				enc.encode(e)?;
			}
		}
		self.write_file_cluster(inr, ci, &buf)
	}

	/// Scan a directory for `name`.
	///
	/// The first free slot seen on the way is remembered so a caller that
	/// means to insert can reuse it; when no slot is free the index just
	/// past the scanned entries is handed out instead.
	pub(crate) fn dir_search(&mut self, dinr: u32, name: &str) -> Result<DirSearch> {
		log::trace!("dir_search({dinr}, {name:?});");
		check_name(name)?;
		let ino = self.read_inode(dinr)?;
		if !ino.is_dir() {
			return Err(Error::NotDirectory);
		}
		self.access_granted(dinr, X)?;

		let nclusters = ino.size / CLUSTER_SIZE as u32;
		let mut free_idx = None;
		for ci in 0..nclusters {
			let entries = self.read_dir_cluster(dinr, ci)?;
			for (j, e) in entries.iter().enumerate() {
				let idx = ci * DPC as u32 + j as u32;
				if !e.is_used() {
					if free_idx.is_none() {
						free_idx = Some(idx);
					}
				} else if e.name_is(name) {
					return Ok(DirSearch::Found { inr: e.inr, idx });
				}
			}
		}
		Ok(DirSearch::Missing {
			free_idx: free_idx.unwrap_or(nclusters * DPC as u32),
		})
	}

	/// Find the inode a name resolves to inside a directory.
	pub fn dir_lookup(&mut self, dinr: u32, name: &str) -> Result<u32> {
		match self.dir_search(dinr, name)? {
			DirSearch::Found { inr, .. } => Ok(inr),
			DirSearch::Missing { .. } => Err(Error::NoEntry),
		}
	}

	/// Resolve an absolute path to `(directory inode, entry inode)`.
	///
	/// At most one symbolic link is followed per resolution: an absolute
	/// target restarts from the root, a relative one is spliced after the
	/// parent's path, and a second link raises [`Error::Loop`].
	pub fn lookup_path(&mut self, path: &str) -> Result<(u32, u32)> {
		log::trace!("lookup_path({path:?});");
		check_path(path)?;
		let mut symlinks = 0;
		self.traverse_path(path, &mut symlinks)
	}

	/// Resolve a path without following a symlink in the final component.
	pub fn lookup_path_nofollow(&mut self, path: &str) -> Result<(u32, u32)> {
		log::trace!("lookup_path_nofollow({path:?});");
		check_path(path)?;
		let (dir, name) = split_path(path);
		if name == "/" {
			return Ok((ROOT_INODE, ROOT_INODE));
		}
		let (_, dinr) = self.lookup_path(dir)?;
		let einr = self.dir_lookup(dinr, name)?;
		Ok((dinr, einr))
	}

	fn traverse_path(&mut self, path: &str, symlinks: &mut u32) -> Result<(u32, u32)> {
		let (dir, name) = split_path(path);
		let name = if name == "/" { "." } else { name };

		let dinr = if dir == "/" {
			ROOT_INODE
		} else {
			let (_, parent) = self.traverse_path(dir, symlinks)?;
			parent
		};
		let einr = self.dir_lookup(dinr, name)?;

		let ino = self.read_inode(einr)?;
		if !ino.is_symlink() {
			return Ok((dinr, einr));
		}
		if *symlinks >= 1 {
			return Err(Error::Loop);
		}
		*symlinks += 1;

		let target = self.symlink_target(einr, &ino)?;
		let newpath = if target.starts_with('/') {
			target
		} else if dir.ends_with('/') {
			format!("{dir}{target}")
		} else {
			format!("{dir}/{target}")
		};
		if newpath.len() > MAX_PATH {
			return Err(Error::NameTooLong);
		}
		self.traverse_path(&newpath, symlinks)
	}

	/// Add (`Add`) or attach (`Attach`) an entry named `name` for inode
	/// `einr` inside directory `dinr`.
	pub fn add_dir_entry(
		&mut self,
		dinr: u32,
		name: &str,
		einr: u32,
		mode: AttachMode,
	) -> Result<()> {
		log::trace!("add_dir_entry({dinr}, {name:?}, {einr}, {mode:?});");
		self.assert_rw()?;
		check_name(name)?;

		self.access_granted(dinr, X)?;
		self.access_granted(dinr, W).map_err(|e| match e {
			Error::AccessDenied => Error::NotPermitted,
			e => e,
		})?;

		let mut dino = self.read_inode(dinr)?;
		let mut eino = self.read_inode(einr)?;
		if !dino.is_dir() {
			return Err(Error::NotDirectory);
		}
		if dino.size >= MAX_FILE_SIZE {
			return Err(Error::FileTooBig);
		}
		if dino.refcount == u16::MAX || eino.refcount == u16::MAX {
			return Err(Error::MaxLinks);
		}

		let free_idx = match self.dir_search(dinr, name)? {
			DirSearch::Found { .. } => return Err(Error::AlreadyExists),
			DirSearch::Missing { free_idx } => free_idx,
		};
		if free_idx as u64 * DIRENT_SIZE as u64 >= MAX_FILE_SIZE as u64 {
			return Err(Error::FileTooBig);
		}

		match mode {
			AttachMode::Add => {
				if eino.is_dir() {
					// first link of a new directory: build its own cluster
					let mut entries = vec![DirEntry::free(); DPC];
					entries[0] = DirEntry::new(".", einr);
					entries[1] = DirEntry::new("..", dinr);

					eino.refcount += 2;
					eino.size = CLUSTER_SIZE as u32;
					dino.refcount += 1;
					self.write_inode(einr, &eino)?;
					self.write_inode(dinr, &dino)?;
					self.write_dir_cluster(einr, 0, &entries)?;
				} else {
					eino.refcount += 1;
					self.write_inode(einr, &eino)?;
				}
				self.insert_entry(dinr, free_idx, name, einr)
			}
			AttachMode::Attach => {
				if !eino.is_dir() {
					return Err(Error::NotDirectory);
				}
				self.insert_entry(dinr, free_idx, name, einr)?;

				// the subtree's ".." now names the new parent
				let DirSearch::Found { idx, .. } = self.dir_search(einr, "..")? else {
					return Err(Error::DirInvalid);
				};
				let ci = idx / DPC as u32;
				let mut entries = self.read_dir_cluster(einr, ci)?;
				entries[(idx % DPC as u32) as usize].inr = dinr;
				self.write_dir_cluster(einr, ci, &entries)?;

				eino.refcount += 1;
				self.write_inode(einr, &eino)?;
				// insert_entry may have grown the parent, so take it fresh
				let mut dino = self.read_inode(dinr)?;
				dino.refcount += 1;
				self.write_inode(dinr, &dino)
			}
		}
	}

	fn insert_entry(&mut self, dinr: u32, idx: u32, name: &str, einr: u32) -> Result<()> {
		let ci = idx / DPC as u32;
		let off = (idx % DPC as u32) as usize;

		let dino = self.read_inode(dinr)?;
		let covered = ci < dino.size / CLUSTER_SIZE as u32;
		let mut entries = if covered {
			self.read_dir_cluster(dinr, ci)?
		} else {
			vec![DirEntry::free(); DPC]
		};
		entries[off] = DirEntry::new(name, einr);
		self.write_dir_cluster(dinr, ci, &entries)?;

		if !covered {
			let mut dino = self.read_inode(dinr)?;
			dino.size = (ci + 1) * CLUSTER_SIZE as u32;
			self.write_inode(dinr, &dino)?;
		}
		Ok(())
	}

	/// Remove (`Remove`) or detach (`Detach`) the entry named `name` from
	/// directory `dinr`.
	///
	/// Removal tombstones the entry by swapping its first and last name
	/// bytes, preserving the inode linkage for recovery tools, and releases
	/// the clusters and inode once the last link is gone. Detachment blanks
	/// the entry and never cascades.
	pub fn remove_dir_entry(&mut self, dinr: u32, name: &str, mode: DetachMode) -> Result<()> {
		log::trace!("remove_dir_entry({dinr}, {name:?}, {mode:?});");
		self.assert_rw()?;
		check_name(name)?;
		if name == "." || name == ".." {
			return Err(Error::BadArgument);
		}

		self.access_granted(dinr, X)?;
		self.access_granted(dinr, W).map_err(|e| match e {
			Error::AccessDenied => Error::NotPermitted,
			e => e,
		})?;

		let mut dino = self.read_inode(dinr)?;
		if !dino.is_dir() {
			return Err(Error::NotDirectory);
		}
		let (einr, idx) = match self.dir_search(dinr, name)? {
			DirSearch::Found { inr, idx } => (inr, idx),
			DirSearch::Missing { .. } => return Err(Error::NoEntry),
		};
		let mut eino = self.read_inode(einr)?;
		if mode == DetachMode::Remove && eino.is_dir() {
			self.check_directory_emptiness(einr)?;
		}

		let ci = idx / DPC as u32;
		let off = (idx % DPC as u32) as usize;
		let mut entries = self.read_dir_cluster(dinr, ci)?;
		match mode {
			DetachMode::Remove => {
				let e = &mut entries[off];
				e.name[MAX_NAME] = e.name[0];
				e.name[0] = 0;
			}
			DetachMode::Detach => entries[off] = DirEntry::free(),
		}
		self.write_dir_cluster(dinr, ci, &entries)?;

		match mode {
			DetachMode::Remove => {
				if eino.is_dir() {
					eino.refcount -= 2;
					dino.refcount -= 1;
					self.write_inode(dinr, &dino)?;
				} else {
					eino.refcount -= 1;
				}
			}
			DetachMode::Detach => {
				// the moved entry keeps living elsewhere; its "." stays
				eino.refcount -= 1;
				if eino.is_dir() {
					dino.refcount -= 1;
					self.write_inode(dinr, &dino)?;
				}
			}
		}
		self.write_inode(einr, &eino)?;

		if mode == DetachMode::Remove && eino.refcount == 0 {
			self.inode_free_clusters(einr, 0)?;
			self.free_inode(einr)?;
		}
		Ok(())
	}

	/// Replace the name of an entry in place; the inode linkage is
	/// untouched. Renaming an entry to itself is a no-op.
	pub fn rename_dir_entry(&mut self, dinr: u32, old: &str, new: &str) -> Result<()> {
		log::trace!("rename_dir_entry({dinr}, {old:?}, {new:?});");
		self.assert_rw()?;
		if old == "." || old == ".." || new == "." || new == ".." {
			return Err(Error::BadArgument);
		}
		check_name(old)?;
		check_name(new)?;
		if old == new {
			return Ok(());
		}

		self.access_granted(dinr, X)?;
		self.access_granted(dinr, W).map_err(|e| match e {
			Error::AccessDenied => Error::NotPermitted,
			e => e,
		})?;

		let idx = match self.dir_search(dinr, old)? {
			DirSearch::Found { idx, .. } => idx,
			DirSearch::Missing { .. } => return Err(Error::NoEntry),
		};
		match self.dir_search(dinr, new)? {
			DirSearch::Found { .. } => return Err(Error::AlreadyExists),
			DirSearch::Missing { .. } => {}
		}

		let ci = idx / DPC as u32;
		let off = (idx % DPC as u32) as usize;
		let mut entries = self.read_dir_cluster(dinr, ci)?;
		entries[off].set_name(new);
		self.write_dir_cluster(dinr, ci, &entries)
	}

	/// A directory is empty when nothing past the two pinned entries is in
	/// use.
	pub fn check_directory_emptiness(&mut self, inr: u32) -> Result<()> {
		let ino = self.read_inode(inr)?;
		if !ino.is_dir() {
			return Err(Error::NotDirectory);
		}
		let nclusters = ino.size / CLUSTER_SIZE as u32;
		for ci in 0..nclusters {
			let entries = self.read_dir_cluster(inr, ci)?;
			for (j, e) in entries.iter().enumerate() {
				let idx = ci * DPC as u32 + j as u32;
				if idx >= 2 && e.is_used() {
					return Err(Error::NotEmpty);
				}
			}
		}
		Ok(())
	}

	/// Call `f` on every in-use entry of a directory, skipping tombstones.
	pub fn dir_iter<T>(
		&mut self,
		inr: u32,
		mut f: impl FnMut(&str, u32) -> Option<T>,
	) -> Result<Option<T>> {
		let ino = self.read_inode(inr)?;
		if !ino.is_dir() {
			return Err(Error::NotDirectory);
		}
		let nclusters = ino.size / CLUSTER_SIZE as u32;
		for ci in 0..nclusters {
			let entries = self.read_dir_cluster(inr, ci)?;
			for e in entries.iter().filter(|e| e.is_used()) {
				let name = String::from_utf8_lossy(e.name_bytes()).into_owned();
				if let Some(x) = f(&name, e.inr) {
					return Ok(Some(x));
				}
			}
		}
		Ok(None)
	}
}
