use super::*;
use crate::sofs::dir::{check_path, split_path};

impl<R: Backend> Sofs<R> {
	/// Resolve the parent directory of a path about to gain an entry and
	/// hand back `(parent inode, basename)`.
	fn resolve_parent<'p>(&mut self, path: &'p str) -> Result<(u32, &'p str)> {
		check_path(path)?;
		let (dir, name) = split_path(path);
		if name == "/" {
			return Err(Error::AlreadyExists);
		}
		let (_, dinr) = self.lookup_path(dir)?;
		let dino = self.read_inode(dinr)?;
		if !dino.is_dir() {
			return Err(Error::NotDirectory);
		}
		Ok((dinr, name))
	}

	fn create_inode(&mut self, dinr: u32, name: &str, kind: InodeType, perm: u16) -> Result<u32> {
		match self.dir_search(dinr, name)? {
			DirSearch::Found { .. } => return Err(Error::AlreadyExists),
			DirSearch::Missing { .. } => {}
		}
		let inr = self.alloc_inode(kind)?;
		let mut ino = self.read_inode(inr)?;
		ino.mode |= perm & PERM_MASK;
		self.write_inode(inr, &ino)?;
		if let Err(e) = self.add_dir_entry(dinr, name, inr, AttachMode::Add) {
			// don't strand the fresh inode when linking it fails
			let _ = self.free_inode(inr);
			return Err(e);
		}
		Ok(inr)
	}

	/// Create a directory.
	pub fn mkdir(&mut self, path: &str, perm: u16) -> Result<()> {
		log::trace!("mkdir({path:?}, {perm:#o});");
		self.assert_rw()?;
		if perm & PERM_MASK == 0 {
			return Err(Error::BadArgument);
		}
		let (dinr, name) = self.resolve_parent(path)?;
		self.create_inode(dinr, name, InodeType::Directory, perm)?;
		Ok(())
	}

	/// Create an empty regular file.
	pub fn mknod(&mut self, path: &str, perm: u16) -> Result<()> {
		log::trace!("mknod({path:?}, {perm:#o});");
		self.assert_rw()?;
		let (dinr, name) = self.resolve_parent(path)?;
		self.create_inode(dinr, name, InodeType::RegularFile, perm)?;
		Ok(())
	}

	/// Create a symbolic link at `path` holding `target`.
	pub fn symlink(&mut self, target: &str, path: &str) -> Result<()> {
		log::trace!("symlink({target:?}, {path:?});");
		self.assert_rw()?;
		if target.is_empty() {
			return Err(Error::BadArgument);
		}
		if target.len() > MAX_PATH {
			return Err(Error::NameTooLong);
		}
		let (dinr, name) = self.resolve_parent(path)?;
		let inr = self.create_inode(dinr, name, InodeType::Symlink, 0o777)?;
		self.symlink_store(inr, target)
	}

	/// Read the target of a symbolic link.
	pub fn readlink(&mut self, path: &str) -> Result<String> {
		log::trace!("readlink({path:?});");
		let (_, inr) = self.lookup_path_nofollow(path)?;
		let ino = self.read_inode(inr)?;
		self.symlink_target(inr, &ino)
	}

	/// Remove a file or symlink; its storage is reclaimed when the last
	/// link goes away.
	pub fn unlink(&mut self, path: &str) -> Result<()> {
		log::trace!("unlink({path:?});");
		self.assert_rw()?;
		let (dinr, einr) = self.lookup_path_nofollow(path)?;
		let ino = self.read_inode(einr)?;
		if ino.is_dir() {
			return Err(Error::IsDirectory);
		}
		let (_, name) = split_path(path);
		self.remove_dir_entry(dinr, name, DetachMode::Remove)
	}

	/// Remove an empty directory.
	pub fn rmdir(&mut self, path: &str) -> Result<()> {
		log::trace!("rmdir({path:?});");
		self.assert_rw()?;
		let (dinr, einr) = self.lookup_path_nofollow(path)?;
		if einr == ROOT_INODE {
			return Err(Error::BadArgument);
		}
		let ino = self.read_inode(einr)?;
		if !ino.is_dir() {
			return Err(Error::NotDirectory);
		}
		let (_, name) = split_path(path);
		self.remove_dir_entry(dinr, name, DetachMode::Remove)
	}

	/// Change the name or the location of a file in the directory tree.
	///
	/// An existing destination is type-checked against the source and
	/// semantically deleted first; the source entry is then renamed in
	/// place or moved with an add/attach plus a detach.
	pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
		log::trace!("rename({old:?}, {new:?});");
		self.assert_rw()?;
		check_path(old)?;
		check_path(new)?;

		let (old_dinr, old_inr) = self.lookup_path_nofollow(old)?;
		if old == new {
			return Ok(());
		}
		let (_, old_name) = split_path(old);
		let (new_dir, new_name) = split_path(new);
		if old_name == "/" || new_name == "/" {
			return Err(Error::BadArgument);
		}
		if old_name == "." || old_name == ".." || new_name == "." || new_name == ".." {
			return Err(Error::BadArgument);
		}

		let old_ino = self.read_inode(old_inr)?;
		// a directory cannot become its own descendant
		if old_ino.is_dir() && new.starts_with(old) && new.as_bytes().get(old.len()) == Some(&b'/')
		{
			return Err(Error::BadArgument);
		}

		let (_, new_dinr) = self.lookup_path(new_dir)?;

		if let DirSearch::Found { inr: new_inr, .. } = self.dir_search(new_dinr, new_name)? {
			if new_inr == old_inr {
				return Ok(());
			}
			let new_ino = self.read_inode(new_inr)?;
			if old_ino.is_dir() {
				if !new_ino.is_dir() {
					return Err(Error::NotDirectory);
				}
				self.check_directory_emptiness(new_inr)?;
			} else if new_ino.is_dir() {
				return Err(Error::IsDirectory);
			}
			self.remove_dir_entry(new_dinr, new_name, DetachMode::Remove)?;
		}

		if old_dinr == new_dinr {
			return self.rename_dir_entry(old_dinr, old_name, new_name);
		}

		let mode = if old_ino.is_dir() {
			AttachMode::Attach
		} else {
			AttachMode::Add
		};
		self.add_dir_entry(new_dinr, new_name, old_inr, mode)?;
		self.remove_dir_entry(old_dinr, old_name, DetachMode::Detach)
	}

	/// Truncate a regular file or symlink to `length` bytes.
	///
	/// Shrinking zeroes the tail of the last kept cluster and frees every
	/// cluster past it; growing only moves the size (the gap reads back as
	/// zeroes).
	pub fn truncate(&mut self, path: &str, length: u32) -> Result<()> {
		log::trace!("truncate({path:?}, {length});");
		self.assert_rw()?;
		if length > MAX_FILE_SIZE {
			return Err(Error::FileTooBig);
		}

		let (_, inr) = self.lookup_path(path)?;
		let ino = self.read_inode(inr)?;
		if ino.is_dir() {
			return Err(Error::IsDirectory);
		}
		self.access_granted(inr, W).map_err(|e| match e {
			Error::AccessDenied => Error::NotPermitted,
			e => e,
		})?;

		if length < ino.size {
			let (ci, off) = cluster_of_byte(length);
			if off != 0 {
				let mut buf = vec![0u8; BSLPC];
				self.read_file_cluster(inr, ci, &mut buf)?;
				buf[off as usize..].fill(0);
				self.write_file_cluster(inr, ci, &buf)?;
				if ci + 1 < MAX_FILE_CLUSTERS {
					self.inode_free_clusters(inr, ci + 1)?;
				}
			} else {
				self.inode_free_clusters(inr, ci)?;
			}
		}

		let mut ino = self.read_inode(inr)?;
		ino.size = length;
		self.write_inode(inr, &ino)
	}

	/// Write `buf` at byte position `pos`, growing the file as needed.
	pub fn write(&mut self, path: &str, buf: &[u8], pos: u32) -> Result<usize> {
		log::trace!("write({path:?}, {} bytes, {pos});", buf.len());
		self.assert_rw()?;

		let end = (pos as u64)
			.checked_add(buf.len() as u64)
			.filter(|end| *end <= MAX_FILE_SIZE as u64)
			.ok_or(Error::FileTooBig)? as u32;

		let (_, inr) = self.lookup_path(path)?;
		let ino = self.read_inode(inr)?;
		if ino.is_dir() {
			return Err(Error::IsDirectory);
		}
		self.access_granted(inr, W).map_err(|e| match e {
			Error::AccessDenied => Error::NotPermitted,
			e => e,
		})?;

		if ino.size < end {
			let mut ino = ino.clone();
			ino.size = end;
			self.write_inode(inr, &ino)?;
		}

		let mut cbuf = vec![0u8; BSLPC];
		let mut done = 0usize;
		let mut pos = pos;
		while done < buf.len() {
			let (ci, off) = cluster_of_byte(pos);
			let num = (BSLPC - off as usize).min(buf.len() - done);

			self.read_file_cluster(inr, ci, &mut cbuf)?;
			cbuf[off as usize..off as usize + num].copy_from_slice(&buf[done..done + num]);
			self.write_file_cluster(inr, ci, &cbuf)?;

			pos += num as u32;
			done += num;
		}
		Ok(done)
	}

	/// Read up to `buf.len()` bytes from byte position `pos`; returns the
	/// number of bytes read, clamped at end of file.
	pub fn read(&mut self, path: &str, buf: &mut [u8], pos: u32) -> Result<usize> {
		log::trace!("read({path:?}, {} bytes, {pos});", buf.len());

		let (_, inr) = self.lookup_path(path)?;
		let ino = self.read_inode(inr)?;
		if ino.is_dir() {
			return Err(Error::IsDirectory);
		}
		self.access_granted(inr, R)?;

		if pos >= ino.size {
			return Ok(0);
		}
		let len = (buf.len() as u64).min((ino.size - pos) as u64) as usize;

		let mut cbuf = vec![0u8; BSLPC];
		let mut done = 0usize;
		let mut pos = pos;
		while done < len {
			let (ci, off) = cluster_of_byte(pos);
			let num = (BSLPC - off as usize).min(len - done);

			self.read_file_cluster(inr, ci, &mut cbuf)?;
			buf[done..done + num].copy_from_slice(&cbuf[off as usize..off as usize + num]);

			pos += num as u32;
			done += num;
		}
		Ok(done)
	}
}

#[cfg(test)]
mod t {
	use super::*;
	use crate::sofs::t::harness;

	#[test]
	fn mkdir_mknod_lookup() {
		let (_f, mut fs) = harness(1024);
		fs.mkdir("/a", 0o755).unwrap();
		fs.mknod("/a/f", 0o644).unwrap();

		let (dinr, einr) = fs.lookup_path("/a/f").unwrap();
		let (_, a) = fs.lookup_path("/a").unwrap();
		assert_eq!(dinr, a);
		assert_eq!(fs.read_inode(einr).unwrap().kind(), InodeType::RegularFile);

		assert!(matches!(fs.mkdir("/a", 0o755), Err(Error::AlreadyExists)));
		assert!(matches!(fs.mknod("/a/f", 0o644), Err(Error::AlreadyExists)));
		assert!(matches!(fs.mknod("/nope/f", 0o644), Err(Error::NoEntry)));
	}

	#[test]
	fn write_then_read_across_clusters() {
		let (_f, mut fs) = harness(1024);
		fs.mknod("/data", 0o644).unwrap();

		let payload: Vec<u8> = (0..3 * BSLPC + 100).map(|i| (i % 251) as u8).collect();
		let n = fs.write("/data", &payload, 1000).unwrap();
		assert_eq!(n, payload.len());

		let (_, inr) = fs.lookup_path("/data").unwrap();
		assert_eq!(fs.read_inode(inr).unwrap().size, 1000 + payload.len() as u32);

		let mut back = vec![0u8; payload.len()];
		assert_eq!(fs.read("/data", &mut back, 1000).unwrap(), payload.len());
		assert_eq!(back, payload);

		// the gap before the write position reads as zeroes
		let mut head = vec![0xFFu8; 1000];
		assert_eq!(fs.read("/data", &mut head, 0).unwrap(), 1000);
		assert_eq!(head, vec![0u8; 1000]);
	}

	#[test]
	fn read_clamps_at_eof() {
		let (_f, mut fs) = harness(1024);
		fs.mknod("/small", 0o644).unwrap();
		fs.write("/small", b"hello", 0).unwrap();

		let mut buf = [0u8; 32];
		assert_eq!(fs.read("/small", &mut buf, 0).unwrap(), 5);
		assert_eq!(&buf[0..5], b"hello");
		assert_eq!(fs.read("/small", &mut buf, 5).unwrap(), 0);
	}

	#[test]
	fn truncate_frees_clusters() {
		let (_f, mut fs) = harness(1024);
		fs.mknod("/big", 0o644).unwrap();
		let (_, inr) = fs.lookup_path("/big").unwrap();
		let free = fs.sb().dzone_free;

		for idx in 0..10u32 {
			let data = vec![idx as u8; BSLPC];
			fs.write_file_cluster(inr, idx, &data).unwrap();
		}
		let mut ino = fs.read_inode(inr).unwrap();
		ino.size = 10 * BSLPC as u32;
		fs.write_inode(inr, &ino).unwrap();
		// 10 data clusters plus the single-indirect table
		assert_eq!(fs.sb().dzone_free, free - 11);

		fs.truncate("/big", 3 * BSLPC as u32).unwrap();
		let ino = fs.read_inode(inr).unwrap();
		assert_eq!(ino.size, 3 * BSLPC as u32);
		assert_eq!(ino.clucount, 3);
		assert_eq!(fs.sb().dzone_free, free - 3);

		// the path is still there and reads back intact
		let mut buf = vec![0u8; BSLPC];
		fs.read("/big", &mut buf, 0).unwrap();
		assert_eq!(buf, vec![0u8; BSLPC]);

		fs.truncate("/big", 0).unwrap();
		let ino = fs.read_inode(inr).unwrap();
		assert_eq!((ino.size, ino.clucount), (0, 0));
		assert_eq!(fs.sb().dzone_free, free);
		fs.lookup_path("/big").unwrap();
	}

	#[test]
	fn truncate_zeroes_partial_tail() {
		let (_f, mut fs) = harness(1024);
		fs.mknod("/t", 0o644).unwrap();
		fs.write("/t", &vec![0xAAu8; 2 * BSLPC], 0).unwrap();

		fs.truncate("/t", 100).unwrap();
		// grow again without writing: the old tail must not resurface
		fs.truncate("/t", BSLPC as u32).unwrap();
		let mut buf = vec![0u8; BSLPC];
		fs.read("/t", &mut buf, 0).unwrap();
		assert_eq!(&buf[0..100], &vec![0xAAu8; 100][..]);
		assert_eq!(&buf[100..], &vec![0u8; BSLPC - 100][..]);
	}

	#[test]
	fn unlink_and_rmdir() {
		let (_f, mut fs) = harness(1024);
		fs.mkdir("/d", 0o755).unwrap();
		fs.mknod("/d/x", 0o644).unwrap();

		assert!(matches!(fs.unlink("/d"), Err(Error::IsDirectory)));
		assert!(matches!(fs.rmdir("/d/x"), Err(Error::NotDirectory)));
		assert!(matches!(fs.rmdir("/d"), Err(Error::NotEmpty)));

		fs.unlink("/d/x").unwrap();
		fs.rmdir("/d").unwrap();
		assert!(matches!(fs.lookup_path("/d"), Err(Error::NoEntry)));
	}

	#[test]
	fn rename_within_directory() {
		let (_f, mut fs) = harness(1024);
		fs.mknod("/p", 0o644).unwrap();
		let (_, inr) = fs.lookup_path("/p").unwrap();

		fs.rename("/p", "/p").unwrap();
		assert_eq!(fs.lookup_path("/p").unwrap().1, inr);

		fs.rename("/p", "/q").unwrap();
		assert_eq!(fs.lookup_path("/q").unwrap().1, inr);
		assert!(matches!(fs.lookup_path("/p"), Err(Error::NoEntry)));

		fs.rename("/q", "/p").unwrap();
		assert_eq!(fs.lookup_path("/p").unwrap().1, inr);
	}

	#[test]
	fn rename_across_directories() {
		let (_f, mut fs) = harness(1024);
		fs.mkdir("/a", 0o755).unwrap();
		fs.mkdir("/b", 0o755).unwrap();
		fs.mknod("/a/f", 0o644).unwrap();
		let (_, inr) = fs.lookup_path("/a/f").unwrap();

		fs.rename("/a/f", "/b/g").unwrap();
		assert_eq!(fs.lookup_path("/b/g").unwrap().1, inr);
		assert!(matches!(fs.lookup_path("/a/f"), Err(Error::NoEntry)));
		assert_eq!(fs.read_inode(inr).unwrap().refcount, 1);
	}

	#[test]
	fn rename_moves_directories() {
		let (_f, mut fs) = harness(1024);
		fs.mkdir("/a", 0o755).unwrap();
		fs.mkdir("/b", 0o755).unwrap();
		fs.mkdir("/a/d", 0o755).unwrap();
		fs.mknod("/a/d/inner", 0o644).unwrap();

		fs.rename("/a/d", "/b/d").unwrap();
		fs.lookup_path("/b/d/inner").unwrap();
		let (_, d) = fs.lookup_path("/b/d").unwrap();
		let (_, b) = fs.lookup_path("/b").unwrap();
		assert_eq!(fs.dir_lookup(d, "..").unwrap(), b);

		// /a lost its subdirectory back-reference
		let (_, a) = fs.lookup_path("/a").unwrap();
		assert_eq!(fs.read_inode(a).unwrap().refcount, 2);
		assert_eq!(fs.read_inode(b).unwrap().refcount, 3);
	}

	#[test]
	fn rename_over_existing_file_replaces_it() {
		let (_f, mut fs) = harness(1024);
		fs.mknod("/src", 0o644).unwrap();
		fs.mknod("/dst", 0o644).unwrap();
		fs.write("/dst", b"victim", 0).unwrap();
		let (_, src) = fs.lookup_path("/src").unwrap();
		let ifree = fs.sb().ifree;

		fs.rename("/src", "/dst").unwrap();
		assert_eq!(fs.lookup_path("/dst").unwrap().1, src);
		assert!(matches!(fs.lookup_path("/src"), Err(Error::NoEntry)));
		// the replaced inode was reclaimed
		assert_eq!(fs.sb().ifree, ifree + 1);
	}

	#[test]
	fn rename_dir_over_nonempty_rejected() {
		let (_f, mut fs) = harness(1024);
		fs.mkdir("/a", 0o755).unwrap();
		fs.mkdir("/b", 0o755).unwrap();
		fs.mknod("/b/x", 0o644).unwrap();

		assert!(matches!(fs.rename("/a", "/b"), Err(Error::NotEmpty)));
		// and a directory cannot move under itself
		assert!(matches!(fs.rename("/a", "/a/sub"), Err(Error::BadArgument)));
	}

	#[test]
	fn symlink_resolution() {
		let (_f, mut fs) = harness(1024);
		fs.symlink("/target", "/link").unwrap();
		fs.mknod("/target", 0o644).unwrap();

		let (_, target) = fs.lookup_path("/target").unwrap();
		assert_eq!(fs.lookup_path("/link").unwrap().1, target);
		assert_eq!(fs.readlink("/link").unwrap(), "/target");

		// a chain of two links is refused
		fs.symlink("/link", "/link2").unwrap();
		assert!(matches!(fs.lookup_path("/link2"), Err(Error::Loop)));
	}

	#[test]
	fn relative_symlink_splices_into_parent() {
		let (_f, mut fs) = harness(1024);
		fs.mkdir("/dir", 0o755).unwrap();
		fs.mknod("/dir/real", 0o644).unwrap();
		fs.symlink("real", "/dir/alias").unwrap();

		let (_, real) = fs.lookup_path("/dir/real").unwrap();
		assert_eq!(fs.lookup_path("/dir/alias").unwrap().1, real);
	}

	#[test]
	fn symlink_in_the_middle_of_a_path() {
		let (_f, mut fs) = harness(1024);
		fs.mkdir("/data", 0o755).unwrap();
		fs.mknod("/data/file", 0o644).unwrap();
		fs.symlink("/data", "/d").unwrap();

		let (_, file) = fs.lookup_path("/data/file").unwrap();
		assert_eq!(fs.lookup_path("/d/file").unwrap().1, file);
	}

	#[test]
	fn write_past_max_size_rejected() {
		let (_f, mut fs) = harness(1024);
		fs.mknod("/f", 0o644).unwrap();
		let e = fs.write("/f", b"x", MAX_FILE_SIZE).unwrap_err();
		assert!(matches!(e, Error::FileTooBig));
		assert!(matches!(
			fs.truncate("/f", MAX_FILE_SIZE + 1),
			Err(Error::FileTooBig)
		));
	}

	#[test]
	fn permission_denied_for_other_users() {
		let (_f, mut fs) = harness(1024);
		fs.mkdir("/locked", 0o700).unwrap();
		fs.mknod("/locked/f", 0o600).unwrap();

		let (uid, gid) = fs.credentials();
		fs.set_credentials(uid + 1, gid + 1);
		assert!(matches!(
			fs.lookup_path("/locked/f"),
			Err(Error::AccessDenied)
		));
		assert!(matches!(
			fs.mknod("/locked/g", 0o644),
			Err(Error::AccessDenied)
		));

		fs.set_credentials(uid, gid);
		fs.lookup_path("/locked/f").unwrap();
	}
}
