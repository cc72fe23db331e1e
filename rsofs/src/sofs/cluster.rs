use super::*;

/// Which tier of the reference tree a file-relative cluster index lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterAddr {
	/// Slot of `d[]`.
	Direct(usize),
	/// Slot of the single-indirect reference cluster.
	Indirect1(usize),
	/// (slot of the double-indirect cluster, slot of the single-indirect
	/// cluster stored there).
	Indirect2(usize, usize),
}

impl<R: Backend> Sofs<R> {
	pub(crate) fn decode_clustidx(&self, idx: u32) -> Result<ClusterAddr> {
		let nd = N_DIRECT as u32;
		let rpc = RPC as u32;

		if idx < nd {
			Ok(ClusterAddr::Direct(idx as usize))
		} else if idx < nd + rpc {
			Ok(ClusterAddr::Indirect1((idx - nd) as usize))
		} else if idx < MAX_FILE_CLUSTERS {
			let x = idx - nd - rpc;
			Ok(ClusterAddr::Indirect2((x / rpc) as usize, (x % rpc) as usize))
		} else {
			Err(Error::BadArgument)
		}
	}

	/// Read a cluster of `RPC` cluster references.
	pub(crate) fn read_ref_cluster(&mut self, nclust: u32) -> Result<Vec<u32>> {
		log::trace!("read_ref_cluster({nclust});");
		let addr = self.superblock.cluster_addr(nclust);
		self.file.seek(addr)?;
		let mut refs = vec![0u32; RPC];
		for r in refs.iter_mut() {
			*r = self.file.decode()?;
		}
		Ok(refs)
	}

	pub(crate) fn write_ref_cluster(&mut self, nclust: u32, refs: &[u32]) -> Result<()> {
		log::trace!("write_ref_cluster({nclust});");
		assert_eq!(refs.len(), RPC);
		let addr = self.superblock.cluster_addr(nclust);
		self.file.seek(addr)?;
		for r in refs {
			self.file.encode(r)?;
		}
		Ok(())
	}

	/// Allocate a cluster to serve as an indirection table, every slot
	/// pre-filled with `NULL_CLUSTER`.
	fn alloc_ref_cluster(&mut self) -> Result<u32> {
		let nclust = self.alloc_cluster()?;
		self.write_ref_cluster(nclust, &vec![NULL_CLUSTER; RPC])?;
		Ok(nclust)
	}

	/// Logical number of the data cluster at file cluster index `idx`, if
	/// the reference path down to it exists.
	pub fn inode_get_cluster(&mut self, inr: u32, idx: u32) -> Result<Option<u32>> {
		log::trace!("inode_get_cluster({inr}, {idx});");
		let ino = self.read_inode(inr)?;
		self.resolve_file_cluster(&ino, idx)
	}

	pub(crate) fn resolve_file_cluster(&mut self, ino: &Inode, idx: u32) -> Result<Option<u32>> {
		fn ref_of(r: u32) -> Option<u32> {
			(r != NULL_CLUSTER).then_some(r)
		}

		match self.decode_clustidx(idx)? {
			ClusterAddr::Direct(d) => Ok(ref_of(ino.direct[d])),
			ClusterAddr::Indirect1(i) => {
				if ino.i1 == NULL_CLUSTER {
					return Ok(None);
				}
				let refs = self.read_ref_cluster(ino.i1)?;
				Ok(ref_of(refs[i]))
			}
			ClusterAddr::Indirect2(hi, lo) => {
				if ino.i2 == NULL_CLUSTER {
					return Ok(None);
				}
				let l1 = self.read_ref_cluster(ino.i2)?;
				let Some(snd) = ref_of(l1[hi]) else {
					return Ok(None);
				};
				let l2 = self.read_ref_cluster(snd)?;
				Ok(ref_of(l2[lo]))
			}
		}
	}

	/// Allocate the data cluster at file cluster index `idx`, creating
	/// missing indirection clusters on demand.
	///
	/// The whole allocation is budgeted up front: one free cluster for the
	/// data itself plus one per missing indirection cluster, so nothing is
	/// mutated when the zone cannot fit the request. `clucount` grows once
	/// per cluster actually allocated.
	pub fn inode_alloc_cluster(&mut self, inr: u32, idx: u32) -> Result<u32> {
		log::trace!("inode_alloc_cluster({inr}, {idx});");
		self.assert_rw()?;
		let mut ino = self.read_inode(inr)?;
		let nclust = self.alloc_file_cluster(&mut ino, idx)?;
		self.write_inode(inr, &ino)?;
		Ok(nclust)
	}

	pub(crate) fn alloc_file_cluster(&mut self, ino: &mut Inode, idx: u32) -> Result<u32> {
		match self.decode_clustidx(idx)? {
			ClusterAddr::Direct(d) => {
				if ino.direct[d] != NULL_CLUSTER {
					return Err(Error::AlreadyInList);
				}
				let nclust = self.alloc_cluster()?;
				ino.direct[d] = nclust;
				ino.clucount += 1;
				Ok(nclust)
			}
			ClusterAddr::Indirect1(i) => {
				if ino.i1 == NULL_CLUSTER {
					if self.superblock.dzone_free < 2 {
						return Err(Error::NoSpace);
					}
					ino.i1 = self.alloc_ref_cluster()?;
					ino.clucount += 1;
				}
				let mut refs = self.read_ref_cluster(ino.i1)?;
				if refs[i] != NULL_CLUSTER {
					return Err(Error::AlreadyInList);
				}
				let nclust = self.alloc_cluster()?;
				refs[i] = nclust;
				self.write_ref_cluster(ino.i1, &refs)?;
				ino.clucount += 1;
				Ok(nclust)
			}
			ClusterAddr::Indirect2(hi, lo) => {
				if ino.i2 == NULL_CLUSTER {
					if self.superblock.dzone_free < 3 {
						return Err(Error::NoSpace);
					}
					ino.i2 = self.alloc_ref_cluster()?;
					ino.clucount += 1;
				}
				let mut l1 = self.read_ref_cluster(ino.i2)?;
				if l1[hi] == NULL_CLUSTER {
					if self.superblock.dzone_free < 2 {
						return Err(Error::NoSpace);
					}
					let snd = self.alloc_ref_cluster()?;
					l1[hi] = snd;
					self.write_ref_cluster(ino.i2, &l1)?;
					ino.clucount += 1;
				}
				let snd = l1[hi];
				let mut l2 = self.read_ref_cluster(snd)?;
				if l2[lo] != NULL_CLUSTER {
					return Err(Error::AlreadyInList);
				}
				let nclust = self.alloc_cluster()?;
				l2[lo] = nclust;
				self.write_ref_cluster(snd, &l2)?;
				ino.clucount += 1;
				Ok(nclust)
			}
		}
	}

	/// Free the data cluster at file cluster index `idx`. An indirection
	/// cluster whose last reference goes away is freed as well.
	pub fn inode_free_cluster(&mut self, inr: u32, idx: u32) -> Result<()> {
		log::trace!("inode_free_cluster({inr}, {idx});");
		self.assert_rw()?;
		let mut ino = self.read_inode(inr)?;
		self.free_file_cluster(&mut ino, idx)?;
		self.write_inode(inr, &ino)
	}

	pub(crate) fn free_file_cluster(&mut self, ino: &mut Inode, idx: u32) -> Result<()> {
		match self.decode_clustidx(idx)? {
			ClusterAddr::Direct(d) => {
				if ino.direct[d] == NULL_CLUSTER {
					return Err(Error::NotInList);
				}
				self.free_cluster(ino.direct[d])?;
				ino.direct[d] = NULL_CLUSTER;
				ino.clucount -= 1;
				Ok(())
			}
			ClusterAddr::Indirect1(i) => {
				if ino.i1 == NULL_CLUSTER {
					return Err(Error::NotInList);
				}
				let mut refs = self.read_ref_cluster(ino.i1)?;
				if refs[i] == NULL_CLUSTER {
					return Err(Error::NotInList);
				}
				self.free_cluster(refs[i])?;
				refs[i] = NULL_CLUSTER;
				self.write_ref_cluster(ino.i1, &refs)?;
				ino.clucount -= 1;

				if refs.iter().all(|r| *r == NULL_CLUSTER) {
					self.free_cluster(ino.i1)?;
					ino.i1 = NULL_CLUSTER;
					ino.clucount -= 1;
				}
				Ok(())
			}
			ClusterAddr::Indirect2(hi, lo) => {
				if ino.i2 == NULL_CLUSTER {
					return Err(Error::NotInList);
				}
				let mut l1 = self.read_ref_cluster(ino.i2)?;
				let snd = l1[hi];
				if snd == NULL_CLUSTER {
					return Err(Error::NotInList);
				}
				let mut l2 = self.read_ref_cluster(snd)?;
				if l2[lo] == NULL_CLUSTER {
					return Err(Error::NotInList);
				}
				self.free_cluster(l2[lo])?;
				l2[lo] = NULL_CLUSTER;
				self.write_ref_cluster(snd, &l2)?;
				ino.clucount -= 1;

				if l2.iter().all(|r| *r == NULL_CLUSTER) {
					self.free_cluster(snd)?;
					l1[hi] = NULL_CLUSTER;
					self.write_ref_cluster(ino.i2, &l1)?;
					ino.clucount -= 1;

					if l1.iter().all(|r| *r == NULL_CLUSTER) {
						self.free_cluster(ino.i2)?;
						ino.i2 = NULL_CLUSTER;
						ino.clucount -= 1;
					}
				}
				Ok(())
			}
		}
	}

	/// Free every allocated data cluster with file cluster index `>= from`:
	/// the double-indirect tree, then the single-indirect tail, then the
	/// direct slots. Indirection clusters are reclaimed as they empty.
	pub fn inode_free_clusters(&mut self, inr: u32, from: u32) -> Result<()> {
		log::trace!("inode_free_clusters({inr}, {from});");
		self.assert_rw()?;
		if from >= MAX_FILE_CLUSTERS {
			return Err(Error::BadArgument);
		}

		let nd = N_DIRECT as u32;
		let rpc = RPC as u32;
		let mut ino = self.read_inode(inr)?;

		if ino.i2 != NULL_CLUSTER {
			let base = nd + rpc;
			let l1 = self.read_ref_cluster(ino.i2)?;
			let hi0 = from.saturating_sub(base) / rpc;
			for hi in hi0..rpc {
				if l1[hi as usize] == NULL_CLUSTER {
					continue;
				}
				let l2 = self.read_ref_cluster(l1[hi as usize])?;
				let start = base + hi * rpc;
				let lo0 = from.saturating_sub(start).min(rpc);
				for lo in lo0..rpc {
					if l2[lo as usize] != NULL_CLUSTER {
						self.free_file_cluster(&mut ino, start + lo)?;
					}
				}
			}
		}

		if ino.i1 != NULL_CLUSTER && from < nd + rpc {
			let refs = self.read_ref_cluster(ino.i1)?;
			let i0 = from.saturating_sub(nd);
			for i in i0..rpc {
				if refs[i as usize] != NULL_CLUSTER {
					self.free_file_cluster(&mut ino, nd + i)?;
				}
			}
		}

		for d in from..nd {
			if ino.direct[d as usize] != NULL_CLUSTER {
				self.free_file_cluster(&mut ino, d)?;
			}
		}

		self.write_inode(inr, &ino)
	}

	/// Read one whole file cluster. An unallocated cluster reads as zeroes.
	pub fn read_file_cluster(&mut self, inr: u32, idx: u32, buf: &mut [u8]) -> Result<()> {
		log::trace!("read_file_cluster({inr}, {idx});");
		assert_eq!(buf.len(), BSLPC);
		let ino = self.read_inode(inr)?;
		match self.resolve_file_cluster(&ino, idx)? {
			Some(nclust) => {
				let addr = self.superblock.cluster_addr(nclust);
				self.file.read_at(addr, buf)?;
			}
			None => buf.fill(0u8),
		}
		Ok(())
	}

	/// Write one whole file cluster, allocating it first if absent.
	pub fn write_file_cluster(&mut self, inr: u32, idx: u32, buf: &[u8]) -> Result<()> {
		log::trace!("write_file_cluster({inr}, {idx});");
		self.assert_rw()?;
		assert_eq!(buf.len(), BSLPC);

		let mut ino = self.read_inode(inr)?;
		let nclust = match self.resolve_file_cluster(&ino, idx)? {
			Some(nclust) => nclust,
			None => self.alloc_file_cluster(&mut ino, idx)?,
		};
		let addr = self.superblock.cluster_addr(nclust);
		self.file.write_at(addr, buf)?;
		self.write_inode(inr, &ino)
	}
}
