use std::{fmt, io};

/// The error taxonomy of the engine.
///
/// Only the capacity and input-validation kinds are expected at the API
/// boundary; the consistency and block-I/O kinds are fatal to the current
/// operation and leave the volume in need of a check.
#[derive(Debug)]
pub enum Error {
	/* input validation */
	BadArgument,
	NameTooLong,
	RelativePath,
	NotDirectory,
	IsDirectory,
	Loop,

	/* lookup */
	NoEntry,
	AlreadyExists,

	/* permission */
	AccessDenied,
	NotPermitted,

	/* capacity */
	NoSpace,
	FileTooBig,
	MaxLinks,
	NotEmpty,

	/* internal consistency (fatal) */
	SuperBlockHeaderInvalid,
	InodeTableInvalid,
	FreeInodeListInvalid,
	FreeInodeInvalid,
	InodeInUseInvalid,
	DataZoneInvalid,
	FreeCacheInvalid,
	FctInvalid,
	InodeRefListInvalid,
	ClusterNotAllocated,
	DirInvalid,
	DirEntryInvalid,
	AlreadyInList,
	NotInList,
	LibraryBad,

	/* block I/O */
	DeviceNotOpen,
	BadSeek,
	Io(io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
	/// Whether the error signals internal corruption rather than a rejected
	/// request.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			Self::SuperBlockHeaderInvalid |
				Self::InodeTableInvalid |
				Self::FreeInodeListInvalid |
				Self::FreeInodeInvalid |
				Self::InodeInUseInvalid |
				Self::DataZoneInvalid |
				Self::FreeCacheInvalid |
				Self::FctInvalid |
				Self::InodeRefListInvalid |
				Self::ClusterNotAllocated |
				Self::DirInvalid |
				Self::DirEntryInvalid |
				Self::AlreadyInList |
				Self::NotInList |
				Self::LibraryBad |
				Self::DeviceNotOpen |
				Self::BadSeek |
				Self::Io(_)
		)
	}

	/// The closest errno, for syscall-style callers.
	pub fn errno(&self) -> i32 {
		match self {
			Self::BadArgument | Self::RelativePath => libc::EINVAL,
			Self::NameTooLong => libc::ENAMETOOLONG,
			Self::NotDirectory => libc::ENOTDIR,
			Self::IsDirectory => libc::EISDIR,
			Self::Loop => libc::ELOOP,
			Self::NoEntry => libc::ENOENT,
			Self::AlreadyExists => libc::EEXIST,
			Self::AccessDenied => libc::EACCES,
			Self::NotPermitted => libc::EPERM,
			Self::NoSpace => libc::ENOSPC,
			Self::FileTooBig => libc::EFBIG,
			Self::MaxLinks => libc::EMLINK,
			Self::NotEmpty => libc::ENOTEMPTY,
			Self::DeviceNotOpen => libc::EBADF,
			Self::BadSeek => libc::ESPIPE,
			Self::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
			_ => libc::EIO,
		}
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let msg = match self {
			Self::BadArgument => "invalid argument",
			Self::NameTooLong => "name too long",
			Self::RelativePath => "path is not absolute",
			Self::NotDirectory => "not a directory",
			Self::IsDirectory => "is a directory",
			Self::Loop => "too many symbolic links",
			Self::NoEntry => "no such entry",
			Self::AlreadyExists => "entry already exists",
			Self::AccessDenied => "access denied",
			Self::NotPermitted => "operation not permitted",
			Self::NoSpace => "no free space",
			Self::FileTooBig => "file too big",
			Self::MaxLinks => "maximum link count reached",
			Self::NotEmpty => "directory not empty",
			Self::SuperBlockHeaderInvalid => "superblock header is inconsistent",
			Self::InodeTableInvalid => "inode table metadata is inconsistent",
			Self::FreeInodeListInvalid => "free inode list is inconsistent",
			Self::FreeInodeInvalid => "free inode is inconsistent",
			Self::InodeInUseInvalid => "inode in use is inconsistent",
			Self::DataZoneInvalid => "data zone metadata is inconsistent",
			Self::FreeCacheInvalid => "free cluster caches are inconsistent",
			Self::FctInvalid => "free cluster table is inconsistent",
			Self::InodeRefListInvalid => "inode cluster references are inconsistent",
			Self::ClusterNotAllocated => "data cluster is not allocated",
			Self::DirInvalid => "directory is inconsistent",
			Self::DirEntryInvalid => "directory entry is inconsistent",
			Self::AlreadyInList => "data cluster already referenced at that index",
			Self::NotInList => "no data cluster referenced at that index",
			Self::LibraryBad => "internal storage is inconsistent",
			Self::DeviceNotOpen => "device is not open",
			Self::BadSeek => "bad seek on the device",
			Self::Io(e) => return write!(f, "device I/O failed: {e}"),
		};
		f.write_str(msg)
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Self::Io(e)
	}
}
