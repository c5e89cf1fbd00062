//! Directory operations

use std::io;

use super::ChangeSet;
use crate::error::OpError;
use crate::fs::in_writable_dir;
use crate::types::FileInfo;

// Mode bits kept from an existing directory when re-applying permissions
const RETAIN_BITS: u32 = 0o7000; // setuid, setgid, sticky

impl ChangeSet {
	/// Create a directory, or adjust the permissions of an existing one.
	pub fn write_dir(&self, d: &FileInfo) -> Result<(), OpError> {
		let real_path = self.real_path(&d.name)?;

		let mut mode = d.permissions();
		if d.ignores_permissions() {
			// Permissions are not tracked; fall back to a permissive
			// default for the umask to narrow
			mode = 0o777;
		}

		// An existing directory only needs its permissions brought in line
		if let Ok(info) = self.fs.lstat(&real_path) {
			if info.is_dir {
				if !d.ignores_permissions() {
					mode |= info.mode & RETAIN_BITS;
					if let Err(err) = self.fs.chmod(&real_path, mode) {
						return Err(OpError::new(&d.name, "write dir chmod", err));
					}
				}
				return Ok(());
			}
		}

		let mut result = self.fs.mkdir_all(&real_path, mode);
		if let Err(err) = &result {
			if err.kind() == io::ErrorKind::PermissionDenied {
				// Creating "foo/bar" fails when "foo" is read only; retry
				// with the parent temporarily writable. Still fails for
				// deeper missing hierarchies under a read-only ancestor,
				// which should be rare.
				result =
					in_writable_dir(self.fs.as_ref(), |p| self.fs.mkdir_all(p, mode), &real_path);
			}
		}

		if result.is_ok() {
			// mkdir_all honors the umask and skips pre-existing
			// intermediates, so apply the mode explicitly
			result = self.fs.chmod(&real_path, mode);
		}

		result.map_err(|err| OpError::new(&d.name, "write dir mkdir", err))
	}

	/// Delete a directory. A path that cannot be stat'ed counts as
	/// already deleted.
	pub fn delete_dir(&self, d: &FileInfo) -> Result<(), OpError> {
		let real_path = self.real_path(&d.name)?;
		if self.fs.lstat(&real_path).is_err() {
			return Ok(());
		}

		in_writable_dir(self.fs.as_ref(), |p| self.fs.remove(p), &real_path)
			.map_err(|err| OpError::new(&d.name, "delete dir remove", err))
	}
}

// vim: ts=4
