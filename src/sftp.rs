//! SFTP file and directory handles
//!
//! Wraps the per-file/dir objects the engine's SFTP subsystem hands out.
//! Same ownership model as channels: the engine handle is an
//! `Option<Box<dyn EngineFile>>`, present exactly while active, taken once
//! on close.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, EngineFile};
use crate::error::{Error, Result};

/// Fixed per-handle read buffer size.
const READ_BUF_LEN: usize = 4096;

/// Remote file attribute record.
///
/// Field names are a boundary contract: host-side consumers read exactly
/// `{flags, filesize, uid, gid, perm, atime, mtime}`. Do not rename.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub flags: u32,
    pub filesize: u64,
    pub uid: u32,
    pub gid: u32,
    pub perm: u32,
    pub atime: u64,
    pub mtime: u64,
}

/// Remote filesystem statistics (statvfs shape).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsStats {
    pub bsize: u64,
    pub frsize: u64,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub favail: u64,
    pub fsid: u64,
    pub flag: u64,
    pub namemax: u64,
}

/// One directory entry from [`SftpHandle::readdir`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub attrs: FileAttributes,
}

/// Handle to one remote file or directory.
pub struct SftpHandle {
    file: Option<Box<dyn EngineFile>>,
    buffer: Box<[u8; READ_BUF_LEN]>,
    /// Local copy of the remote attributes, refreshed by stat calls and
    /// editable in place before `fsetstat`/`fstat(true)` pushes it back.
    attrs: FileAttributes,
    stats: FsStats,
}

impl SftpHandle {
    pub(crate) fn new(file: Box<dyn EngineFile>) -> Self {
        Self {
            file: Some(file),
            buffer: Box::new([0u8; READ_BUF_LEN]),
            attrs: FileAttributes::default(),
            stats: FsStats::default(),
        }
    }

    pub(crate) fn inactive() -> Self {
        Self {
            file: None,
            buffer: Box::new([0u8; READ_BUF_LEN]),
            attrs: FileAttributes::default(),
            stats: FsStats::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.file.is_some()
    }

    /// The locally held attribute record, as last refreshed.
    pub fn attrs(&self) -> &FileAttributes {
        &self.attrs
    }

    /// Edit the local attribute record before pushing it remote with
    /// [`fsetstat`](Self::fsetstat) or [`fstat`](Self::fstat)`(true)`.
    pub fn attrs_mut(&mut self) -> &mut FileAttributes {
        &mut self.attrs
    }

    fn engine(&mut self) -> Result<&mut Box<dyn EngineFile>> {
        self.file.as_mut().ok_or(Error::NotActive)
    }

    /// Read up to one buffer from the current offset.
    pub fn read(&mut self) -> Result<Bytes> {
        let file = self.file.as_mut().ok_or(Error::NotActive)?;
        match file.read(&mut self.buffer[..]) {
            Ok(0) | Err(EngineError::WouldBlock) => Err(Error::WouldBlock),
            Ok(n) => Ok(Bytes::copy_from_slice(&self.buffer[..n])),
            Err(e) => Err(e.into()),
        }
    }

    /// Write at the current offset. Returns bytes accepted.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        Ok(self.engine()?.write(data)?)
    }

    /// Next directory entry; `Ok(None)` once the listing is exhausted.
    ///
    /// Each returned entry also refreshes the local attribute record.
    pub fn readdir(&mut self) -> Result<Option<DirEntry>> {
        match self.engine()?.readdir()? {
            Some((name, attrs)) => {
                self.attrs = attrs.clone();
                Ok(Some(DirEntry { name, attrs }))
            }
            None => Ok(None),
        }
    }

    pub fn seek(&mut self, offset: usize) -> Result<()> {
        self.engine()?.seek(offset as u64);
        Ok(())
    }

    pub fn seek64(&mut self, offset: u64) -> Result<()> {
        self.engine()?.seek(offset);
        Ok(())
    }

    pub fn tell(&mut self) -> Result<usize> {
        Ok(self.engine()?.tell() as usize)
    }

    pub fn tell64(&mut self) -> Result<u64> {
        Ok(self.engine()?.tell())
    }

    /// Reset the offset to the start of the file.
    pub fn rewind(&mut self) -> Result<()> {
        self.engine()?.seek(0);
        Ok(())
    }

    /// Refresh the local attribute record from the remote side.
    ///
    /// With `setstat` set, the locally edited record is pushed to the
    /// remote side first, then re-read.
    pub fn fstat(&mut self, setstat: bool) -> Result<FileAttributes> {
        if setstat {
            let attrs = self.attrs.clone();
            self.engine()?.fsetstat(&attrs)?;
        }
        self.attrs = self.engine()?.fstat()?;
        Ok(self.attrs.clone())
    }

    /// Push the locally edited attribute record to the remote side.
    pub fn fsetstat(&mut self) -> Result<FileAttributes> {
        let attrs = self.attrs.clone();
        self.engine()?.fsetstat(&attrs)?;
        Ok(attrs)
    }

    /// Remote filesystem statistics for the mounted volume.
    pub fn fstatvfs(&mut self) -> Result<FsStats> {
        self.stats = self.engine()?.fstatvfs()?;
        Ok(self.stats.clone())
    }

    /// Ask the server to flush the file to stable storage.
    pub fn fsync(&mut self) -> Result<()> {
        Ok(self.engine()?.fsync()?)
    }

    /// Close the handle and release the engine object. A second call
    /// reports `NotActive`; the handle never reactivates.
    pub fn close(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or(Error::NotActive)?;
        match file.close() {
            Ok(()) => {
                self.file = None;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Directory-handle spelling of [`close`](Self::close).
    pub fn closedir(&mut self) -> Result<()> {
        self.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{MockFile, MockState, SharedMock};

    fn active_handle(state: &SharedMock) -> SftpHandle {
        SftpHandle::new(MockFile::boxed(state.clone()))
    }

    #[test]
    fn inactive_handle_gates_every_operation() {
        let state = MockState::new();
        let mut handle = SftpHandle::inactive();

        assert!(handle.read().unwrap_err() == Error::NotActive);
        assert_eq!(handle.write(b"x").unwrap_err(), Error::NotActive);
        assert_eq!(handle.readdir().unwrap_err(), Error::NotActive);
        assert_eq!(handle.seek(0), Err(Error::NotActive));
        assert_eq!(handle.seek64(0), Err(Error::NotActive));
        assert_eq!(handle.tell().unwrap_err(), Error::NotActive);
        assert_eq!(handle.tell64().unwrap_err(), Error::NotActive);
        assert_eq!(handle.rewind(), Err(Error::NotActive));
        assert_eq!(handle.fstat(false).unwrap_err(), Error::NotActive);
        assert_eq!(handle.fsetstat().unwrap_err(), Error::NotActive);
        assert_eq!(handle.fstatvfs().unwrap_err(), Error::NotActive);
        assert_eq!(handle.fsync(), Err(Error::NotActive));
        assert_eq!(handle.close(), Err(Error::NotActive));
        assert_eq!(handle.closedir(), Err(Error::NotActive));

        assert!(state.borrow().ops.is_empty());
    }

    #[test]
    fn write_seek_read_round_trips_through_the_engine() {
        let state = MockState::new();
        let mut handle = active_handle(&state);

        assert_eq!(handle.write(b"remote file body").unwrap(), 16);
        assert_eq!(handle.tell().unwrap(), 16);

        handle.rewind().unwrap();
        assert_eq!(handle.read().unwrap().as_ref(), b"remote file body");

        handle.seek(7).unwrap();
        assert_eq!(handle.read().unwrap().as_ref(), b"file body");

        handle.seek64(16).unwrap();
        assert!(handle.read().unwrap_err().is_would_block());
    }

    #[test]
    fn readdir_yields_one_entry_per_call_until_exhausted() {
        let state = MockState::new();
        {
            let mut state = state.borrow_mut();
            let attrs = FileAttributes {
                perm: 0o644,
                filesize: 12,
                ..Default::default()
            };
            state.entries.push_back((".".into(), FileAttributes::default()));
            state.entries.push_back(("notes.txt".into(), attrs));
        }
        let mut handle = active_handle(&state);

        assert_eq!(handle.readdir().unwrap().unwrap().name, ".");
        let entry = handle.readdir().unwrap().unwrap();
        assert_eq!(entry.name, "notes.txt");
        assert_eq!(entry.attrs.perm, 0o644);
        // Exhaustion is not an error.
        assert_eq!(handle.readdir().unwrap(), None);
        // The last entry's attributes stick to the handle.
        assert_eq!(handle.attrs().filesize, 12);

        handle.closedir().unwrap();
        assert_eq!(handle.readdir().unwrap_err(), Error::NotActive);
    }

    #[test]
    fn fstat_with_setstat_pushes_local_edits_first() {
        let state = MockState::new();
        let mut handle = active_handle(&state);
        handle.write(b"1234").unwrap();

        handle.attrs_mut().perm = 0o600;
        let attrs = handle.fstat(true).unwrap();

        assert_eq!(attrs.perm, 0o600);
        assert_eq!(attrs.filesize, 4);
        assert!(state.borrow().ops.iter().any(|op| op == "fsetstat"));
        // Remote side saw the edited record.
        assert_eq!(state.borrow().attrs.perm, 0o600);
    }

    #[test]
    fn fstatvfs_surfaces_engine_statistics() {
        let state = MockState::new();
        state.borrow_mut().stats = FsStats {
            bsize: 4096,
            blocks: 1000,
            bfree: 250,
            ..Default::default()
        };
        let mut handle = active_handle(&state);

        let stats = handle.fstatvfs().unwrap();
        assert_eq!(stats.bsize, 4096);
        assert_eq!(stats.bfree, 250);
    }

    #[test]
    fn close_is_gated_on_second_call() {
        let state = MockState::new();
        let mut handle = active_handle(&state);
        handle.close().unwrap();
        assert!(!handle.is_active());
        assert_eq!(handle.close(), Err(Error::NotActive));
    }

    #[test]
    fn attribute_record_wire_shape_is_pinned() {
        let attrs = FileAttributes {
            flags: 15,
            filesize: 1024,
            uid: 1000,
            gid: 1000,
            perm: 0o755,
            atime: 1_700_000_000,
            mtime: 1_700_000_001,
        };
        // Exact field names and order host consumers depend on.
        assert_eq!(
            serde_json::to_string(&attrs).unwrap(),
            r#"{"flags":15,"filesize":1024,"uid":1000,"gid":1000,"perm":493,"atime":1700000000,"mtime":1700000001}"#
        );
    }
}
