//! # Target Memory
//!
//! The seam between the type engine and whatever can read a stopped
//! process's memory.
//!
//! The engine only ever reads through [`TargetMemory`]. Two implementations
//! ship with the crate:
//!
//! - [`MemoryImage`]: a set of mapped regions held in the debugger (snapshots, tests)
//! - [`ProcMemory`]: a traced Linux process, read through `/proc/<pid>/mem`
//!
//! Implementations must fail explicitly on unmapped ranges and must never
//! hand back zero-filled data for memory they could not read.

use std::collections::BTreeMap;

use crate::error::{TyscopeError, TyscopeResult};
use crate::types::Address;

/// Read access to a suspended target's memory.
pub trait TargetMemory: Send + Sync
{
    /// Read `len` bytes starting at `address`.
    ///
    /// ## Errors
    ///
    /// - `UnmappedMemory`: the range is not (entirely) mapped
    /// - `MemoryRead`: the tracing layer failed for another reason
    fn read_memory(&self, address: Address, len: usize) -> TyscopeResult<Vec<u8>>;
}

/// Mapped regions of target memory held in the debugger.
///
/// A read must fall entirely inside a single region.
#[derive(Debug, Clone, Default)]
pub struct MemoryImage
{
    regions: BTreeMap<u64, Vec<u8>>,
}

impl MemoryImage
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Map `bytes` at `address`, replacing any region that starts there.
    pub fn map(&mut self, address: Address, bytes: Vec<u8>)
    {
        self.regions.insert(address.value(), bytes);
    }

    /// Overwrite bytes inside an already mapped region.
    ///
    /// ## Errors
    ///
    /// `UnmappedMemory` if the range is not inside one region.
    pub fn write(&mut self, address: Address, bytes: &[u8]) -> TyscopeResult<()>
    {
        let (start, region) = self
            .regions
            .range_mut(..=address.value())
            .next_back()
            .ok_or(TyscopeError::UnmappedMemory { address, len: bytes.len() })?;
        let offset = (address.value() - *start) as usize;
        let end = offset + bytes.len();
        if end > region.len() {
            return Err(TyscopeError::UnmappedMemory { address, len: bytes.len() });
        }
        region[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Number of mapped regions.
    #[must_use]
    pub fn region_count(&self) -> usize
    {
        self.regions.len()
    }
}

impl TargetMemory for MemoryImage
{
    fn read_memory(&self, address: Address, len: usize) -> TyscopeResult<Vec<u8>>
    {
        let unmapped = || TyscopeError::UnmappedMemory { address, len };
        let (start, region) = self.regions.range(..=address.value()).next_back().ok_or_else(unmapped)?;
        let offset = usize::try_from(address.value() - *start).map_err(|_| unmapped())?;
        let end = offset.checked_add(len).ok_or_else(unmapped)?;
        region.get(offset..end).map(<[u8]>::to_vec).ok_or_else(unmapped)
    }
}

#[cfg(target_os = "linux")]
pub use self::linux::ProcMemory;

#[cfg(target_os = "linux")]
mod linux
{
    use std::fs::{self, File};
    use std::io::ErrorKind;
    use std::os::unix::fs::FileExt;

    use tracing::debug;

    use super::TargetMemory;
    use crate::error::{TyscopeError, TyscopeResult};
    use crate::types::Address;

    /// Memory of a stopped Linux process, read through `/proc/<pid>/mem`.
    ///
    /// The process must already be traced (the debugger attached with
    /// `ptrace`) and stopped; opening the memory file of a process we do
    /// not trace is refused by the kernel.
    #[derive(Debug)]
    pub struct ProcMemory
    {
        pid: u32,
        mem: File,
    }

    impl ProcMemory
    {
        /// Open the memory of a stopped process.
        ///
        /// ## Errors
        ///
        /// - `ProcessNotFound`: no such process
        /// - `NotStopped`: the process is running
        /// - `PermissionDenied`: the memory file cannot be opened
        pub fn attach(pid: u32) -> TyscopeResult<Self>
        {
            let stat = fs::read_to_string(format!("/proc/{pid}/stat")).map_err(|err| match err.kind() {
                ErrorKind::NotFound => TyscopeError::ProcessNotFound(pid),
                _ => TyscopeError::Io(err),
            })?;
            let state = process_state(&stat)
                .ok_or_else(|| TyscopeError::InvalidArgument(format!("malformed /proc/{pid}/stat")))?;
            if !matches!(state, 't' | 'T') {
                return Err(TyscopeError::NotStopped(pid));
            }

            let mem = File::open(format!("/proc/{pid}/mem")).map_err(|err| match err.kind() {
                ErrorKind::PermissionDenied => TyscopeError::PermissionDenied(format!(
                    "cannot open memory of process {pid}; attach with ptrace first"
                )),
                ErrorKind::NotFound => TyscopeError::ProcessNotFound(pid),
                _ => TyscopeError::Io(err),
            })?;
            debug!("Opened memory of stopped process {pid}");
            Ok(Self { pid, mem })
        }

        #[must_use]
        pub const fn pid(&self) -> u32
        {
            self.pid
        }
    }

    impl TargetMemory for ProcMemory
    {
        fn read_memory(&self, address: Address, len: usize) -> TyscopeResult<Vec<u8>>
        {
            read_at(&self.mem, address, len)
        }
    }

    /// Largest single read issued to the memory file.
    const READ_CHUNK: usize = 64 * 1024;

    /// Read `len` bytes at `address` of a memory file.
    ///
    /// `len` often comes from the target itself, so the buffer only grows
    /// as chunks are actually read.
    pub(super) fn read_at(file: &File, address: Address, len: usize) -> TyscopeResult<Vec<u8>>
    {
        let mut out = Vec::with_capacity(len.min(READ_CHUNK));
        let mut chunk = vec![0u8; len.min(READ_CHUNK)];
        while out.len() < len {
            let n = (len - out.len()).min(READ_CHUNK);
            let at = address
                .checked_add(out.len() as u64)
                .ok_or(TyscopeError::UnmappedMemory { address, len })?;
            file.read_exact_at(&mut chunk[..n], at.value()).map_err(|err| match err.kind() {
                ErrorKind::UnexpectedEof => TyscopeError::UnmappedMemory { address, len },
                _ => TyscopeError::MemoryRead {
                    address,
                    len,
                    details: err.to_string(),
                },
            })?;
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }

    /// State letter from a `/proc/<pid>/stat` line.
    ///
    /// The command name is parenthesized and may itself contain spaces and
    /// parentheses, so the state is found after the last `)`.
    pub(super) fn process_state(stat: &str) -> Option<char>
    {
        let rest = &stat[stat.rfind(')')? + 1..];
        rest.split_whitespace().next()?.chars().next()
    }
}
