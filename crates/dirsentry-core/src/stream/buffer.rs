//! Kernel-side state for one change stream.
//!
//! A `ChangeBuffer` owns the directory handle opened for overlapped
//! list-directory access, the receive buffer the kernel fills, and the
//! event-backed OVERLAPPED used to poll for completion. Everything is
//! released on drop, including the path where a read is still in flight.

use std::ffi::c_void;
use std::io;
use tracing::warn;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, ReadDirectoryChangesW, FILE_FLAGS_AND_ATTRIBUTES, FILE_FLAG_BACKUP_SEMANTICS,
    FILE_FLAG_OVERLAPPED, FILE_LIST_DIRECTORY, FILE_NOTIFY_CHANGE_FLAGS, FILE_SHARE_DELETE,
    FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::Threading::{CreateEventW, ResetEvent, WaitForSingleObject};
use windows::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};

/// `ReadDirectoryChangesW` rejects buffers larger than 64 KiB.
pub(crate) const MAX_BUFFER_BYTES: usize = 64 * 1024;

/// Outcome of polling a stream for a queued completion.
pub(crate) enum Completion {
    /// Nothing has completed yet.
    Pending,
    /// The kernel delivered zero bytes: its internal queue overflowed and
    /// the backlog was discarded.
    Overflow,
    /// A batch of packed change records, cloned out of the receive buffer.
    Data(Vec<u8>),
    /// The read failed outright. Handle invalidated or root deleted.
    Broken,
}

pub(crate) struct ChangeBuffer {
    handle: HANDLE,
    io_event: HANDLE,
    /// Heap-pinned so its address stays stable while a read is in flight.
    overlapped: Box<OVERLAPPED>,
    buffer: Vec<u8>,
    pending: bool,
}

// SAFETY: the directory and event handles are process-wide kernel object
// handles usable from any thread, and the OVERLAPPED region is heap-pinned
// and only written by the kernel while `pending` is set. The dispatcher
// serialises all access to the struct itself.
unsafe impl Send for ChangeBuffer {}

impl ChangeBuffer {
    /// Open `root` for asynchronous change monitoring.
    ///
    /// Sharing flags leave other processes free to read, write and delete
    /// underneath the watch; backup semantics are required to open a
    /// directory handle at all.
    pub fn open(root: &str, buffer_bytes: usize) -> io::Result<Self> {
        let wide: Vec<u16> = root.encode_utf16().chain(std::iter::once(0u16)).collect();

        let handle: HANDLE = unsafe {
            CreateFileW(
                PCWSTR(wide.as_ptr()),
                FILE_LIST_DIRECTORY.0,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                None,
                OPEN_EXISTING,
                FILE_FLAGS_AND_ATTRIBUTES(FILE_FLAG_BACKUP_SEMANTICS.0 | FILE_FLAG_OVERLAPPED.0),
                None,
            )
        }
        .map_err(io::Error::other)?;

        // Manual-reset event the OVERLAPPED completion signals.
        let io_event: HANDLE = match unsafe { CreateEventW(None, true, false, None) } {
            Ok(event) => event,
            Err(e) => {
                unsafe {
                    let _ = CloseHandle(handle);
                }
                return Err(io::Error::other(e));
            }
        };

        let len = buffer_bytes.clamp(1, MAX_BUFFER_BYTES);
        Ok(Self {
            handle,
            io_event,
            overlapped: Box::new(OVERLAPPED::default()),
            buffer: vec![0u8; len],
            pending: false,
        })
    }

    /// Post the next asynchronous read. Only call with no read in flight.
    pub fn issue(&mut self, recursive: bool, filter: FILE_NOTIFY_CHANGE_FLAGS) -> io::Result<()> {
        *self.overlapped = OVERLAPPED::default();
        self.overlapped.hEvent = self.io_event;

        unsafe {
            ResetEvent(self.io_event).map_err(io::Error::other)?;
            ReadDirectoryChangesW(
                self.handle,
                self.buffer.as_mut_ptr() as *mut c_void,
                self.buffer.len() as u32,
                recursive,
                filter,
                None,
                Some(&mut *self.overlapped),
                None,
            )
            .map_err(io::Error::other)?;
        }

        self.pending = true;
        Ok(())
    }

    /// Check whether the posted read completed, waiting up to `timeout_ms`.
    ///
    /// On data the batch is cloned out so the receive buffer can be
    /// re-armed before the caller parses anything.
    pub fn poll(&mut self, timeout_ms: u32) -> Completion {
        if !self.pending {
            return Completion::Broken;
        }

        let wait = unsafe { WaitForSingleObject(self.io_event, timeout_ms) };
        if wait == WAIT_TIMEOUT {
            return Completion::Pending;
        }
        if wait != WAIT_OBJECT_0 {
            warn!("unexpected wait result while polling a change stream");
            self.pending = false;
            return Completion::Broken;
        }

        self.pending = false;
        let mut transferred = 0u32;
        let result =
            unsafe { GetOverlappedResult(self.handle, &*self.overlapped, &mut transferred, false) };

        match result {
            Err(_) => Completion::Broken,
            Ok(()) if transferred == 0 => Completion::Overflow,
            Ok(()) => {
                let len = (transferred as usize).min(self.buffer.len());
                Completion::Data(self.buffer[..len].to_vec())
            }
        }
    }
}

impl Drop for ChangeBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.pending {
                let _ = CancelIoEx(self.handle, Some(&*self.overlapped));
                // Let the cancellation settle so the kernel is done with
                // the OVERLAPPED and buffer before they are freed.
                let _ = WaitForSingleObject(self.io_event, 5_000);
            }
            let _ = CloseHandle(self.io_event);
            let _ = CloseHandle(self.handle);
        }
    }
}
