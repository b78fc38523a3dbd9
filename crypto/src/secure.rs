//! Storage for key material: pinned in physical memory while alive and
//! overwritten with zeros before it is released.
//!
//! `mlock` works on whole pages and does not nest, so every secret owns its
//! pages outright. Releasing one secret never unpins another.

use std::alloc::{self, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::slice;

use log::debug;
use zeroize::Zeroize;

use super::CipherError;

const FALLBACK_PAGE_SIZE: usize = 4096;

/// Asks the OS to keep `len` bytes at `ptr` out of swap.
/// Returns false when nothing was locked.
pub fn lock_region(ptr: *const u8, len: usize) -> bool {
    if ptr.is_null() || len == 0 {
        return false;
    }

    match sys_lock(ptr, len) {
        Ok(()) => true,
        Err(e) => {
            debug!("mlock of {} bytes failed: {}", len, e);
            false
        }
    }
}

pub fn unlock_region(ptr: *const u8, len: usize) {
    if ptr.is_null() || len == 0 {
        return;
    }

    if let Err(e) = sys_unlock(ptr, len) {
        debug!("munlock of {} bytes failed: {}", len, e);
    }
}

#[cfg(unix)]
pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        n if n > 0 => n as usize,
        _ => FALLBACK_PAGE_SIZE,
    }
}

#[cfg(not(unix))]
pub fn page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

#[cfg(unix)]
fn sys_lock(ptr: *const u8, len: usize) -> std::io::Result<()> {
    // SAFETY: callers pass a live allocation of at least `len` bytes.
    match unsafe { libc::mlock(ptr.cast::<libc::c_void>(), len) } {
        0 => Ok(()),
        _ => Err(std::io::Error::last_os_error()),
    }
}

#[cfg(unix)]
fn sys_unlock(ptr: *const u8, len: usize) -> std::io::Result<()> {
    // SAFETY: same region that was handed to sys_lock.
    match unsafe { libc::munlock(ptr.cast::<libc::c_void>(), len) } {
        0 => Ok(()),
        _ => Err(std::io::Error::last_os_error()),
    }
}

#[cfg(not(unix))]
fn sys_lock(_ptr: *const u8, _len: usize) -> std::io::Result<()> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "memory locking unsupported"))
}

#[cfg(not(unix))]
fn sys_unlock(_ptr: *const u8, _len: usize) -> std::io::Result<()> {
    Ok(())
}

/// Zeroed, page-aligned allocation spanning whole pages.
struct Pages {
    ptr: NonNull<u8>,
    layout: Layout,
    locked: bool,
}

// SAFETY: Pages uniquely owns its allocation; shared access is read-only.
unsafe impl Send for Pages {}
unsafe impl Sync for Pages {}

impl Pages {
    fn alloc(len: usize, align: usize) -> Result<Pages, CipherError> {
        let page = page_size();

        let size = len
            .max(1)
            .checked_add(page - 1)
            .map(|n| n / page * page)
            .ok_or(CipherError::AllocationFailed)?;

        let layout = Layout::from_size_align(size, page.max(align)).map_err(|_| {
            debug!("no page layout for {} bytes", len);
            CipherError::AllocationFailed
        })?;

        // SAFETY: layout has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or_else(|| {
            debug!("allocation of {} bytes failed", size);
            CipherError::AllocationFailed
        })?;

        let locked = lock_region(ptr.as_ptr(), size);

        Ok(Pages { ptr, layout, locked })
    }

    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for Pages {
    fn drop(&mut self) {
        // SAFETY: the allocation is live and `size()` bytes long until dealloc.
        unsafe { slice::from_raw_parts_mut(self.as_ptr(), self.size()) }.zeroize();

        if self.locked {
            unlock_region(self.as_ptr(), self.size());
        }

        // SAFETY: allocated in `Pages::alloc` with this exact layout.
        unsafe { alloc::dealloc(self.as_ptr(), self.layout) };
    }
}

/// Owned secret byte buffer.
pub struct SecretBytes {
    pages: Option<Pages>,
    len: usize,
}

impl SecretBytes {
    pub fn new(src: &[u8]) -> Result<SecretBytes, CipherError> {
        if src.is_empty() {
            return Ok(SecretBytes::empty());
        }

        let pages = Pages::alloc(src.len(), 1)?;
        // SAFETY: the fresh allocation holds at least `src.len()` bytes.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), pages.as_ptr(), src.len()) };

        Ok(SecretBytes { pages: Some(pages), len: src.len() })
    }

    pub fn empty() -> SecretBytes {
        SecretBytes { pages: None, len: 0 }
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.pages {
            // SAFETY: the first `len` bytes were initialized in `new`.
            Some(p) => unsafe { slice::from_raw_parts(p.as_ptr(), self.len) },
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_locked(&self) -> bool {
        self.pages.as_ref().map_or(false, |p| p.locked)
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBytes({} bytes, ***)", self.len)
    }
}

/// Page-pinned secret value, zeroized on drop.
///
/// Built from `T::default()` so secret contents are only ever written in place.
pub struct Locked<T: Zeroize> {
    pages: Pages,
    _value: PhantomData<T>,
}

impl<T: Zeroize + Default> Locked<T> {
    pub fn new() -> Result<Locked<T>, CipherError> {
        let pages = Pages::alloc(mem::size_of::<T>(), mem::align_of::<T>())?;
        // SAFETY: the allocation is large enough and aligned for T.
        unsafe { ptr::write(pages.as_ptr().cast::<T>(), T::default()) };

        Ok(Locked { pages, _value: PhantomData })
    }
}

impl<T: Zeroize> Locked<T> {
    pub fn is_locked(&self) -> bool {
        self.pages.locked
    }
}

impl<T: Zeroize> Deref for Locked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a T was written in `new` and lives until drop.
        unsafe { &*self.pages.as_ptr().cast::<T>() }
    }
}

impl<T: Zeroize> DerefMut for Locked<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in `deref`; `&mut self` gives exclusive access.
        unsafe { &mut *self.pages.as_ptr().cast::<T>() }
    }
}

impl<T: Zeroize> Drop for Locked<T> {
    fn drop(&mut self) {
        self.deref_mut().zeroize();
        // SAFETY: the value is dropped exactly once; Pages frees the memory afterwards.
        unsafe { ptr::drop_in_place(self.pages.as_ptr().cast::<T>()) };
    }
}

impl<T: Zeroize> fmt::Debug for Locked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Locked(***)")
    }
}
