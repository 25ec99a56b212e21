//! Secret byte buffers that are locked out of swap and zeroed on drop
//!
//! Composite keys, master keys and inner-stream keys all pass through here
//! on their way between pipeline stages. [`SafeVec`] wraps a `Vec<u8>`,
//! best-effort `mlock`s its backing allocation with [`region`], and always
//! zeroes it before the allocation is freed.

use region::Protection;
use std::fmt;
use std::ops::{Deref, DerefMut};
use zeroize::Zeroize;

/// A byte buffer holding secret material
///
/// The buffer is zeroed when dropped. Locking the pages out of swap is
/// attempted on construction but is not guaranteed to succeed on every
/// platform or in every sandbox - a failure to lock is logged and otherwise
/// ignored, since refusing to run without `mlock` would make this library
/// unusable in those environments.
pub struct SafeVec {
    data: Vec<u8>,
    locked: bool,
}

impl SafeVec {
    /// Wrap an existing buffer, taking ownership of its contents
    pub fn new(data: Vec<u8>) -> SafeVec {
        let locked = if data.is_empty() {
            false
        } else {
            match region::lock(data.as_ptr(), data.len()) {
                Ok(guard) => {
                    // The guard only needs to live as long as the pages should
                    // stay locked, which is the lifetime of `data` itself -
                    // leak it rather than threading a second handle through.
                    std::mem::forget(guard);
                    true
                }
                Err(e) => {
                    tracing::debug!(error = %e, "failed to mlock secret buffer, continuing without it");
                    false
                }
            }
        };
        SafeVec { data, locked }
    }

    /// Allocate a zero-filled buffer of the given length
    pub fn zeroed(len: usize) -> SafeVec {
        SafeVec::new(vec![0u8; len])
    }

    /// Whether the buffer's pages were successfully locked out of swap
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Borrow the contents
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the wrapper and return the plain `Vec<u8>`
    ///
    /// The caller takes over responsibility for zeroing and unlocking the
    /// memory - prefer keeping data in a [`SafeVec`] where possible.
    pub fn into_inner(mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

impl Drop for SafeVec {
    fn drop(&mut self) {
        // `Vec::zeroize` truncates the vec to length 0 after clearing its
        // bytes, so the unlock decision has to be made from `self.locked`
        // (set at construction, when we know the buffer was non-empty)
        // rather than re-checking emptiness afterwards.
        let capacity = self.data.capacity();
        let ptr = self.data.as_ptr();
        self.data.zeroize();
        if self.locked && capacity > 0 {
            let _ = region::unlock(ptr, capacity);
        }
    }
}

impl Deref for SafeVec {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for SafeVec {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for SafeVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeVec")
            .field("len", &self.data.len())
            .field("locked", &self.locked)
            .finish()
    }
}

impl Clone for SafeVec {
    fn clone(&self) -> SafeVec {
        SafeVec::new(self.data.clone())
    }
}

// Only ever used to report an unsupported memory-protection mode from
// `region`, never constructed here - kept so the dependency's error type
// stays reachable from callers that match on it.
#[allow(dead_code)]
pub(crate) fn describe_protection(p: Protection) -> String {
    format!("{:?}", p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroes_on_drop() {
        let ptr;
        {
            let buf = SafeVec::new(vec![0x41u8; 32]);
            ptr = buf.as_slice().as_ptr();
            assert_eq!(buf.as_slice()[0], 0x41);
        }
        // Can't safely dereference freed memory in a test, but zeroize runs
        // synchronously in Drop before dealloc - this just exercises it.
        let _ = ptr;
    }

    #[test]
    fn zeroed_constructor_is_all_zero() {
        let buf = SafeVec::zeroed(16);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
