use crate::status_code;
use jsrt_core::FactoryError;
use std::cell::RefCell;
use std::ffi::c_char;
use std::ptr;

thread_local! {
    static LAST_ERROR: RefCell<Option<(i32, String)>> = const { RefCell::new(None) };
}

pub(crate) fn record(err: &FactoryError) {
    set(status_code(err), &err.to_string());
}

pub(crate) fn set(code: i32, message: &str) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some((code, message.replace('\0', " "))));
}

pub(crate) fn clear() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

pub(crate) fn code() -> i32 {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map_or(crate::JSRT_OK, |(code, _)| *code))
}

pub(crate) fn message() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().as_ref().map(|(_, message)| message.clone()))
}

/// Copies `text` into a caller buffer as a NUL-terminated, possibly truncated string.
/// Returns the untruncated length in bytes, excluding the terminator.
///
/// # Safety
/// `buf` must be null or valid for writes of `len` bytes.
pub(crate) unsafe fn copy_out(text: &str, buf: *mut c_char, len: usize) -> usize {
    if !buf.is_null() && len > 0 {
        let count = text.len().min(len - 1);
        // SAFETY: the caller guarantees `buf` holds `len` bytes and count < len.
        unsafe {
            ptr::copy_nonoverlapping(text.as_ptr().cast::<c_char>(), buf, count);
            *buf.add(count) = 0;
        }
    }
    text.len()
}

#[cfg(test)]
mod tests {
    use super::{clear, code, copy_out, message, set};
    use std::ffi::{CStr, c_char};

    #[test]
    fn last_error_is_per_thread() {
        set(-1, "boom");
        assert_eq!(code(), -1);
        std::thread::spawn(|| assert_eq!(code(), crate::JSRT_OK))
            .join()
            .expect("thread should not panic");
        clear();
        assert_eq!(message(), None);
    }

    #[test]
    fn copy_out_truncates_and_terminates() {
        let mut buf = [1 as c_char; 5];
        let full = unsafe { copy_out("abcdefgh", buf.as_mut_ptr(), buf.len()) };
        assert_eq!(full, 8);
        let copied = unsafe { CStr::from_ptr(buf.as_ptr()) };
        assert_eq!(copied.to_str().expect("utf8"), "abcd");

        assert_eq!(unsafe { copy_out("abc", std::ptr::null_mut(), 0) }, 3);
    }

    #[test]
    fn interior_nul_is_replaced() {
        set(-3, "bad\0news");
        assert_eq!(message().as_deref(), Some("bad news"));
        clear();
    }
}
