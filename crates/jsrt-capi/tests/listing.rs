use jsrt_capi::{jsrt_backend_count, jsrt_backend_name};
use std::ffi::{CStr, c_char};
use std::ptr;

fn backend_name(index: usize) -> Option<String> {
    let mut buf = [0 as c_char; 65];
    let len = unsafe { jsrt_backend_name(index, buf.as_mut_ptr(), buf.len()) };
    if len == 0 {
        return None;
    }
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Some(name.to_string_lossy().into_owned())
}

#[test]
fn builtins_self_register_in_sorted_order() {
    assert_eq!(jsrt_backend_count(), 2);
    let names: Vec<String> = (0..jsrt_backend_count()).filter_map(backend_name).collect();
    assert_eq!(names, vec!["boa".to_string(), "v8".to_string()]);

    assert_eq!(backend_name(2), None);
    assert_eq!(unsafe { jsrt_backend_name(0, ptr::null_mut(), 0) }, "boa".len());
}
