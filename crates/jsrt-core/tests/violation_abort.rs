use anyhow::{Result, anyhow};
use assert_cmd::Command;
use jsrt_core::{BackendDescriptor, FactoryHost, RuntimeFactory, ViolationPolicy};
use jsrt_engine::JsEngine;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::env;
use std::io;

const CHILD_ENV: &str = "JSRT_VIOLATION_CHILD";
const TEST_NAME: &str = "double_release_aborts_under_abort_policy";

struct Solo;

impl RuntimeFactory for Solo {
    fn backend_id(&self) -> &str {
        "solo"
    }

    fn create_engine(&self) -> Result<Box<dyn JsEngine>> {
        Err(anyhow!("solo builds no engines"))
    }
}

fn solo() -> Result<Box<dyn RuntimeFactory>> {
    Ok(Box::new(Solo))
}

fn release_twice_under_abort() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(false)
        .try_init();

    let host = FactoryHost::with_policy(ViolationPolicy::Abort);
    host.register(BackendDescriptor::native("solo", solo).expect("valid id"))
        .expect("register solo");
    let handle = host.create("solo").expect("solo constructs");
    host.release(handle).expect("first release");
    let _ = host.release(handle);
    panic!("second release returned instead of aborting");
}

// Aborting kills the process, so the double release runs in a re-executed
// copy of this test binary.
#[test]
fn double_release_aborts_under_abort_policy() {
    if env::var_os(CHILD_ENV).is_some() {
        release_twice_under_abort();
        return;
    }

    let exe = env::current_exe().expect("test binary path");
    let assert = Command::new(exe)
        .args([TEST_NAME, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .assert()
        .failure()
        .stderr(contains("aborting on factory handle contract violation"))
        .stderr(contains("second release returned").not());

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(assert.get_output().status.signal(), Some(6));
    }
}
