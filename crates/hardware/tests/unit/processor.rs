//! Reorder window and trace reader behavior.

use std::io::Write as _;

use proptest::prelude::*;
use tempfile::NamedTempFile;

use memsim_core::processor::trace::{Trace, TraceError};
use memsim_core::processor::{Window, WINDOW_DEPTH, WINDOW_IPC};
use memsim_core::request::RequestKind;

const BLOCK_MASK: i64 = !63;

// ══════════════════════════════════════════════════════════
// 1. Window bounds
// ══════════════════════════════════════════════════════════

#[test]
fn retire_never_exceeds_ipc() {
    let mut w = Window::new();
    for _ in 0..10 {
        w.insert(true, -1);
    }
    assert_eq!(w.retire(), WINDOW_IPC as i64);
    assert_eq!(w.load(), 6);
}

#[test]
fn retire_stops_at_first_unready() {
    let mut w = Window::new();
    w.insert(true, -1);
    w.insert(false, 0x1000);
    w.insert(true, -1);
    assert_eq!(w.retire(), 1, "in-order retire blocks behind the load");
    w.set_ready(0x1000, BLOCK_MASK);
    assert_eq!(w.retire(), 2);
    assert!(w.is_empty());
}

#[test]
fn set_ready_matches_block_prefix() {
    let mut w = Window::new();
    w.insert(false, 0x1000);
    w.insert(false, 0x1020); // same 64-byte block
    w.insert(false, 0x1040); // next block
    w.set_ready(0x1008, BLOCK_MASK);
    assert_eq!(w.retire(), 2, "both slots in the block woke up");
    assert_eq!(w.load(), 1);
}

#[test]
#[should_panic(expected = "reorder window overflow")]
fn insert_past_depth_aborts() {
    let mut w = Window::new();
    for _ in 0..=WINDOW_DEPTH {
        w.insert(true, -1);
    }
}

proptest! {
    #[test]
    fn window_load_stays_bounded(ops in proptest::collection::vec(any::<(bool, bool)>(), 0..400)) {
        let mut w = Window::new();
        for (insert_ready, do_retire) in ops {
            if !w.is_full() {
                w.insert(insert_ready, 0x40);
            }
            if do_retire {
                let retired = w.retire();
                prop_assert!(retired <= WINDOW_IPC as i64);
            }
            prop_assert!(w.load() <= WINDOW_DEPTH);
        }
    }
}

// ══════════════════════════════════════════════════════════
// 2. CPU trace formats
// ══════════════════════════════════════════════════════════

fn trace_file(content: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("tempfile");
    f.write_all(content.as_bytes()).expect("write");
    f
}

#[test]
fn unfiltered_reads_and_writes() {
    let f = trace_file("3 0x100 R\n1 512 W\n2 0x80\n");
    let mut t = Trace::new(f.path()).expect("open");

    let r1 = t.get_unfiltered_request().expect("parse").expect("record");
    assert_eq!((r1.bubble_cnt, r1.addr, r1.kind), (3, 0x100, RequestKind::Read));

    let r2 = t.get_unfiltered_request().expect("parse").expect("record");
    assert_eq!((r2.bubble_cnt, r2.addr, r2.kind), (1, 512, RequestKind::Write));

    let r3 = t.get_unfiltered_request().expect("parse").expect("record");
    assert_eq!(r3.kind, RequestKind::Read, "kind defaults to read");

    assert!(t.get_unfiltered_request().expect("parse").is_none(), "stops at EOF");
}

#[test]
fn filtered_synthesizes_the_write_and_loops() {
    let f = trace_file("2 0x100 0x1c0\n");
    let mut t = Trace::new(f.path()).expect("open");

    let r1 = t.get_filtered_request().expect("parse").expect("record");
    assert_eq!((r1.bubble_cnt, r1.addr, r1.kind), (2, 0x100, RequestKind::Read));

    let r2 = t.get_filtered_request().expect("parse").expect("record");
    assert_eq!((r2.bubble_cnt, r2.addr, r2.kind), (0, 0x1c0, RequestKind::Write));

    assert!(t.get_filtered_request().expect("parse").is_none(), "EOF reported once");

    // The file rewound: the next call starts from the top again.
    let again = t.get_filtered_request().expect("parse").expect("record");
    assert_eq!(again.addr, 0x100);
}

#[test]
fn dram_trace_defaults_to_read() {
    let f = trace_file("1a2b R\nff W\n80\n");
    let mut t = Trace::new(f.path()).expect("open");
    assert_eq!(t.get_dram_request().expect("parse"), Some((0x1a2b, RequestKind::Read)));
    assert_eq!(t.get_dram_request().expect("parse"), Some((0xff, RequestKind::Write)));
    assert_eq!(t.get_dram_request().expect("parse"), Some((0x80, RequestKind::Read)));
    assert_eq!(t.get_dram_request().expect("parse"), None);
}

#[test]
fn malformed_line_is_an_error() {
    let f = trace_file("not a trace\n");
    let mut t = Trace::new(f.path()).expect("open");
    let err = t.get_unfiltered_request().expect_err("malformed");
    assert!(matches!(err, TraceError::Malformed { line: 1, .. }));
}

#[test]
fn missing_file_is_an_error() {
    let err = Trace::new(std::path::Path::new("/nonexistent/trace.txt")).expect_err("open");
    assert!(matches!(err, TraceError::Open { .. }));
}
