//! DDR4 bank groups: long timings inside a group, short ones across.

use std::sync::Arc;

use memsim_core::dram::standards::ddr4::{Command, Ddr4};
use memsim_core::dram::Dram;

fn channel() -> Dram<Ddr4> {
    let spec = Arc::new(Ddr4::new("DDR4_4Gb_x8", "DDR4_2400R", 1, 1).expect("preset"));
    Dram::new(spec, 0, 0)
}

// Address vector layout: [channel, rank, bank group, bank, row, column].

#[test]
fn tree_has_bank_groups() {
    let ch = channel();
    assert_eq!(ch.children.len(), 1, "one rank");
    assert_eq!(ch.children[0].children.len(), 4, "four bank groups");
    for group in &ch.children[0].children {
        assert_eq!(group.children.len(), 4, "four banks per group");
    }
}

#[test]
fn same_group_reads_wait_nccd_l() {
    let mut ch = channel();
    let addr = [0, 0, 0, 0, 5, 0];
    ch.update(Command::Act, &addr, 0);
    ch.update(Command::Rd, &addr, 16); // nRCD = 16
    // Back-to-back column reads in the same group obey nCCD_L = 6, not the
    // rank-wide nCCD_S = 4.
    assert!(!ch.check(Command::Rd, &addr, 21));
    assert!(ch.check(Command::Rd, &addr, 22));
}

#[test]
fn cross_group_reads_wait_only_nccd_s() {
    let mut ch = channel();
    let group0 = [0, 0, 0, 0, 5, 0];
    let group1 = [0, 0, 1, 0, 5, 0];
    ch.update(Command::Act, &group0, 0);
    ch.update(Command::Act, &group1, 5); // nRRD_S = 4 already satisfied
    ch.update(Command::Rd, &group0, 16);
    // The other group's read is gated by its own nRCD (5 + 16 = 21) and the
    // rank-wide nCCD_S (16 + 4 = 20), but not by group 0's nCCD_L.
    assert!(!ch.check(Command::Rd, &group1, 20));
    assert!(ch.check(Command::Rd, &group1, 21));
}

#[test]
fn same_group_activates_wait_nrrd_l() {
    let mut ch = channel();
    let bank0 = [0, 0, 0, 0, 5, 0];
    let same_group = [0, 0, 0, 1, 5, 0];
    let other_group = [0, 0, 1, 0, 5, 0];
    ch.update(Command::Act, &bank0, 0);
    // nRRD_L = 6 within the group, nRRD_S = 4 across groups.
    assert!(!ch.check(Command::Act, &same_group, 5));
    assert!(ch.check(Command::Act, &same_group, 6));
    assert!(!ch.check(Command::Act, &other_group, 3));
    assert!(ch.check(Command::Act, &other_group, 4));
}
