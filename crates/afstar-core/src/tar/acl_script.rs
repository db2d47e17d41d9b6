//! ACL restore script synthesis
//!
//! tar has no place for AFS access lists, so each directory can carry a small
//! shell script that reapplies its ACL with `fs setacl` after extraction.

use crate::dump::{Acl, AclEntry};

/// Name of the script added to every directory
pub const ACL_SCRIPT_NAME: &str = ".afs_acl_restore.sh";

/// Permission bits of the script
pub const ACL_SCRIPT_MODE: u32 = 0o700;

/// Rights bits in `fs listacl` letter order
const RIGHTS_LETTERS: [(i32, char); 7] = [
    (0x01, 'r'),
    (0x02, 'w'),
    (0x04, 'i'),
    (0x08, 'l'),
    (0x10, 'd'),
    (0x20, 'k'),
    (0x40, 'a'),
];

/// Letter form of a rights mask, e.g. `0x09` -> `rl`
pub fn rights_string(rights: i32) -> String {
    RIGHTS_LETTERS
        .iter()
        .filter(|(bit, _)| rights & bit != 0)
        .map(|&(_, letter)| letter)
        .collect()
}

/// Shell script that restores `acl` on the directory containing it
pub fn restore_script(acl: &Acl) -> String {
    let mut script = String::from("#!/bin/sh\n\n");

    if acl.positive > 0 {
        push_setacl(&mut script, acl.positive_entries(), "-clear");
    }
    if acl.negative > 0 {
        push_setacl(&mut script, acl.negative_entries(), "-negative");
    }

    script
}

fn push_setacl(script: &mut String, entries: &[AclEntry], flag: &str) {
    script.push_str("fs sa `dirname $0` ");
    for entry in entries {
        script.push_str(&format!("{} {} ", entry.id, rights_string(entry.rights)));
    }
    script.push_str(flag);
    script.push('\n');
}
