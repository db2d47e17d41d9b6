//! Tar headers for vnodes

use super::acl_script::{ACL_SCRIPT_MODE, ACL_SCRIPT_NAME};
use super::header::{EntryType, TarHeader};
use crate::dump::VNode;

fn base_header(entry_type: EntryType, vnode: &VNode, prefix: &str) -> TarHeader {
    let mut header = TarHeader::new(entry_type);
    header.set_prefix(prefix);
    header.set_mode(vnode.mode_bits as u32);
    header.set_uid(vnode.owner);
    header.set_gid(vnode.group);
    header.set_mtime(vnode.unix_mod_time);
    header
}

/// Header for a directory; the whole path lives in the prefix and the name
/// stays empty
pub fn directory_header(vnode: &VNode, path: &str) -> TarHeader {
    let mut header = base_header(EntryType::Directory, vnode, path);
    header.set_size(0);
    header.finalize();
    header
}

pub fn file_header(vnode: &VNode, dir: &str, name: &str) -> TarHeader {
    let mut header = base_header(EntryType::Regular, vnode, dir);
    header.set_name(name);
    header.set_size(vnode.data_size);
    header.finalize();
    header
}

/// Header for a symlink or mount point. The target is its payload in the
/// dump but goes in the header here, so the size is zero.
pub fn symlink_header(vnode: &VNode, dir: &str, name: &str, target: &str) -> TarHeader {
    let mut header = base_header(EntryType::Symlink, vnode, dir);
    header.set_name(name);
    header.set_linkname(target);
    header.set_size(0);
    header.finalize();
    header
}

/// Header for the ACL restore script stored inside directory `path`
pub fn acl_script_header(dir_vnode: &VNode, path: &str, script_len: usize) -> TarHeader {
    let mut header = base_header(EntryType::Regular, dir_vnode, path);
    header.set_name(ACL_SCRIPT_NAME);
    header.set_mode(ACL_SCRIPT_MODE);
    header.set_size(script_len as u64);
    header.finalize();
    header
}
