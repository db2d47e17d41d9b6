//! tar output: ustar headers, block padding and ACL restore scripts

pub mod acl_script;
pub mod entry;
pub mod header;
mod writer;

pub use acl_script::{restore_script, rights_string, ACL_SCRIPT_NAME};
pub use header::{EntryType, TarHeader, BLOCK_SIZE, MAX_OCTAL_SIZE};
pub use writer::TarWriter;
