//! End-to-end conversion of synthetic dumps, checked byte for byte and with
//! an independent tar reader

mod common;

use afstar_core::tar::TarHeader;
use afstar_core::{convert, ConvertConfig, ConvertError, Converter};
use common::{hello_dump, DumpBuilder, VNodeFields};
use std::io::Read;

/// Path, type flag, link target and contents of every entry, as a stock tar
/// reader sees them
fn read_archive(data: &[u8]) -> Vec<(String, u8, String, Vec<u8>)> {
    let mut archive = tar::Archive::new(data);
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let flag = entry.header().entry_type().as_byte();
            let link = entry
                .link_name_bytes()
                .map(|l| String::from_utf8_lossy(&l).into_owned())
                .unwrap_or_default();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            (path, flag, link, contents)
        })
        .collect()
}

fn paths(data: &[u8]) -> Vec<String> {
    read_archive(data).into_iter().map(|(path, ..)| path).collect()
}

fn header_at(data: &[u8], offset: usize) -> TarHeader {
    let mut block = [0u8; 512];
    block.copy_from_slice(&data[offset..offset + 512]);
    TarHeader::from_bytes(block)
}

#[test]
fn test_single_file_archive_layout() {
    let dump = hello_dump();
    let mut out = Vec::new();
    let summary = convert(dump.as_slice(), &mut out, ConvertConfig::default()).unwrap();

    // Directory header, file header, one data block, end marker
    assert_eq!(out.len(), 2560);
    assert_eq!(summary.bytes_written, 2560);
    assert_eq!(summary.bytes_read, dump.len() as u64);
    assert_eq!(summary.entries_written, 2);
    assert_eq!(summary.volumes, 1);
    assert_eq!(summary.vnodes, 2);
    assert_eq!(summary.volume_name, "user.alice");
    assert_eq!(summary.short_reads, 0);

    let dir = &out[0..512];
    assert_eq!(dir[0], 0, "directory name is empty");
    assert_eq!(dir[156], b'5');
    assert_eq!(&dir[124..136], b"00000000000\0");
    assert_eq!(&dir[345..347], b".\0");

    let file = &out[512..1024];
    assert_eq!(&file[0..10], b"hello.txt\0");
    assert_eq!(&file[100..108], b"0000644\0");
    assert_eq!(&file[108..116], b"0001775\0");
    assert_eq!(&file[116..124], b"0000144\0");
    assert_eq!(&file[124..136], b"00000000005\0");
    assert_eq!(&file[136..148], b"14524770400\0");
    assert_eq!(file[156], b'0');
    assert_eq!(&file[257..265], b"ustar\000");
    assert_eq!(&file[345..347], b".\0");

    assert_eq!(&out[1024..1029], b"hello");
    assert!(out[1029..].iter().all(|&b| b == 0));

    assert_eq!(header_at(&out, 0).entry_type(), b'5');
    assert_eq!(header_at(&out, 512).entry_type(), b'0');

    for offset in [0, 512] {
        let header = header_at(&out, offset);
        assert_eq!(header.stored_checksum(), Some(header.compute_checksum()));
        assert_eq!(out[offset + 155], 0, "checksum ends with NUL");
    }
}

#[test]
fn test_archive_reads_back_with_tar_crate() {
    let dump = DumpBuilder::new("proj")
        .volume(7, "proj")
        .vnode(VNodeFields::directory(1, 1, &[("docs", 3), ("README", 2)]))
        .vnode(VNodeFields::file(2, 1, b"top level\n"))
        .vnode(VNodeFields::directory(3, 1, &[("notes.txt", 4), ("a-rather-long-file-name.md", 6)]))
        .vnode(VNodeFields::file(4, 3, &vec![b'x'; 1500]))
        .vnode(VNodeFields::file(6, 3, b""))
        .finish();

    let mut out = Vec::new();
    convert(dump.as_slice(), &mut out, ConvertConfig::default()).unwrap();

    let entries = read_archive(&out);
    let listed: Vec<_> = entries
        .iter()
        .map(|(path, flag, _, data)| (path.as_str(), *flag, data.len()))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("./", b'5', 0),
            ("./README", b'0', 10),
            ("./docs/", b'5', 0),
            ("./docs/notes.txt", b'0', 1500),
            ("./docs/a-rather-long-file-name.md", b'0', 0),
        ]
    );
    assert_eq!(entries[1].3, b"top level\n");
    assert!(entries[3].3.iter().all(|&b| b == b'x'));
}

#[test]
fn test_forward_reference_is_resolved_after_main_pass() {
    // File 4 arrives before the directory that names it and before its
    // parent is known
    let dump = DumpBuilder::new("fwd")
        .volume(1, "fwd")
        .vnode(VNodeFields::directory(1, 1, &[("a", 3)]))
        .vnode(VNodeFields::file(4, 99, b"late"))
        .vnode(VNodeFields::directory(3, 1, &[("deep", 99)]))
        .vnode(VNodeFields::directory(99, 3, &[("late.txt", 4)]))
        .finish();

    let mut converter = Converter::new(Vec::new(), ConvertConfig::default());
    let summary = converter.convert(dump.as_slice()).unwrap();

    let registry = converter.registry();
    assert_eq!(registry.resolve(3), Some("./a"));
    assert_eq!(registry.resolve(99), Some("./a/deep"));
    assert_eq!(registry.resolve(4), Some("late.txt"));

    let out = converter.into_inner();
    assert_eq!(
        paths(&out),
        vec!["./", "./a/", "./a/deep/", "./a/deep/late.txt"]
    );
    assert_eq!(summary.orphans_deferred, 1);
    assert_eq!(summary.orphans_resolved, 1);
    assert_eq!(summary.orphan_passes, 1);
    assert!(summary.orphans_dropped.is_empty());

    let entries = read_archive(&out);
    assert_eq!(entries[3].3, b"late");
}

#[test]
fn test_nested_orphans_resolve_over_several_passes() {
    // Deepest first: each directory can only be placed once the one above
    // it has been replayed
    let dump = DumpBuilder::new("chain")
        .volume(1, "chain")
        .vnode(VNodeFields::directory(1, 1, &[("x", 3)]))
        .vnode(VNodeFields::directory(9, 7, &[]))
        .vnode(VNodeFields::directory(7, 5, &[("z", 9)]))
        .vnode(VNodeFields::directory(5, 3, &[("y", 7)]))
        .vnode(VNodeFields::directory(3, 1, &[("w", 5)]))
        .finish();

    let mut out = Vec::new();
    let summary = convert(dump.as_slice(), &mut out, ConvertConfig::default()).unwrap();

    assert_eq!(summary.orphans_deferred, 3);
    assert_eq!(summary.orphans_resolved, 3);
    assert_eq!(summary.orphan_passes, 3);
    assert_eq!(
        paths(&out),
        vec!["./", "./x/", "./x/w/", "./x/w/y/", "./x/w/y/z/"]
    );
}

#[test]
fn test_unreachable_cycle_is_dropped() {
    let dump = DumpBuilder::new("cycle")
        .volume(1, "cycle")
        .vnode(VNodeFields::directory(1, 1, &[("kept", 2)]))
        .vnode(VNodeFields::directory(21, 23, &[("b", 23)]))
        .vnode(VNodeFields::directory(23, 21, &[("a", 21)]))
        .vnode(VNodeFields::file(2, 1, b"kept"))
        .finish();

    let mut out = Vec::new();
    let summary = convert(dump.as_slice(), &mut out, ConvertConfig::default()).unwrap();

    assert_eq!(paths(&out), vec!["./", "./kept"]);
    assert_eq!(summary.orphans_deferred, 2);
    assert_eq!(summary.orphans_resolved, 0);
    assert_eq!(summary.orphan_passes, 1);
    assert_eq!(summary.orphans_dropped, vec![21, 23]);
}

#[test]
fn test_acl_restore_script_entry() {
    let mut root = VNodeFields::directory(1, 1, &[]);
    root.acl_positive = vec![(-101, 0x7f), (1021, 0x09)];
    root.acl_negative = vec![(1022, 0x02)];
    let dump = DumpBuilder::new("acl")
        .volume(1, "acl")
        .vnode(root)
        .finish();

    let config = ConvertConfig {
        acl_scripts: true,
        ..Default::default()
    };
    let mut out = Vec::new();
    let summary = convert(dump.as_slice(), &mut out, config).unwrap();
    assert_eq!(summary.acl_scripts_written, 1);
    assert_eq!(summary.entries_written, 2);

    let entries = read_archive(&out);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].0, "./.afs_acl_restore.sh");
    assert_eq!(
        String::from_utf8(entries[1].3.clone()).unwrap(),
        "#!/bin/sh\n\n\
         fs sa `dirname $0` -101 rwildka 1021 rl -clear\n\
         fs sa `dirname $0` 1022 w -negative\n"
    );

    let script = header_at(&out, 512);
    assert_eq!(&script.as_bytes()[100..108], b"0000700\0");
}

#[test]
fn test_acl_scripts_are_off_by_default() {
    let mut root = VNodeFields::directory(1, 1, &[]);
    root.acl_positive = vec![(1021, 0x7f)];
    let dump = DumpBuilder::new("acl").volume(1, "acl").vnode(root).finish();

    let mut out = Vec::new();
    let summary = convert(dump.as_slice(), &mut out, ConvertConfig::default()).unwrap();
    assert_eq!(summary.acl_scripts_written, 0);
    assert_eq!(paths(&out), vec!["./"]);
}

#[test]
fn test_symlink_target_goes_in_header() {
    let dump = DumpBuilder::new("links")
        .volume(1, "links")
        .vnode(VNodeFields::directory(1, 1, &[("latest", 2), ("cell", 4)]))
        .vnode(VNodeFields::symlink(2, 1, "releases/1.2"))
        .vnode(VNodeFields::symlink(4, 1, "#example.com:root.cell.\0"))
        .finish();

    let mut out = Vec::new();
    convert(dump.as_slice(), &mut out, ConvertConfig::default()).unwrap();

    // No data blocks follow symlink headers
    assert_eq!(out.len(), 3 * 512 + 1024);

    let entries = read_archive(&out);
    assert_eq!(entries[1].0, "./latest");
    assert_eq!(entries[1].1, b'2');
    assert_eq!(entries[1].2, "releases/1.2");
    assert!(entries[1].3.is_empty());
    assert_eq!(entries[2].2, "#example.com:root.cell.");
    assert_eq!(header_at(&out, 512).size(), Some(0));
}

#[test]
fn test_large_size_tag() {
    let mut file = VNodeFields::file(2, 1, b"hello");
    file.large_size = true;
    let dump = DumpBuilder::new("big")
        .volume(1, "big")
        .vnode(VNodeFields::directory(1, 1, &[("hello.txt", 2)]))
        .vnode(file.clone())
        .finish();

    let mut out = Vec::new();
    convert(dump.as_slice(), &mut out, ConvertConfig::default()).unwrap();
    let entries = read_archive(&out);
    assert_eq!(entries[1].3, b"hello");

    let config = ConvertConfig {
        large_files: false,
        ..Default::default()
    };
    match convert(dump.as_slice(), Vec::new(), config) {
        Err(ConvertError::UnexpectedRecord { found, .. }) => assert_eq!(found, b'h'),
        other => panic!("expected a framing error, got {:?}", other),
    }
}

#[test]
fn test_bad_magic_is_fatal() {
    let dump = DumpBuilder::with_header(0xDEAD_BEEF, 1, "bad").finish();
    let mut converter = Converter::new(Vec::new(), ConvertConfig::default());

    match converter.convert(dump.as_slice()) {
        Err(ConvertError::BadMagic { found }) => assert_eq!(found, 0xDEAD_BEEF),
        other => panic!("expected BadMagic, got {:?}", other),
    }
    assert!(converter.into_inner().is_empty());
}

#[test]
fn test_unsupported_version_is_fatal() {
    let dump = DumpBuilder::with_header(common::BEGIN_MAGIC, 2, "v2").finish();
    assert!(matches!(
        convert(dump.as_slice(), Vec::new(), ConvertConfig::default()),
        Err(ConvertError::UnsupportedVersion(2))
    ));
}

#[test]
fn test_not_a_dump() {
    let text = b"this is not a volume dump";
    assert!(matches!(
        convert(&text[..], Vec::new(), ConvertConfig::default()),
        Err(ConvertError::NotADump(_))
    ));
    assert!(matches!(
        convert(&[][..], Vec::new(), ConvertConfig::default()),
        Err(ConvertError::NotADump(0))
    ));
}

#[test]
fn test_bad_end_magic_only_warns() {
    let dump = DumpBuilder::new("end")
        .volume(1, "end")
        .vnode(VNodeFields::directory(1, 1, &[]))
        .finish_with_magic(0);

    let mut out = Vec::new();
    let summary = convert(dump.as_slice(), &mut out, ConvertConfig::default()).unwrap();
    assert_eq!(summary.bytes_written, 512 + 1024);
}

#[test]
fn test_truncated_payload_is_zero_filled() {
    let mut file = VNodeFields::file(2, 1, b"hello");
    file.declared_size = Some(10);
    let dump = DumpBuilder::new("cut")
        .volume(1, "cut")
        .vnode(VNodeFields::directory(1, 1, &[("cut.bin", 2)]))
        .vnode(file)
        .into_bytes();

    let mut converter = Converter::new(Vec::new(), ConvertConfig::default());
    // The stream ends inside the payload, so no end record follows
    assert!(matches!(
        converter.convert(dump.as_slice()),
        Err(ConvertError::UnexpectedRecord { .. })
    ));

    let out = converter.into_inner();
    assert_eq!(out.len(), 3 * 512);
    assert_eq!(header_at(&out, 512).size(), Some(10));
    assert_eq!(&out[1024..1034], b"hello\0\0\0\0\0");
    assert!(out[1034..].iter().all(|&b| b == 0));
}

#[test]
fn test_unknown_and_empty_vnode_types_are_skipped() {
    let dump = DumpBuilder::new("odd")
        .volume(1, "odd")
        .vnode(VNodeFields::directory(1, 1, &[("a.txt", 2)]))
        .raw_vnode(6, 0, b"ignored")
        .raw_vnode(8, 9, b"also ignored")
        .vnode(VNodeFields::file(2, 1, b"a"))
        .finish();

    let mut out = Vec::new();
    let summary = convert(dump.as_slice(), &mut out, ConvertConfig::default()).unwrap();
    assert_eq!(summary.vnodes, 4);
    assert_eq!(paths(&out), vec!["./", "./a.txt"]);
}

#[test]
fn test_multiple_volumes_share_one_archive() {
    let dump = DumpBuilder::new("multi")
        .volume(1, "first")
        .vnode(VNodeFields::directory(1, 1, &[("one", 2)]))
        .vnode(VNodeFields::file(2, 1, b"1"))
        .volume(2, "second")
        .vnode(VNodeFields::file(4, 1, b"2"))
        .finish();

    let mut out = Vec::new();
    let summary = convert(dump.as_slice(), &mut out, ConvertConfig::default()).unwrap();
    assert_eq!(summary.volumes, 2);
    // Vnode 4 is never named by a directory
    assert_eq!(summary.orphans_dropped, vec![4]);
    assert_eq!(paths(&out), vec!["./", "./one"]);
}
