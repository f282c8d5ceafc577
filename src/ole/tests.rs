//! Integration tests for the compound filesystem
//!
//! These tests drive the public facade end to end: build a filesystem, write
//! it out, open the bytes again and check contents and block accounting.

use super::consts::*;
use super::{BlockSize, OleError, OleFileSystem, OpenMode};
use crate::common::FileMagic;
use std::io::{Read, Seek, SeekFrom, Write};

fn reopen(fs: &mut OleFileSystem) -> OleFileSystem {
    let bytes = fs.to_bytes().unwrap();
    OleFileSystem::open_bytes(bytes).unwrap()
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

#[test]
fn test_empty_document_round_trip() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    fs.create_document(root, "Foo", &[]).unwrap();

    let bytes = fs.to_bytes().unwrap();
    assert_eq!(&bytes[..8], MAGIC);
    // Header, one BAT block, one property block
    assert_eq!(bytes.len(), 3 * 512);

    let mut reopened = OleFileSystem::open_bytes(bytes).unwrap();
    let foo = reopened.get_entry(reopened.root_id(), "Foo").unwrap();
    let entry = reopened.entry(foo).unwrap();
    assert!(entry.is_document());
    assert_eq!(entry.size(), 0);
    assert!(reopened.read_document(foo).unwrap().is_empty());
    assert_eq!(reopened.property_table().property(foo).unwrap().start_block(), ENDOFCHAIN);
}

#[test]
fn test_document_of_exactly_cutoff_size() {
    let mut main4096 = vec![0u8; 4096];
    main4096[0] = 0xF6;
    main4096[4095] = 0xF5;

    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let id = fs.create_document(root, "main4096", &main4096).unwrap();
    // 4096 bytes is not below the cutoff, so it lives in big blocks
    assert!(!fs.property_table().property(id).unwrap().is_small());
    assert!(fs.mini_store().stream_blocks().is_empty());

    let mut reopened = reopen(&mut fs);
    let id = reopened.entry_by_path(&["main4096"]).unwrap();
    assert_eq!(reopened.entry(id).unwrap().size(), 4096);
    assert_eq!(reopened.read_document(id).unwrap(), main4096);
}

#[test]
fn test_freed_blocks_are_reused_lowest_first() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let a = fs.create_document(root, "A", &[1u8; 4096]).unwrap();
    let b = fs.create_document(root, "B", &[2u8; 4096]).unwrap();
    assert_eq!(fs.property_table().property(a).unwrap().start_block(), 1);
    assert_eq!(fs.property_table().property(b).unwrap().start_block(), 9);

    assert!(fs.delete(a).unwrap());
    assert_eq!(fs.free_block().unwrap(), 1);
    assert_eq!(fs.next_block(1).unwrap(), FREESECT);

    let c = fs.create_document(root, "C", &[3u8; 4600]).unwrap();
    assert_eq!(fs.property_table().property(c).unwrap().start_block(), 1);

    let mut reopened = reopen(&mut fs);
    let report = reopened.audit().unwrap();
    // Nine blocks for C, eight for B, one for the property table
    assert_eq!(report.chained_blocks, 18);
    assert_eq!(report.bat_blocks, 1);
    assert_eq!(report.free_blocks, 128 - 19);
    assert!(!reopened.exists(&["A"]));
    assert_eq!(reopened.open_stream(&["C"]).unwrap(), vec![3u8; 4600]);
    assert_eq!(reopened.open_stream(&["B"]).unwrap(), vec![2u8; 4096]);
}

#[test]
fn test_chain_jump_survives_round_trip() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let a = fs.create_document(root, "A", &pattern(21 * 512, 1)).unwrap();
    fs.create_document(root, "B", &pattern(67 * 512, 2)).unwrap();
    let c = fs.create_document(root, "C", &pattern(4096, 3)).unwrap();
    fs.create_document(root, "D", &pattern(4096, 4)).unwrap();
    fs.create_document(root, "Small", &pattern(1000, 5)).unwrap();

    // C occupies blocks 89..96; freeing them lets A grow into block 89
    assert_eq!(fs.property_table().property(c).unwrap().start_block(), 89);
    assert!(fs.delete(c).unwrap());
    let grown = pattern(22 * 512, 6);
    fs.replace_contents(a, &grown).unwrap();
    assert_eq!(fs.next_block(21).unwrap(), 89);

    let mut reopened = reopen(&mut fs);
    assert_eq!(reopened.big_block_size(), 512);
    assert_eq!(reopened.next_block(21).unwrap(), 89);
    assert_eq!(reopened.next_block(89).unwrap(), ENDOFCHAIN);

    let root = reopened.root().unwrap();
    assert_eq!(root.name(), ROOT_NAME);
    let root_size = reopened.property_table().root_property().size();
    assert_eq!(
        root_size,
        reopened.mini_store().stream_blocks().len() as u64 * 512
    );
    assert!(root_size > 0);

    assert_eq!(reopened.open_stream(&["A"]).unwrap(), grown);
    assert_eq!(reopened.open_stream(&["Small"]).unwrap(), pattern(1000, 5));
    reopened.audit().unwrap();
}

#[test]
fn test_cyclic_chain_is_reported() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let id = fs.create_document(root, "Loop", &[9u8; 5000]).unwrap();
    let start = fs.property_table().property(id).unwrap().start_block();
    assert_eq!(start, 1);

    // 1 -> 2 -> 3 -> 4 -> 5 -> 2, well before the ten blocks the size needs
    fs.set_next_block(5, 2).unwrap();
    assert!(matches!(
        fs.read_document(id),
        Err(OleError::ChainLoop { block: 2 })
    ));
    assert!(matches!(
        fs.replace_contents(id, &[0u8; 9000]),
        Err(OleError::ChainLoop { block: 2 })
    ));
    assert!(fs.document_reader(id).is_err());
    assert!(fs.audit().is_err());

    // The loop is persisted and detected again after reopening
    let mut reopened = reopen(&mut fs);
    let id = reopened.entry_by_path(&["Loop"]).unwrap();
    assert!(matches!(
        reopened.read_document(id),
        Err(OleError::ChainLoop { .. })
    ));
}

#[test]
fn test_rename() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let a = fs.create_document(root, "Alpha", b"a").unwrap();
    fs.create_document(root, "Beta", b"b").unwrap();

    assert!(!fs.rename(a, "BETA").unwrap());
    assert!(!fs.rename(a, "bad/name").unwrap());
    assert!(!fs.rename(a, &"x".repeat(32)).unwrap());
    assert!(!fs.rename(root, "NewRoot").unwrap());
    assert!(fs.rename(a, "Gamma-Long").unwrap());
    assert_eq!(fs.root().unwrap().entry_names(), vec!["Beta", "Gamma-Long"]);

    let mut reopened = reopen(&mut fs);
    assert_eq!(reopened.open_stream(&["gamma-long"]).unwrap(), b"a");
    assert!(!reopened.exists(&["Alpha"]));
}

#[test]
fn test_delete_rules() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let dir = fs.create_directory(root, "Dir").unwrap();
    let doc = fs.create_document(dir, "Doc", b"contents").unwrap();

    assert!(!fs.delete(root).unwrap());
    assert!(!fs.delete(dir).unwrap());
    assert!(fs.delete(doc).unwrap());
    assert!(fs.delete(dir).unwrap());
    assert!(matches!(fs.delete(dir), Err(OleError::NotFound(_))));
    assert_eq!(fs.root().unwrap().entry_count(), 0);

    let report = fs.audit().unwrap();
    assert_eq!(report.chained_mini_blocks, 0);
}

#[test]
fn test_duplicate_and_invalid_names() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    fs.create_document(root, "Doc", b"x").unwrap();

    assert!(matches!(
        fs.create_document(root, "DOC", b"y"),
        Err(OleError::AlreadyExists(_))
    ));
    assert!(matches!(
        fs.create_directory(root, "a:b"),
        Err(OleError::InvalidName(_))
    ));
    let doc = fs.get_entry(root, "doc").unwrap();
    assert!(matches!(
        fs.create_document(doc, "Inner", b"z"),
        Err(OleError::NotADirectory(_))
    ));
    assert!(matches!(
        fs.get_entry(root, "Missing"),
        Err(OleError::NotFound(_))
    ));
    // Nothing was allocated for the rejected documents
    assert_eq!(fs.audit().unwrap().chained_mini_blocks, 1);
}

#[test]
fn test_migration_across_cutoff() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let id = fs.create_document(root, "Doc", &pattern(100, 1)).unwrap();
    assert!(fs.property_table().property(id).unwrap().is_small());

    let big = pattern(5000, 2);
    fs.replace_contents(id, &big).unwrap();
    assert!(!fs.property_table().property(id).unwrap().is_small());
    let report = fs.audit().unwrap();
    assert_eq!(report.chained_mini_blocks, 0);
    assert_eq!(fs.read_document(id).unwrap(), big);

    let small = pattern(10, 3);
    fs.replace_contents(id, &small).unwrap();
    assert!(fs.property_table().property(id).unwrap().is_small());
    let report = fs.audit().unwrap();
    assert_eq!(report.chained_mini_blocks, 1);

    let mut reopened = reopen(&mut fs);
    assert_eq!(reopened.open_stream(&["Doc"]).unwrap(), small);
    reopened.audit().unwrap();
}

#[test]
fn test_many_mini_documents() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    // Enough mini blocks to need a second mini-FAT block
    for i in 0..40 {
        let name = format!("Stream{}", i);
        fs.create_document(root, &name, &pattern(300 + i, i as u8)).unwrap();
    }
    assert_eq!(fs.mini_store().table().pages().len(), 2);
    assert_eq!(fs.header().sbat_count(), 2);

    let mut reopened = reopen(&mut fs);
    for i in 0..40 {
        let name = format!("Stream{}", i);
        assert_eq!(
            reopened.open_stream(&[name.as_str()]).unwrap(),
            pattern(300 + i, i as u8)
        );
    }
    let report = reopened.audit().unwrap();
    assert_eq!(report.chained_mini_blocks, (0..40).map(|i: usize| (300 + i).div_ceil(64)).sum::<usize>());
}

#[test]
fn test_difat_growth() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let data = pattern(110 * 128 * 512, 7);
    fs.create_document(root, "Huge", &data).unwrap();

    assert!(fs.header().bat_count() as usize > HEADER_BAT_SLOTS);
    assert_eq!(fs.header().xbat_count(), 1);
    let difat = fs.header().xbat_start();
    assert_eq!(fs.next_block(difat).unwrap(), DIFSECT);

    let mut reopened = reopen(&mut fs);
    assert_eq!(reopened.header().xbat_count(), 1);
    assert_eq!(reopened.bat().pages().len(), fs.bat().pages().len());
    let report = reopened.audit().unwrap();
    assert_eq!(report.difat_blocks, 1);
    assert_eq!(report.bat_blocks, reopened.header().bat_count() as usize);
    assert_eq!(reopened.open_stream(&["Huge"]).unwrap(), data);
}

#[test]
fn test_large_block_round_trip() {
    let mut fs = OleFileSystem::with_block_size(BlockSize::Large).unwrap();
    let root = fs.root_id();
    let dir = fs.create_directory(root, "Storage").unwrap();
    fs.create_document(dir, "Big", &pattern(10_000, 1)).unwrap();
    fs.create_document(root, "Small", &pattern(50, 2)).unwrap();

    let bytes = fs.to_bytes().unwrap();
    assert_eq!(bytes.len() % 4096, 0);
    assert_eq!(u16::from_le_bytes([bytes[26], bytes[27]]), 4);
    assert_eq!(u16::from_le_bytes([bytes[30], bytes[31]]), 12);

    let mut reopened = OleFileSystem::open_bytes(bytes).unwrap();
    assert_eq!(reopened.block_size(), BlockSize::Large);
    assert_eq!(reopened.header().dir_sector_count(), 1);
    assert_eq!(reopened.open_stream(&["Storage", "Big"]).unwrap(), pattern(10_000, 1));
    assert_eq!(reopened.open_stream(&["Small"]).unwrap(), pattern(50, 2));
    reopened.audit().unwrap();
}

#[test]
fn test_directory_order_is_persisted() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    for name in ["WordDocument", "1Table", "\u{5}SummaryInformation", "Data", "ObjectPool"] {
        fs.create_document(root, name, b"x").unwrap();
    }
    let expected = vec!["Data", "1Table", "ObjectPool", "WordDocument", "\u{5}SummaryInformation"];
    assert_eq!(fs.root().unwrap().entry_names(), expected);

    let reopened = reopen(&mut fs);
    assert_eq!(reopened.root().unwrap().entry_names(), expected);
}

#[test]
fn test_path_api() {
    let mut fs = OleFileSystem::new().unwrap();
    fs.create_stream(&["Outer", "Inner", "Doc"], b"nested").unwrap();
    fs.create_stream(&["Outer", "Other"], b"sibling").unwrap();
    fs.create_stream(&["Outer", "Other"], b"replaced").unwrap();

    assert!(fs.exists(&["Outer", "Inner"]));
    assert!(fs.entry(fs.entry_by_path(&["Outer"]).unwrap()).unwrap().is_directory());
    let other = fs.entry_by_path(&["Outer", "Other"]).unwrap();
    assert_eq!(fs.path_of(other).unwrap(), vec!["Outer", "Other"]);
    assert_eq!(
        fs.list_streams().unwrap(),
        vec![
            vec!["Outer".to_string(), "Inner".to_string(), "Doc".to_string()],
            vec!["Outer".to_string(), "Other".to_string()],
        ]
    );
    assert!(matches!(
        fs.create_stream(&["Outer", "Other", "Deeper"], b""),
        Err(OleError::NotADirectory(_))
    ));
    assert!(matches!(fs.create_stream(&[], b""), Err(OleError::InvalidName(_))));

    let mut reopened = reopen(&mut fs);
    assert_eq!(reopened.open_stream(&["Outer", "Other"]).unwrap(), b"replaced");
    assert_eq!(reopened.open_stream(&["OUTER", "inner", "doc"]).unwrap(), b"nested");
    assert!(matches!(reopened.open_stream(&["Outer"]), Err(OleError::NotADocument(_))));
}

#[test]
fn test_document_reader_and_writer() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let data = pattern(6000, 9);

    let mut writer = fs.document_writer(root, "Streamed").unwrap();
    for chunk in data.chunks(700) {
        writer.write_all(chunk).unwrap();
    }
    let id = writer.close().unwrap();
    assert_eq!(fs.entry(id).unwrap().size(), 6000);

    let mut reader = fs.document_reader(id).unwrap();
    let mut head = [0u8; 10];
    reader.read_exact(&mut head).unwrap();
    assert_eq!(&head, &data[..10]);

    reader.seek(SeekFrom::Start(5000)).unwrap();
    let mut rest = Vec::new();
    reader.read_to_end(&mut rest).unwrap();
    assert_eq!(rest, &data[5000..]);
    assert!(reader.seek(SeekFrom::Current(-7000)).is_err());
    assert_eq!(reader.seek(SeekFrom::End(-1)).unwrap(), 5999);

    // Dropping an unclosed writer still stores the document
    {
        let mut writer = fs.document_writer(root, "Dropped").unwrap();
        writer.write_all(b"tiny").unwrap();
    }
    assert_eq!(fs.open_stream(&["Dropped"]).unwrap(), b"tiny");
}

#[test]
fn test_file_backed_in_place_write() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    {
        let mut fs = OleFileSystem::new().unwrap();
        let root = fs.root_id();
        fs.create_document(root, "First", &pattern(5000, 1)).unwrap();
        let mut file = std::fs::File::create(tmp.path()).unwrap();
        fs.write_filesystem(&mut file).unwrap();
    }

    {
        let mut fs = OleFileSystem::open_file(tmp.path(), OpenMode::ReadWrite).unwrap();
        let root = fs.root_id();
        fs.create_document(root, "Second", &pattern(200, 2)).unwrap();
        let first = fs.entry_by_path(&["First"]).unwrap();
        fs.replace_contents(first, &pattern(9000, 3)).unwrap();
        fs.write_in_place().unwrap();
        fs.close().unwrap();
    }

    let mut fs = OleFileSystem::open_file(tmp.path(), OpenMode::ReadOnly).unwrap();
    assert!(fs.is_read_only());
    assert_eq!(fs.open_stream(&["First"]).unwrap(), pattern(9000, 3));
    assert_eq!(fs.open_stream(&["Second"]).unwrap(), pattern(200, 2));
    fs.audit().unwrap();

    let root = fs.root_id();
    assert!(matches!(
        fs.create_document(root, "Third", b""),
        Err(OleError::ReadOnly)
    ));
    assert!(matches!(fs.write_in_place(), Err(OleError::ReadOnly)));

    // A read-only filesystem can still be copied out
    let copy = fs.to_bytes().unwrap();
    assert_eq!(copy, std::fs::read(tmp.path()).unwrap());
}

#[test]
fn test_close_is_idempotent() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let id = fs.create_document(root, "Doc", b"data").unwrap();

    fs.close().unwrap();
    fs.close().unwrap();
    assert!(!fs.is_open());
    assert!(matches!(fs.read_document(id), Err(OleError::Closed)));
    assert!(matches!(fs.create_document(root, "More", b""), Err(OleError::Closed)));
    assert!(matches!(fs.to_bytes(), Err(OleError::Closed)));
    assert!(matches!(fs.next_block(0), Err(OleError::Closed)));

    assert!(matches!(fs.get_entry(root, "Doc"), Err(OleError::Closed)));
    assert!(matches!(fs.entry(id), Err(OleError::Closed)));
    assert!(matches!(fs.entry_by_path(&["Doc"]), Err(OleError::Closed)));
    assert!(matches!(fs.root(), Err(OleError::Closed)));
    assert!(matches!(fs.list_streams(), Err(OleError::Closed)));
    assert!(matches!(fs.path_of(id), Err(OleError::Closed)));
    assert!(!fs.exists(&["Doc"]));
}

#[test]
fn test_empty_document_with_stray_start_block() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    fs.create_document(root, "Other", &[0xAB; 100]).unwrap();
    fs.create_document(root, "Empty", b"").unwrap();
    let mut bytes = fs.to_bytes().unwrap();

    // Point the empty record at mini block 0, which "Other" owns
    let property_block = u32::from_le_bytes(bytes[0x30..0x34].try_into().unwrap()) as usize;
    let table = (property_block + 1) * 512;
    let name: Vec<u8> = "Empty".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    let record = (0..4)
        .map(|i| table + i * DIRENTRY_SIZE)
        .find(|&offset| bytes[offset..offset + name.len()] == name[..])
        .unwrap();
    bytes[record + 0x74..record + 0x78].copy_from_slice(&0u32.to_le_bytes());

    let mut reopened = OleFileSystem::open_bytes(bytes).unwrap();
    let empty = reopened.entry_by_path(&["Empty"]).unwrap();
    assert_eq!(reopened.property_table().property(empty).unwrap().start_block(), ENDOFCHAIN);
    assert!(reopened.delete(empty).unwrap());
    reopened.create_document(reopened.root_id(), "New", &[0x11; 100]).unwrap();

    assert_eq!(reopened.open_stream(&["Other"]).unwrap(), vec![0xAB; 100]);
    assert_eq!(reopened.open_stream(&["New"]).unwrap(), vec![0x11; 100]);
    reopened.audit().unwrap();
}

#[test]
fn test_non_ole_inputs() {
    assert!(matches!(OleFileSystem::open_bytes(Vec::new()), Err(OleError::EmptyFile)));
    assert!(matches!(
        OleFileSystem::open_bytes(b"<?xml version=\"1.0\"?><root/>".to_vec()),
        Err(OleError::NotOleFile(FileMagic::Xml))
    ));
    assert!(matches!(
        OleFileSystem::open_bytes(b"PK\x03\x04rest of a zip".to_vec()),
        Err(OleError::NotOleFile(FileMagic::Ooxml))
    ));
    assert!(matches!(
        OleFileSystem::open_reader(&MAGIC[..]),
        Err(OleError::CorruptedFile(_))
    ));
}

#[test]
fn test_corrupt_header_counts() {
    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    fs.create_document(root, "Doc", b"x").unwrap();
    let mut bytes = fs.to_bytes().unwrap();

    // Claim a second BAT block that is not there
    bytes[0x2C..0x30].copy_from_slice(&2u32.to_le_bytes());
    assert!(matches!(
        OleFileSystem::open_bytes(bytes.clone()),
        Err(OleError::CorruptedFile(_))
    ));

    // Point the property table at itself
    bytes[0x2C..0x30].copy_from_slice(&1u32.to_le_bytes());
    let property_start = u32::from_le_bytes([bytes[0x30], bytes[0x31], bytes[0x32], bytes[0x33]]);
    let slot = 512 + property_start as usize * 4;
    bytes[slot..slot + 4].copy_from_slice(&property_start.to_le_bytes());
    assert!(matches!(
        OleFileSystem::open_bytes(bytes),
        Err(OleError::ChainLoop { .. })
    ));
}

#[test]
fn test_metadata_round_trip() {
    use chrono::{TimeZone, Utc};

    let mut fs = OleFileSystem::new().unwrap();
    let root = fs.root_id();
    let dir = fs.create_directory(root, "Dir").unwrap();
    let clsid = [0x11u8; 16];
    let when = Utc.with_ymd_and_hms(2020, 5, 17, 8, 30, 0).unwrap();
    fs.set_clsid(dir, clsid).unwrap();
    fs.set_times(dir, Some(when), Some(when)).unwrap();

    let reopened = reopen(&mut fs);
    let dir = reopened.entry(reopened.entry_by_path(&["Dir"]).unwrap()).unwrap();
    assert_eq!(dir.clsid(), clsid);
    assert_eq!(dir.created(), Some(when));
    assert_eq!(dir.modified(), Some(when));
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone)]
    enum Op {
        Create(u8, usize),
        Replace(u8, usize),
        Delete(u8),
    }

    /// Strategy covering mini and big document sizes
    fn size_strategy() -> impl Strategy<Value = usize> {
        prop_oneof![0usize..200, 3000usize..5200, 8000usize..12000]
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..12, size_strategy()).prop_map(|(n, s)| Op::Create(n, s)),
            (0u8..12, size_strategy()).prop_map(|(n, s)| Op::Replace(n, s)),
            (0u8..12).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_blocks_conserved_and_contents_kept(ops in prop::collection::vec(op_strategy(), 1..30)) {
            let mut fs = OleFileSystem::new().unwrap();
            let root = fs.root_id();
            let mut model: BTreeMap<String, Vec<u8>> = BTreeMap::new();

            for (step, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Create(n, size) | Op::Replace(n, size) => {
                        let name = format!("Doc{}", n);
                        let data = pattern(size, step as u8);
                        fs.create_or_update_document(root, &name, &data).unwrap();
                        model.insert(name, data);
                    },
                    Op::Delete(n) => {
                        let name = format!("Doc{}", n);
                        if let Ok(id) = fs.get_entry(root, &name) {
                            prop_assert!(fs.delete(id).unwrap());
                            model.remove(&name);
                        }
                    },
                }
                let report = fs.audit().unwrap();
                prop_assert_eq!(
                    report.bat_blocks + report.difat_blocks + report.chained_blocks + report.free_blocks,
                    fs.bat().slot_count() as usize
                );
            }

            let mut reopened = reopen(&mut fs);
            reopened.audit().unwrap();
            prop_assert_eq!(reopened.root().unwrap().entry_count(), model.len());
            for (name, data) in &model {
                prop_assert_eq!(&reopened.open_stream(&[name.as_str()]).unwrap(), data);
            }
        }

        #[test]
        fn prop_children_stay_sorted(names in prop::collection::btree_set("[A-Za-z0-9_]{1,31}", 1..25)) {
            let mut fs = OleFileSystem::new().unwrap();
            let root = fs.root_id();
            let mut created = Vec::new();
            for name in &names {
                // Names differing only in case collide
                if fs.create_directory(root, name).is_ok() {
                    created.push(name.clone());
                }
            }

            let reopened = reopen(&mut fs);
            let listed = reopened.root().unwrap().entry_names();
            prop_assert_eq!(listed.len(), created.len());
            for pair in listed.windows(2) {
                prop_assert_ne!(
                    crate::ole::property::compare_names(pair[0], pair[1]),
                    std::cmp::Ordering::Greater
                );
            }
        }
    }
}
