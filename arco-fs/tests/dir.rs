mod common;

use std::collections::HashMap;
use std::thread;

use arco_fs::{ArcoFileSystem, Error, INODE_COUNT, Inode, ROOT_INODE_ID, Slot};
use common::{assert_counts_consistent, fresh};
use vfs::DirEntryType;

fn names(root: &arco_fs::Directory) -> Vec<String> {
    let mut names: Vec<String> = root.list().map(|entry| entry.unwrap().name).collect();
    names.sort();
    names
}

#[test]
fn create_then_lookup() {
    let (_disk, _afs, root) = fresh(16);
    let file = root.create("hello").unwrap();

    assert_eq!(root.lookup("hello"), Ok(file.inode_id()));
    assert_eq!(root.lookup("nope"), Err(Error::NotFound));
    // 精确匹配
    assert_eq!(root.lookup("hell"), Err(Error::NotFound));
    assert_eq!(root.lookup("hello!"), Err(Error::NotFound));
}

#[test]
fn first_file_takes_third_slot() {
    let (_disk, afs, root) = fresh(16);
    let file = root.create("a").unwrap();

    assert_eq!(file.inode_id(), 3);
    assert_eq!(afs.lock().inode_slot(3), Ok(Slot::Allocated));
    assert_eq!(afs.lock().statfs().free_inodes, INODE_COUNT as u64 - 3);
}

#[test]
fn root_entries() {
    let (_disk, afs, root) = fresh(16);

    assert_eq!(root.inode_id(), ROOT_INODE_ID);
    assert_eq!(root.lookup("."), Ok(1));
    assert_eq!(root.lookup(".."), Ok(2));
    assert!(matches!(root.find(".."), Ok(Inode::Directory(_))));
    assert_eq!(root.stat().unwrap().mode, DirEntryType::Directory);

    assert!(matches!(
        ArcoFileSystem::inode(&afs, 1),
        Ok(Inode::Directory(_))
    ));
    assert!(matches!(ArcoFileSystem::inode(&afs, 3), Err(Error::NotFound)));
    assert!(matches!(ArcoFileSystem::inode(&afs, 0), Err(Error::NotFound)));
    assert!(matches!(ArcoFileSystem::inode(&afs, 17), Err(Error::NotFound)));
}

#[test]
fn find_dispatches_by_kind() {
    let (_disk, _afs, root) = fresh(16);
    root.create("file").unwrap();

    let file = root.find("file").unwrap();
    assert_eq!(file.kind(), DirEntryType::Regular);
    assert!(file.into_dir().is_err());

    let dot = root.find(".").unwrap();
    assert_eq!(dot.kind(), DirEntryType::Directory);
    assert_eq!(dot.into_file().err(), Some(Error::IsADirectory));
}

#[test]
fn duplicate_names_rejected() {
    let (_disk, afs, root) = fresh(16);
    root.create("dup").unwrap();

    assert_eq!(root.create("dup").err(), Some(Error::AlreadyExists));
    assert_eq!(root.create(".").err(), Some(Error::AlreadyExists));
    assert_eq!(afs.lock().statfs().free_inodes, INODE_COUNT as u64 - 3);
}

#[test]
fn invalid_names_rejected() {
    let (_disk, _afs, root) = fresh(16);

    assert_eq!(root.create("").err(), Some(Error::InvalidName));
    assert_eq!(root.create("twelve_chars").err(), Some(Error::InvalidName));
    assert_eq!(root.create("a/b").err(), Some(Error::InvalidName));
    assert!(root.create("eleven_char").is_ok());
}

#[test]
fn unlink_releases_everything() {
    let (_disk, afs, root) = fresh(16);
    let before = afs.lock().statfs();

    let file = root.create("tmp").unwrap();
    file.write(&common::pattern(3000), true).unwrap();
    let inode_id = file.inode_id();

    root.unlink("tmp").unwrap();
    assert_eq!(root.lookup("tmp"), Err(Error::NotFound));
    assert_eq!(afs.lock().statfs(), before);
    assert_eq!(afs.lock().inode_slot(inode_id), Ok(Slot::Free));
    assert_counts_consistent(&afs);

    assert_eq!(root.unlink("tmp"), Err(Error::NotFound));
}

#[test]
fn create_reuses_lowest_free_slot() {
    let (_disk, _afs, root) = fresh(16);
    let a = root.create("a").unwrap().inode_id();
    let b = root.create("b").unwrap().inode_id();
    let c = root.create("c").unwrap().inode_id();
    assert_eq!((a, b, c), (3, 4, 5));

    root.unlink("b").unwrap();
    root.unlink("a").unwrap();

    assert_eq!(root.create("d").unwrap().inode_id(), a);
    assert_eq!(root.create("e").unwrap().inode_id(), b);
    assert_eq!(root.create("f").unwrap().inode_id(), 6);
}

#[test]
fn directories_cannot_be_unlinked() {
    let (_disk, _afs, root) = fresh(16);

    assert_eq!(root.unlink("."), Err(Error::IsADirectory));
    assert_eq!(root.unlink(".."), Err(Error::IsADirectory));
    assert_eq!(root.lookup("."), Ok(1));
}

#[test]
fn inode_table_exhaustion() {
    let (_disk, afs, root) = fresh(16);

    for i in 0..INODE_COUNT - 2 {
        root.create(&format!("f{i}")).unwrap();
    }
    assert_eq!(root.create("extra").err(), Some(Error::SpaceExhausted));
    assert_eq!(afs.lock().statfs().free_inodes, 0);
    assert_counts_consistent(&afs);

    // 删掉一个后又能创建
    root.unlink("f7").unwrap();
    assert!(root.create("extra").is_ok());
}

#[test]
fn list_each_name_once_despite_gaps() {
    let (_disk, _afs, root) = fresh(16);
    for name in ["a", "b", "c", "d", "e"] {
        root.create(name).unwrap();
    }
    root.unlink("b").unwrap();
    root.unlink("d").unwrap();
    root.create("z").unwrap();

    assert_eq!(names(&root), [".", "..", "a", "c", "e", "z"]);

    let types: HashMap<String, DirEntryType> = root
        .list()
        .map(|entry| entry.unwrap())
        .map(|entry| (entry.name, entry.ty))
        .collect();
    assert_eq!(types["."], DirEntryType::Directory);
    assert_eq!(types["z"], DirEntryType::Regular);
}

#[test]
fn list_reports_inode_numbers() {
    let (_disk, _afs, root) = fresh(16);
    let file = root.create("n").unwrap();

    let entry = root
        .list()
        .map(|entry| entry.unwrap())
        .find(|entry| entry.name == "n")
        .unwrap();
    assert_eq!(entry.inode, file.inode_id() as u64);
}

#[test]
fn ls_at_cursor() {
    let (_disk, _afs, root) = fresh(16);
    for name in ["a", "b", "c"] {
        root.create(name).unwrap();
    }
    root.unlink("b").unwrap();

    let (entries, next) = root.ls_at(0, 3).unwrap();
    let got: Vec<_> = entries.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(got, [".", "..", "a"]);
    assert_eq!(next, 3);

    // 跳过 "b" 留下的空槽
    let (entries, next) = root.ls_at(next, 3).unwrap();
    let got: Vec<_> = entries.iter().map(|entry| entry.name.as_str()).collect();
    assert_eq!(got, ["c"]);
    assert_eq!(next, INODE_COUNT);

    let (entries, next) = root.ls_at(next, 3).unwrap();
    assert!(entries.is_empty());
    assert_eq!(next, INODE_COUNT);

    assert!(root.ls_at(100, 1).unwrap().0.is_empty());
}

#[test]
fn listing_restarts_from_zero() {
    let (_disk, _afs, root) = fresh(16);
    root.create("only").unwrap();

    let mut listing = root.list();
    assert_eq!(listing.by_ref().count(), 3);
    assert!(listing.next().is_none());
    assert_eq!(listing.position(), INODE_COUNT);

    assert_eq!(root.list().count(), 3);
}

#[test]
fn concurrent_creates_get_distinct_slots() {
    let (_disk, afs, root) = fresh(64);

    let ids: Vec<u32> = thread::scope(|s| {
        let handles: Vec<_> = (0..INODE_COUNT - 2)
            .map(|i| {
                let root = root.clone();
                s.spawn(move || {
                    let file = root.create(&format!("t{i}")).unwrap();
                    file.write(&common::pattern(1500), true).unwrap();
                    file.inode_id()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut sorted = ids.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), INODE_COUNT - 2);

    let stat = afs.lock().statfs();
    assert_eq!(stat.free_inodes, 0);
    assert_eq!(stat.free_blocks, stat.blocks - 2 * (INODE_COUNT as u64 - 2));
    assert_counts_consistent(&afs);
}
