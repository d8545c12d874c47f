use std::{collections::BTreeMap, io::Cursor};

use proptest::prelude::*;
use rage_rpf::{ArchiveId, ArchiveOptions, EntryId, EntryKind, RpfFile};

type MemoryRpf = RpfFile<Cursor<Vec<u8>>>;

/// Archives are addressed by slot: 0 is the top-level archive, the rest are nested in its root
#[derive(Debug, Clone)]
enum Op {
    Create { slot: usize, name: u8, size: usize, raw: bool },
    Delete(usize),
    Rename { index: usize, name: u8 },
    Directory { slot: usize, name: u8 },
    Archive(u8),
    Defragment(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (any::<usize>(), 0u8..24, 1usize..3000, any::<bool>())
            .prop_map(|(slot, name, size, raw)| Op::Create { slot, name, size, raw }),
        2 => any::<usize>().prop_map(Op::Delete),
        1 => (any::<usize>(), 0u8..24).prop_map(|(index, name)| Op::Rename { index, name }),
        2 => (any::<usize>(), 0u8..64).prop_map(|(slot, name)| Op::Directory { slot, name }),
        1 => (0u8..3).prop_map(Op::Archive),
        1 => any::<usize>().prop_map(Op::Defragment),
    ]
}

fn file_name(name: u8, raw: bool) -> String {
    format!("file_{}.{}", name, if raw { "awc" } else { "bin" })
}

fn fail(e: rage_rpf::error::Error) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

fn check_extents(rpf: &MemoryRpf, archive: ArchiveId) -> Result<(), TestCaseError> {
    let header_blocks = rpf.archive(archive).map_err(fail)?.header_block_count();
    let mut extents = rpf.extents(archive).map_err(fail)?;
    extents.sort_by_key(|extent| extent.offset);

    if let Some(first) = extents.first() {
        prop_assert!(first.offset >= header_blocks, "file inside the header: {:?}", first);
    }
    for pair in extents.windows(2) {
        prop_assert!(pair[0].end() <= pair[1].offset, "files overlap: {:?}", pair);
    }

    Ok(())
}

fn check_table(rpf: &MemoryRpf, archive: ArchiveId) -> Result<(), TestCaseError> {
    let all_entries = rpf.entries(archive).map_err(fail)?;
    prop_assert_eq!(
        all_entries.len(),
        rpf.archive(archive).map_err(fail)?.entry_count as usize
    );

    for id in all_entries {
        let Some(dir) = rpf.entry(*id).map_err(fail)?.directory() else {
            continue;
        };
        let start = dir.entries_index as usize;
        let end = start + dir.entries_count as usize;
        prop_assert!(end <= all_entries.len());

        let mut children: Vec<(String, EntryId)> = dir
            .directories
            .iter()
            .chain(&dir.files)
            .map(|child| Ok((rpf.entry(*child)?.name.clone(), *child)))
            .collect::<rage_rpf::error::Result<_>>()
            .map_err(fail)?;
        children.sort_by(|a, b| a.0.cmp(&b.0));

        let listed: Vec<EntryId> = children.into_iter().map(|(_, id)| id).collect();
        prop_assert_eq!(&all_entries[start..end], listed.as_slice());
    }

    Ok(())
}

/// A nested archive must start where its container's blocks start and fit inside them
fn check_container(rpf: &MemoryRpf, archive: ArchiveId) -> Result<(), TestCaseError> {
    let child = rpf.archive(archive).map_err(fail)?;
    let (Some(parent), Some(container)) = (child.parent, child.parent_entry) else {
        return Ok(());
    };
    let parent = rpf.archive(parent).map_err(fail)?;
    let container = rpf.entry(container).map_err(fail)?;

    let offset = container.file_offset().unwrap_or_default() as u64;
    prop_assert_eq!(child.start_pos, parent.start_pos + offset * 512);
    prop_assert!(child.file_size <= container.block_count() * 512);
    let EntryKind::Binary(stored) = &container.kind else {
        return Err(TestCaseError::fail("container is not a binary entry"));
    };
    prop_assert_eq!(stored.uncompressed_size as u64, child.file_size);

    Ok(())
}

fn check_all(rpf: &MemoryRpf, slots: &[ArchiveId]) -> Result<(), TestCaseError> {
    for archive in slots {
        check_extents(rpf, *archive)?;
        check_table(rpf, *archive)?;
        check_container(rpf, *archive)?;
    }
    Ok(())
}

fn run(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let mut rpf = RpfFile::new(Cursor::new(Vec::new()), "prop.rpf", ArchiveOptions::default())
        .map_err(fail)?;
    let mut slots = vec![rpf.root()];
    let mut slot_names = vec![String::new()];

    // (slot, file name) -> (entry, contents)
    let mut expected: BTreeMap<(usize, String), (EntryId, Vec<u8>)> = BTreeMap::new();

    for op in ops {
        match op {
            Op::Create { slot, name, size, raw } => {
                let slot = slot % slots.len();
                let name = file_name(name, raw);
                let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8 ^ size as u8).collect();
                let dir = rpf.root_directory(slots[slot]).map_err(fail)?;
                let id = rpf.create_file(dir, &name, &data, true).map_err(fail)?;
                expected.insert((slot, name), (id, data));
            }
            Op::Delete(index) => {
                if expected.is_empty() {
                    continue;
                }
                let key = expected.keys().nth(index % expected.len()).cloned().unwrap();
                let (id, _) = expected.remove(&key).unwrap();
                rpf.delete_entry(id).map_err(fail)?;
            }
            Op::Rename { index, name } => {
                if expected.is_empty() {
                    continue;
                }
                let (slot, old) = expected.keys().nth(index % expected.len()).cloned().unwrap();
                let new = file_name(name, old.ends_with(".awc"));
                if expected.contains_key(&(slot, new.clone())) {
                    continue;
                }
                let value = expected.remove(&(slot, old)).unwrap();
                rpf.rename_entry(value.0, &new).map_err(fail)?;
                expected.insert((slot, new), value);
            }
            Op::Directory { slot, name } => {
                let archive = slots[slot % slots.len()];
                let name = format!("dir_{}", name);
                if rpf.find_entry(archive, &name).map_err(fail)?.is_none() {
                    let dir = rpf.root_directory(archive).map_err(fail)?;
                    rpf.create_directory(dir, &name).map_err(fail)?;
                }
            }
            Op::Archive(name) => {
                let name = format!("nested_{}.rpf", name);
                if rpf.find_entry(rpf.root(), &name).map_err(fail)?.is_none() {
                    let dir = rpf.root_directory(rpf.root()).map_err(fail)?;
                    let child = rpf
                        .create_archive(dir, &name, ArchiveOptions::default())
                        .map_err(fail)?;
                    slots.push(child);
                    slot_names.push(name);
                }
            }
            Op::Defragment(slot) => rpf.defragment(slots[slot % slots.len()]).map_err(fail)?,
        }

        check_all(&rpf, &slots)?;
    }

    for ((slot, name), (id, data)) in &expected {
        let extracted = rpf.extract_file(*id).map_err(fail)?;
        prop_assert_eq!(extracted.as_ref(), Some(data), "contents of {}/{} changed", slot, name);
    }

    let mut rpf = RpfFile::read(Cursor::new(rpf.into_inner().into_inner()), "prop.rpf")
        .map_err(fail)?;

    let mut reread = vec![rpf.root()];
    for name in &slot_names[1..] {
        let found = rpf
            .children(rpf.root())
            .map_err(fail)?
            .iter()
            .copied()
            .find(|child| matches!(rpf.archive(*child), Ok(child) if &child.name == name));
        prop_assert!(found.is_some(), "{} is missing after reading back", name);
        reread.push(found.unwrap());
    }
    prop_assert_eq!(rpf.children(rpf.root()).map_err(fail)?.len(), slot_names.len() - 1);
    check_all(&rpf, &reread)?;

    for (slot, archive) in reread.iter().enumerate() {
        let files = expected.keys().filter(|(s, _)| *s == slot).count();
        let containers = if slot == 0 { slot_names.len() - 1 } else { 0 };
        prop_assert_eq!(
            rpf.get_files(*archive, "", false).map_err(fail)?.len(),
            files + containers
        );
    }
    for ((slot, name), (_, data)) in &expected {
        let id = rpf.find_entry(reread[*slot], name).map_err(fail)?;
        prop_assert!(id.is_some(), "{}/{} is missing after reading back", slot, name);
        let extracted = rpf.extract_file(id.unwrap()).map_err(fail)?;
        prop_assert_eq!(extracted.as_ref(), Some(data));
    }

    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_allocator_keeps_files_apart(ops in prop::collection::vec(op(), 1..60)) {
        run(ops)?;
    }
}

#[test]
fn inner_header_growth_moves_inner_files() -> Result<(), TestCaseError> {
    let mut ops = vec![
        Op::Archive(0),
        Op::Create { slot: 1, name: 0, size: 1500, raw: true },
        Op::Create { slot: 0, name: 1, size: 700, raw: true },
    ];
    ops.extend((0..60).map(|name| Op::Directory { slot: 1, name }));
    ops.push(Op::Delete(0));
    ops.push(Op::Defragment(0));
    ops.push(Op::Defragment(1));
    run(ops)
}
