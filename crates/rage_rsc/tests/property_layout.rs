use proptest::prelude::*;
use rage_rsc::{
    build, read_header,
    layout::{assign_positions, LayoutBlock, ALIGN_SIZE},
    BlockId, BuildOptions, DataBlock, Heap, PointerList64, ResourceArena,
};

fn layout_blocks(lengths: &[u64]) -> Vec<LayoutBlock> {
    let mut arena = ResourceArena::new();
    lengths
        .iter()
        .map(|length| LayoutBlock {
            id: BlockId::from(arena.insert(DataBlock::new(Heap::System, Vec::new()))),
            length: *length,
        })
        .collect()
}

fn check_layout(lengths: &[u64], heap: Heap) -> Result<(), TestCaseError> {
    let blocks = layout_blocks(lengths);
    let layout = assign_positions(&blocks, heap)
        .map_err(|e| TestCaseError::fail(format!("layout failed: {}", e)))?;

    prop_assert_eq!(layout.positions.len(), blocks.len());
    prop_assert_eq!(layout.flags.count() as usize, layout.flags.pages().len());
    prop_assert!(layout.flags.size() >= layout.used);

    if heap == Heap::System {
        prop_assert_eq!(layout.positions[0], (blocks[0].id, 0));
    }

    let pages = layout.flags.pages();
    let mut spans = Vec::with_capacity(blocks.len());
    for (id, offset) in &layout.positions {
        let length = lengths[id.index()];
        prop_assert_eq!(offset % ALIGN_SIZE, 0, "block {} is not aligned", id);
        prop_assert!(
            pages
                .iter()
                .any(|page| *offset >= page.offset && offset + length <= page.offset + page.size),
            "block {} at {:#X} of length {} crosses a page boundary",
            id,
            offset,
            length
        );
        spans.push((*offset, offset + length));
    }

    spans.sort();
    for pair in spans.windows(2) {
        prop_assert!(pair[0].1 <= pair[1].0, "blocks overlap: {:?}", pair);
    }

    Ok(())
}

proptest! {
    #[test]
    fn prop_system_layout_is_valid(lengths in prop::collection::vec(1u64..40_000, 1..60)) {
        check_layout(&lengths, Heap::System)?;
    }

    #[test]
    fn prop_graphics_layout_is_valid(lengths in prop::collection::vec(16u64..200_000, 1..40)) {
        check_layout(&lengths, Heap::Graphics)?;
    }

    #[test]
    fn prop_many_small_blocks(count in 1usize..600, length in 16u64..512) {
        check_layout(&vec![length; count], Heap::System)?;
    }

    #[test]
    fn prop_buffers_fit_graphics_pages(
        buffers in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..5000), 1..20)
    ) {
        let mut arena = ResourceArena::new();
        let handles = buffers
            .iter()
            .map(|data| Some(arena.insert(DataBlock::new(Heap::Graphics, data.clone()))))
            .collect();
        let root = PointerList64::new(&mut arena, handles);
        let root = arena.insert(root);

        let data = build(&mut arena, root.id(), 5, BuildOptions::default())
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let header = read_header(&data).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(header.flags_version(), 5);

        // DataBlock lengths are not stored in the resource, so only the page layout is checked
        let heap_size = header.graphics_page_flags().size();
        let total: u64 = buffers.iter().map(|b| b.len() as u64).sum();
        prop_assert!(heap_size >= total);
    }
}
