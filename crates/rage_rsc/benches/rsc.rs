use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

fn sample_arena(count: u32) -> (rage_rsc::ResourceArena, rage_rsc::BlockId) {
    use rage_rsc::{DataBlock, Heap, PointerList64, ResourceArena};

    let mut arena = ResourceArena::new();
    let buffers = (0..count)
        .map(|i| {
            let data = vec![i as u8; 512 + (i as usize * 97) % 4096];
            Some(arena.insert(DataBlock::new(Heap::Graphics, data)))
        })
        .collect();
    let list = PointerList64::new(&mut arena, buffers);
    let root = arena.insert(list);

    (arena, root.id())
}

pub mod layout {
    use divan::Bencher;
    use rage_rsc::{
        layout::{assign_positions, LayoutBlock},
        DataBlock, Heap, ResourceArena,
    };

    fn blocks(count: usize) -> Vec<LayoutBlock> {
        let mut arena = ResourceArena::new();
        (0..count)
            .map(|i| LayoutBlock {
                id: arena.insert(DataBlock::new(Heap::System, Vec::new())).id(),
                length: 16 + (i as u64 * 7919) % 6000,
            })
            .collect()
    }

    #[divan::bench(args = [16, 256, 2048])]
    fn assign(bencher: Bencher, count: usize) {
        bencher
            .with_inputs(|| blocks(count))
            .bench_refs(|blocks| divan::black_box(assign_positions(blocks, Heap::System).unwrap()));
    }
}

pub mod resource {
    use divan::Bencher;
    use rage_rsc::{build, load, BuildOptions, PointerList64, ResourceArena, StringBlock};

    #[divan::bench]
    fn build_compressed(bencher: Bencher) {
        bencher
            .with_inputs(|| super::sample_arena(64))
            .bench_local_refs(|(arena, root)| {
                divan::black_box(build(arena, *root, 1, BuildOptions::default()).unwrap());
            });
    }

    #[divan::bench]
    fn build_uncompressed(bencher: Bencher) {
        let options = BuildOptions::builder().compress(false).build();
        bencher
            .with_inputs(|| super::sample_arena(64))
            .bench_local_refs(|(arena, root)| {
                divan::black_box(build(arena, *root, 1, options).unwrap());
            });
    }

    #[divan::bench]
    fn load_strings(bencher: Bencher) {
        let mut arena = ResourceArena::new();
        let strings = (0..256)
            .map(|i| Some(arena.insert(StringBlock::new(format!("string_{}", i)))))
            .collect();
        let list = PointerList64::new(&mut arena, strings);
        let root = arena.insert(list);
        let data = build(&mut arena, root.id(), 1, BuildOptions::default()).unwrap();

        bencher.bench_local(|| {
            divan::black_box(load::<PointerList64<StringBlock>>(&data).unwrap());
        });
    }
}
