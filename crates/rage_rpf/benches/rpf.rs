use divan::AllocProfiler;

#[global_allocator]
static ALLOC: AllocProfiler = AllocProfiler::system();

fn main() {
    divan::main();
}

fn sample_archive(count: usize) -> rage_rpf::RpfFile<std::io::Cursor<Vec<u8>>> {
    use rage_rpf::{ArchiveOptions, RpfFile};

    let mut rpf =
        RpfFile::new(std::io::Cursor::new(Vec::new()), "bench.rpf", ArchiveOptions::default())
            .unwrap();
    let root = rpf.root_directory(rpf.root()).unwrap();
    for i in 0..count {
        let data = vec![i as u8; 300 + (i * 193) % 3000];
        rpf.create_file(root, &format!("file_{}.awc", i), &data, false)
            .unwrap();
    }
    rpf
}

pub mod insert {
    use divan::Bencher;

    #[divan::bench(args = [16, 128])]
    fn raw_files(bencher: Bencher, count: usize) {
        bencher.bench_local(|| divan::black_box(super::sample_archive(count)));
    }

    #[divan::bench]
    fn compressed_file(bencher: Bencher) {
        let text = "a line of text that compresses well\n".repeat(200);
        bencher
            .with_inputs(|| super::sample_archive(32))
            .bench_local_refs(|rpf| {
                let root = rpf.root_directory(rpf.root()).unwrap();
                divan::black_box(rpf.create_file(root, "notes.txt", text.as_bytes(), true).unwrap());
            });
    }
}

pub mod defragment {
    use divan::Bencher;

    #[divan::bench(args = [16, 128])]
    fn after_deleting_half(bencher: Bencher, count: usize) {
        bencher
            .with_inputs(|| {
                let mut rpf = super::sample_archive(count);
                for id in rpf.get_files(rpf.root(), "", false).unwrap().into_iter().step_by(2) {
                    rpf.delete_entry(id).unwrap();
                }
                rpf
            })
            .bench_local_refs(|rpf| rpf.defragment(rpf.root()).unwrap());
    }
}

pub mod read {
    use divan::Bencher;
    use rage_rpf::RpfFile;

    #[divan::bench]
    fn scan(bencher: Bencher) {
        let data = super::sample_archive(256).into_inner().into_inner();
        bencher.bench_local(|| {
            divan::black_box(RpfFile::read(std::io::Cursor::new(data.clone()), "bench.rpf").unwrap())
        });
    }
}
