use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vtable_probe::config::Config;
use vtable_probe::host::mock::MockHost;
use vtable_probe::{Address, AddressResolver, ModuleAttributor, ModuleInfo, Protection};

const BASE: usize = 0x0040_0000;
const CONTEXT: usize = 0x00BF_7758;

fn target() -> MockHost {
    let host = MockHost::new(4);
    host.add_module(ModuleInfo::new("game.exe", Address::new(BASE), 0x00C0_0000));
    for i in 0..64 {
        let base = 0x6000_0000 + i * 0x10_0000;
        host.add_module(ModuleInfo::new(format!("dep{}.dll", i), Address::new(base), 0x8_0000));
    }
    host.map_region(CONTEXT, 0x10, Protection::READ_WRITE);
    host.write_pointer(CONTEXT + 8, 0x0300_0000);
    host.write_pointer(0x0300_0000, 0x0400_0000);
    host
}

fn benchmark_resolution(c: &mut Criterion) {
    let host = target();
    let layout = Config::default().layout;

    c.bench_function("resolve_chain", |b| {
        b.iter(|| {
            let resolver = AddressResolver::new(&host, &layout).unwrap();
            black_box(resolver.resolve(black_box(Address::new(BASE))).unwrap());
        });
    });

    c.bench_function("attribute_last_module", |b| {
        let attributor = ModuleAttributor::new(&host);
        b.iter(|| black_box(attributor.attribute(black_box(Address::new(0x63F0_0040))).unwrap()));
    });
}

criterion_group!(benches, benchmark_resolution);
criterion_main!(benches);
