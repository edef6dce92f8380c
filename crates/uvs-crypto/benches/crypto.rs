use uvs_crypto::{CryptoContext, MasterKey};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn context() -> CryptoContext {
    CryptoContext::from_master_key(&MasterKey::from_bytes([0xABu8; 32]), 32).unwrap()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_fingerprint(bencher: divan::Bencher, size: usize) {
    let ctx = context();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| ctx.fingerprint(divan::black_box(&data)));
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_encrypt(bencher: divan::Bencher, size: usize) {
    let ctx = context();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| ctx.encrypt(divan::black_box(&data)).unwrap());
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_decrypt(bencher: divan::Bencher, size: usize) {
    let ctx = context();
    let data = make_data(size);
    let encrypted = ctx.encrypt(&data).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| ctx.decrypt(divan::black_box(&encrypted)).unwrap());
}

fn main() {
    divan::main();
}
