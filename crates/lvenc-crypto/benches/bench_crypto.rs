use criterion::{criterion_group, criterion_main, Criterion};
use lvenc_crypto::{
    generate_keypair, public_key_to_address, sign_message, verify_signature, Network,
};

fn bench_sign_verify(c: &mut Criterion) {
    let keys = generate_keypair();
    let msg = [0xabu8; 32];
    let sig = sign_message(&msg, &keys.secret_key).unwrap();

    c.bench_function("ed25519_sign_32b", |b| {
        b.iter(|| sign_message(&msg, &keys.secret_key).unwrap())
    });
    c.bench_function("ed25519_verify_32b", |b| {
        b.iter(|| verify_signature(&msg, &sig, &keys.public_key))
    });
    c.bench_function("address_derive", |b| {
        b.iter(|| public_key_to_address(&keys.public_key, Network::Testnet))
    });
}

criterion_group!(benches, bench_sign_verify);
criterion_main!(benches);
