//! Cryptographic operation benchmarks.
//!
//! Measures the per-connection handshake cost and per-record sealing cost.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use veil::crypto::{
    AeadKey, EphemeralSecret, KeyDerivation, PublicKey, RecordCipher, StaticSecret,
};
use veil::handshake::{build_frame, parse_frame, HandshakeServerConfig};

fn bench_p256_keygen(c: &mut Criterion) {
    c.bench_function("p256_keygen", |b| {
        b.iter(|| {
            let secret = EphemeralSecret::random().unwrap();
            black_box(PublicKey::from(&secret))
        })
    });
}

fn bench_p256_dh(c: &mut Criterion) {
    let alice_secret = StaticSecret::random().unwrap();
    let bob_secret = StaticSecret::random().unwrap();
    let bob_public = PublicKey::from(&bob_secret);

    c.bench_function("p256_dh", |b| {
        b.iter(|| black_box(alice_secret.diffie_hellman(&bob_public).unwrap()))
    });
}

fn bench_key_derivation(c: &mut Criterion) {
    let server_static = StaticSecret::random().unwrap();
    let client_ephemeral = EphemeralSecret::random().unwrap();
    let context = PublicKey::from(&client_ephemeral).to_bytes();
    let shared = client_ephemeral
        .diffie_hellman(&PublicKey::from(&server_static))
        .unwrap();

    let mut group = c.benchmark_group("key_derivation");
    for mode in [KeyDerivation::X963, KeyDerivation::Hkdf] {
        group.bench_function(mode.as_str(), |b| {
            b.iter(|| black_box(mode.derive(&shared, &context).unwrap()))
        });
    }
    group.finish();
}

fn bench_seal(c: &mut Criterion) {
    let cipher = RecordCipher::new(&AeadKey::from_bytes([0x42u8; 32]));
    let plaintext = vec![0u8; 16 * 1024];

    let mut group = c.benchmark_group("record_seal");
    group.throughput(Throughput::Bytes(plaintext.len() as u64));
    group.bench_function("16k", |b| b.iter(|| black_box(cipher.seal(&plaintext).unwrap())));
    group.finish();
}

fn bench_open(c: &mut Criterion) {
    let cipher = RecordCipher::new(&AeadKey::from_bytes([0x42u8; 32]));
    let plaintext = vec![0u8; 16 * 1024];
    let record = cipher.seal(&plaintext).unwrap();

    let mut group = c.benchmark_group("record_open");
    group.throughput(Throughput::Bytes(plaintext.len() as u64));
    group.bench_function("16k", |b| b.iter(|| black_box(cipher.open(&record).unwrap())));
    group.finish();
}

fn bench_full_handshake_crypto(c: &mut Criterion) {
    let config = HandshakeServerConfig::generate().unwrap();
    let server_public = config.public_key().clone();
    let chunk_size = config.chunk_size();
    let kdf = config.kdf();

    c.bench_function("full_handshake_crypto", |b| {
        b.iter(|| {
            // Client: ephemeral key, frame, agreement, derivation
            let client_ephemeral = EphemeralSecret::random().unwrap();
            let client_public = PublicKey::from(&client_ephemeral);
            let frame = build_frame(&client_public, chunk_size).unwrap();
            let context = client_public.to_bytes();
            let client_shared = client_ephemeral.diffie_hellman(&server_public).unwrap();
            let client_key = kdf.derive(&client_shared, &context).unwrap();

            // Server: parse, agreement, derivation
            let received = parse_frame(&frame, chunk_size).unwrap();
            let server_shared = config.static_secret().diffie_hellman(&received).unwrap();
            let server_key = kdf.derive(&server_shared, &received.to_bytes()).unwrap();

            black_box((client_key, server_key))
        })
    });
}

criterion_group!(
    benches,
    bench_p256_keygen,
    bench_p256_dh,
    bench_key_derivation,
    bench_seal,
    bench_open,
    bench_full_handshake_crypto,
);

criterion_main!(benches);
