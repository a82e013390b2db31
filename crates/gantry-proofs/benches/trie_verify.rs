use alloy_primitives::keccak256;
use criterion::{criterion_group, criterion_main, Criterion};
use gantry_proofs::fixtures::{storage_word_body, TrieBuilder};
use gantry_proofs::verify_inclusion;

fn bench_verify_inclusion(c: &mut Criterion) {
    // A storage trie with 256 hashed slots, proving one of them.
    let mut builder = TrieBuilder::new();
    let mut target_key = [0u8; 32];
    for i in 0..256u16 {
        let key: [u8; 32] = keccak256(i.to_be_bytes()).0;
        let mut word = [0u8; 32];
        word[30..].copy_from_slice(&i.to_be_bytes());
        builder.insert(key.to_vec(), storage_word_body(&word));
        if i == 137 {
            target_key = key;
        }
    }
    let built = builder.build();
    let proof = built.proof(&target_key).expect("key present");

    c.bench_function("verify_inclusion/256-slot trie", |b| {
        b.iter(|| verify_inclusion(&built.root, &target_key, &proof).expect("valid proof"));
    });
}

criterion_group!(benches, bench_verify_inclusion);
criterion_main!(benches);
