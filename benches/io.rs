/*
 * Copyright 2019-2020 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tempfile::tempdir;

use sealed_store::repo::{OpenOptions, ResourceLimit};
use sealed_store::store::{Backend, BlobId, BlobKey, LocalConfig, OpenBackend};

/// Return a buffer containing `size` random bytes for testing purposes.
pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut rng = SmallRng::from_entropy();
    let mut buffer = vec![0u8; size];
    rng.fill_bytes(&mut buffer);
    buffer
}

pub fn local_put(criterion: &mut Criterion) {
    let tmp_dir = tempdir().unwrap();
    let mut backend = LocalConfig::new(tmp_dir.path().join("store")).create().unwrap();
    let mut group = criterion.benchmark_group("Put a blob");

    for size in [4 * 1024, 256 * 1024, 4 * 1024 * 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(format!("of {} bytes", size), size, |bencher, size| {
            bencher.iter_batched(
                || {
                    let data = random_bytes(*size);
                    (BlobKey::Data(BlobId::hash(&data)), data)
                },
                |(key, data)| backend.put(key, &data).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
}

pub fn local_get(criterion: &mut Criterion) {
    let tmp_dir = tempdir().unwrap();
    let mut backend = LocalConfig::new(tmp_dir.path().join("store")).create().unwrap();
    let mut group = criterion.benchmark_group("Get a blob");

    for size in [4 * 1024, 256 * 1024, 4 * 1024 * 1024].iter() {
        let data = random_bytes(*size);
        let key = BlobKey::Data(BlobId::hash(&data));
        backend.put(key, &data).unwrap();

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_function(format!("of {} bytes", size), |bencher| {
            bencher.iter(|| backend.get(key).unwrap());
        });
    }
}

pub fn unlock(criterion: &mut Criterion) {
    let tmp_dir = tempdir().unwrap();
    let config = LocalConfig::new(tmp_dir.path().join("store"));
    OpenOptions::new()
        .memory_limit(ResourceLimit::Interactive)
        .operations_limit(ResourceLimit::Interactive)
        .create(&config, b"Password")
        .unwrap()
        .close()
        .unwrap();

    let mut group = criterion.benchmark_group("Unlock a repository");
    group.sample_size(10);
    group.bench_function("with interactive limits", |bencher| {
        bencher.iter(|| OpenOptions::new().open(&config, b"Password").unwrap());
    });
}

criterion_group!(io, local_put, local_get);
criterion_group!(repo, unlock);
criterion_main!(io, repo);
