/*
 * Copyright 2019-2022 Wren Powell
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

// Every property is checked against each transport through the same function, since callers must
// not be able to tell the transports apart.

use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;

use sealed_store::store::{
    Backend, BlobId, BlobKey, BlobType, LocalConfig, Location, OpenBackend,
};
use sealed_store::Error;

use common::*;

mod common;

fn put_then_get_round_trips(location: &Location) -> anyhow::Result<()> {
    let mut backend = location.create()?;

    for kind in BlobType::ALL {
        let data = random_buffer();
        let key = BlobKey::new(kind, BlobId::hash(&data));
        backend.put(key, &data)?;
        assert_that(&backend.get(key)?).is_equal_to(&data);
    }

    let config = random_buffer();
    backend.put(BlobKey::Config, &config)?;
    assert_that(&backend.get(BlobKey::Config)?).is_equal_to(&config);

    Ok(())
}

fn get_missing_blob_errs(location: &Location) -> anyhow::Result<()> {
    let mut backend = location.create()?;
    let key = BlobKey::Data(BlobId::hash(b"Missing"));
    assert_that(&backend.get(key)).is_err_variant(Error::NotFound);
    assert_that(&backend.get(BlobKey::Config)).is_err_variant(Error::NotFound);
    Ok(())
}

fn put_twice_is_noop(location: &Location) -> anyhow::Result<()> {
    let mut backend = location.create()?;
    let data = random_buffer();
    let id = BlobId::hash(&data);

    backend.put(BlobKey::Snapshot(id), &data)?;
    backend.put(BlobKey::Snapshot(id), &data)?;

    let ids = backend
        .list(BlobType::Snapshot)?
        .collect::<sealed_store::Result<Vec<_>>>()?;
    assert_that(&ids).is_equal_to(&vec![id]);
    assert_that(&backend.get(BlobKey::Snapshot(id))?).is_equal_to(&data);
    Ok(())
}

fn list_returns_every_blob(location: &Location) -> anyhow::Result<()> {
    let mut backend = location.create()?;

    let mut expected = Vec::new();
    for _ in 0..5 {
        let data = random_buffer();
        let id = BlobId::hash(&data);
        backend.put(BlobKey::Data(id), &data)?;
        expected.push(id);
    }

    // Blobs of other types are listed separately.
    let index = random_buffer();
    backend.put(BlobKey::Index(BlobId::hash(&index)), &index)?;

    let actual = backend
        .list(BlobType::Data)?
        .collect::<sealed_store::Result<Vec<_>>>()?;
    assert_contains_all(actual, expected.clone());

    let removed = expected.pop().unwrap();
    backend.remove(BlobKey::Data(removed))?;

    let actual = backend
        .list(BlobType::Data)?
        .collect::<sealed_store::Result<Vec<_>>>()?;
    assert_that(&actual).has_length(4);
    assert_contains_all(actual, expected);

    Ok(())
}

fn list_empty_type(location: &Location) -> anyhow::Result<()> {
    let mut backend = location.create()?;
    for kind in BlobType::ALL {
        assert_that(&backend.list(kind)?.count()).is_equal_to(0);
    }
    Ok(())
}

fn remove_missing_blob_errs(location: &Location) -> anyhow::Result<()> {
    let mut backend = location.create()?;
    let key = BlobKey::Lock(BlobId::hash(b"Missing"));
    assert_that(&backend.remove(key)).is_err_variant(Error::NotFound);
    Ok(())
}

fn test_reports_existence(location: &Location) -> anyhow::Result<()> {
    let mut backend = location.create()?;
    let data = random_buffer();
    let key = BlobKey::Key(BlobId::hash(&data));

    assert_that(&backend.test(key)?).is_false();
    backend.put(key, &data)?;
    assert_that(&backend.test(key)?).is_true();
    backend.remove(key)?;
    assert_that(&backend.test(key)?).is_false();
    Ok(())
}

fn create_twice_errs(location: &Location) -> anyhow::Result<()> {
    let mut backend = location.create()?;
    backend.close()?;
    assert_that(&location.create()).is_err_variant(Error::AlreadyExists);
    Ok(())
}

fn open_missing_errs(location: &Location) -> anyhow::Result<()> {
    assert_that(&location.open()).is_err_variant(Error::NotFound);
    Ok(())
}

fn blobs_persist_across_sessions(location: &Location) -> anyhow::Result<()> {
    let data = random_buffer();
    let key = BlobKey::Data(BlobId::hash(&data));

    let mut backend = location.create()?;
    backend.put(key, &data)?;
    backend.close()?;

    let mut backend = location.open()?;
    assert_that(&backend.get(key)?).is_equal_to(&data);
    Ok(())
}

fn huge_blob_round_trips(location: &Location) -> anyhow::Result<()> {
    // Larger than the biggest frame the remote protocol accepts.
    let data = random_bytes(257 * 1024 * 1024);
    let key = BlobKey::Data(BlobId::hash(&data));

    let mut backend = location.create()?;
    backend.put(key, &data)?;
    assert_that(&(backend.get(key)? == data)).is_true();

    // The session is still usable afterwards.
    assert_that(&backend.test(key)?).is_true();
    backend.close()?;
    Ok(())
}

fn closed_backend_errs(location: &Location) -> anyhow::Result<()> {
    let mut backend = location.create()?;
    backend.close()?;
    backend.close()?;

    let key = BlobKey::Data(BlobId::hash(b"Data"));
    assert_that(&backend.get(key)).is_err_variant(Error::Closed);
    assert_that(&backend.put(key, b"Data")).is_err_variant(Error::Closed);
    assert_that(&backend.list(BlobType::Data).map(|_| ())).is_err_variant(Error::Closed);
    Ok(())
}

macro_rules! transport_tests {
    ($fixture:ident, $($name:ident),* $(,)?) => {
        $(
            #[rstest]
            fn $name($fixture: WithTempDir<Location>) -> anyhow::Result<()> {
                init_logging();
                super::$name(&$fixture)
            }
        )*
    };
}

mod local {
    use super::*;

    transport_tests!(
        local_location,
        put_then_get_round_trips,
        get_missing_blob_errs,
        put_twice_is_noop,
        list_returns_every_blob,
        list_empty_type,
        remove_missing_blob_errs,
        test_reports_existence,
        create_twice_errs,
        open_missing_errs,
        blobs_persist_across_sessions,
        huge_blob_round_trips,
        closed_backend_errs,
    );
}

#[cfg(all(unix, feature = "backend-remote"))]
mod remote {
    use super::*;

    transport_tests!(
        remote_location,
        put_then_get_round_trips,
        get_missing_blob_errs,
        put_twice_is_noop,
        list_returns_every_blob,
        list_empty_type,
        remove_missing_blob_errs,
        test_reports_existence,
        create_twice_errs,
        open_missing_errs,
        blobs_persist_across_sessions,
        huge_blob_round_trips,
        closed_backend_errs,
    );
}

#[rstest]
fn concurrent_puts_do_not_interfere(local_location: WithTempDir<Location>) -> anyhow::Result<()> {
    const WRITERS: usize = 8;

    local_location.create()?.close()?;
    let shared = Arc::new(random_buffer());
    let shared_id = BlobId::hash(&shared);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles = (0..WRITERS)
        .map(|_| {
            let config = LocalConfig::new(local_location.store_path());
            let shared = Arc::clone(&shared);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> sealed_store::Result<(BlobId, Vec<u8>)> {
                let mut backend = config.open()?;
                let own = random_buffer();
                let own_id = BlobId::hash(&own);
                barrier.wait();
                backend.put(BlobKey::Data(shared_id), &shared)?;
                backend.put(BlobKey::Data(own_id), &own)?;
                backend.close()?;
                Ok((own_id, own))
            })
        })
        .collect::<Vec<_>>();

    let mut expected = vec![(shared_id, shared.to_vec())];
    for handle in handles {
        expected.push(handle.join().unwrap()?);
    }

    let mut backend = local_location.open()?;
    let listed = backend
        .list(BlobType::Data)?
        .collect::<sealed_store::Result<Vec<_>>>()?;
    assert_that(&listed).has_length(WRITERS + 1);
    assert_contains_all(listed, expected.iter().map(|(id, _)| *id));
    for (id, data) in &expected {
        assert_that(&backend.get(BlobKey::Data(*id))?).is_equal_to(data);
    }

    let staged = fs::read_dir(local_location.store_path().join("tmp"))?.count();
    assert_that(&staged).is_equal_to(0);
    Ok(())
}

#[rstest]
fn local_and_remote_share_a_layout(local_location: WithTempDir<Location>) -> anyhow::Result<()> {
    let data = random_buffer();
    let key = BlobKey::Data(BlobId::hash(&data));

    let mut backend = local_location.create()?;
    backend.put(key, &data)?;
    backend.close()?;

    #[cfg(all(unix, feature = "backend-remote"))]
    {
        let remote = Location::Remote(local_server(&local_location.store_path()));
        let mut backend = remote.open()?;
        assert_that(&backend.get(key)?).is_equal_to(&data);
        backend.close()?;
    }

    Ok(())
}
