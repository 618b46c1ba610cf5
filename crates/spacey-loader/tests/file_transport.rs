// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loading module sources from disk

mod common;

use common::{TestHost, init_tracing};
use spacey_loader::{ConfigOptions, Definition, FileTransport, Loader, ModuleState, Value};
use std::fs;
use tempfile::TempDir;

/// Lay out `app/main.js` depending on `lib/util.js` below a fresh directory
fn project() -> (TempDir, TestHost) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("app")).unwrap();
    fs::create_dir_all(dir.path().join("vendor/util")).unwrap();
    fs::write(dir.path().join("app/main.js"), "main-source").unwrap();
    fs::write(dir.path().join("vendor/util/index.js"), "util-source").unwrap();

    let host = TestHost::new();
    host.script("main-source", |loader| {
        loader.define(
            Definition::new(Value::from("main"))
                .deps(["lib/util/index"])
                .exported(true),
        )?;
        Ok(())
    });
    host.script("util-source", |loader| {
        loader.define(Definition::new(Value::from("util")))?;
        Ok(())
    });
    (dir, host)
}

fn options() -> ConfigOptions {
    ConfigOptions::new().with_path("lib", "vendor/")
}

#[test]
fn test_sync_require_reads_files() {
    let (dir, host) = project();
    let loader =
        Loader::with_options(FileTransport::new(dir.path()), host.clone(), options()).unwrap();

    let values = loader.require_sync(&["app/main"]).unwrap();
    assert_eq!(values[0].as_str(), Some("main"));
    assert_eq!(loader.state_of("lib/util/index"), Some(ModuleState::Ready));
    assert_eq!(host.evaluations("lib/util/index.js"), 1);
    assert!(loader.globals().lookup("app.main").is_some());
}

#[test]
fn test_fetch_source_does_not_execute() {
    let (dir, host) = project();
    let loader =
        Loader::with_options(FileTransport::new(dir.path()), host.clone(), options()).unwrap();

    let fetched = loader.fetch_source("lib/util/index").unwrap();
    assert_eq!(fetched.url, "vendor/util/index.js");
    assert_eq!(fetched.source, "util-source");
    assert_eq!(loader.state_of("lib/util/index"), None);
    assert_eq!(host.evaluations("lib/util/index.js"), 0);

    let err = loader.fetch_source("app/missing").unwrap_err();
    assert!(err.is_load_error());
}

#[tokio::test]
async fn test_async_require_reads_files() {
    let (dir, host) = project();
    let loader = Loader::with_options(
        FileTransport::new(dir.path()),
        host,
        options().with_async(true),
    )
    .unwrap();

    tokio::task::LocalSet::new()
        .run_until(async {
            let values = loader.require_async(&["app/main"]).await.unwrap();
            assert_eq!(values[0].as_str(), Some("main"));
        })
        .await;
}
