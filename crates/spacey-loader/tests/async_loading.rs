// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loading in the asynchronous discipline

mod common;

use common::Fixture;
use spacey_loader::{
    ConfigOptions, Definition, Factory, LoaderError, ModuleState, Object, Payload, ScriptFault,
    Value,
};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::task::LocalSet;

fn async_fixture() -> Fixture {
    let fx = Fixture::new();
    fx.loader
        .configure(ConfigOptions::new().with_async(true))
        .unwrap();
    fx
}

/// Let spawned loader tasks run to quiescence
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_require_async_loads_dependency_chain() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.module("./app/main.js", |loader| {
                loader.define(
                    Definition::new(Factory::function(|args| {
                        let n = args[0].as_number().unwrap_or_default();
                        Ok(Value::from(n * 2.0))
                    }))
                    .deps(["./config"]),
                )?;
                Ok(())
            });
            fx.module("./app/config.js", |loader| {
                loader.define(Definition::new(Value::from(21.0)))?;
                Ok(())
            });

            let values = fx.loader.require_async(&["app/main"]).await.unwrap();
            assert_eq!(values[0].as_number(), Some(42.0));
            assert_eq!(fx.loader.state_of("app/config"), Some(ModuleState::Ready));
        })
        .await;
}

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.module("./shared.js", |loader| {
                loader.define(Definition::new(Value::Object(Object::new())))?;
                Ok(())
            });

            let first = fx.loader.require_async(&["shared"]);
            let second = fx.loader.require_async(&["shared"]);
            let (first, second) = futures::join!(first, second);

            assert!(first.unwrap()[0].same(&second.unwrap()[0]));
            assert_eq!(fx.transport.fetch_count("./shared.js"), 1);
            assert_eq!(fx.host.evaluations("shared.js"), 1);
        })
        .await;
}

#[tokio::test]
async fn test_async_cycle_yields_undefined() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            let seen = Rc::new(RefCell::new(None));

            fx.module("./a.js", |loader| {
                loader.define(Definition::new(Value::from("a")).deps(["b"]))?;
                Ok(())
            });
            let seen_in_b = seen.clone();
            fx.module("./b.js", move |loader| {
                let seen = seen_in_b.clone();
                loader.define(
                    Definition::new(Factory::function(move |args| {
                        *seen.borrow_mut() = Some(args[0].clone());
                        Ok(Value::from("b"))
                    }))
                    .deps(["a"]),
                )?;
                Ok(())
            });

            let values = fx.loader.require_async(&["a"]).await.unwrap();
            assert_eq!(values[0].as_str(), Some("a"));
            assert_eq!(seen.borrow().as_ref().map(Value::is_undefined), Some(true));
            assert_eq!(fx.loader.state_of("b"), Some(ModuleState::Ready));
        })
        .await;
}

#[tokio::test]
async fn test_missing_dependency_rejects_with_its_location() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.module("./a.js", |loader| {
                loader.define(Definition::new(Value::from(1.0)).deps(["b"]))?;
                Ok(())
            });

            let err = fx.loader.require_async(&["a"]).await.unwrap_err();
            assert!(err.is_load_error());
            assert!(err.to_string().contains("./b.js"));
            assert_eq!(err.module(), Some("a.js"));

            // One retry before giving up.
            assert_eq!(fx.transport.fetch_count("./b.js"), 2);
            assert_eq!(fx.loader.state_of("a"), Some(ModuleState::Failed));
        })
        .await;
}

#[tokio::test]
async fn test_failed_module_rejects_again_without_fetching() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.module("./a.js", |loader| {
                loader.define(Definition::new(Value::from(1.0)).deps(["b"]))?;
                Ok(())
            });

            let first = fx.loader.require_async(&["a"]).await.unwrap_err();
            let second = fx.loader.require_async(&["a"]).await.unwrap_err();
            assert_eq!(first.to_string(), second.to_string());
            assert_eq!(second.module(), Some("a.js"));

            let missing = fx.loader.require_async(&["b"]).await.unwrap_err();
            assert!(missing.is_load_error());

            assert_eq!(fx.transport.fetch_count("./a.js"), 1);
            assert_eq!(fx.transport.fetch_count("./b.js"), 2);
            assert_eq!(fx.host.evaluations("a.js"), 1);
        })
        .await;
}

#[tokio::test]
async fn test_late_fault_is_attributed_by_location() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            let blamed = Rc::new(RefCell::new(None));

            fx.module("./waiting.js", |loader| {
                loader.define(Definition::new(Value::from("waiting")).deps(["./gate"]))?;
                Ok(())
            });
            let sink = blamed.clone();
            fx.module("./gate.js", move |loader| {
                *sink.borrow_mut() =
                    loader.report_fault(Some("./waiting.js"), ScriptFault::new("timer threw"));
                loader.define(Definition::new(Value::from("gate")))?;
                Ok(())
            });

            let err = fx.loader.require_async(&["waiting"]).await.unwrap_err();
            assert_eq!(blamed.borrow().as_deref(), Some("waiting.js"));
            assert_eq!(err.module(), Some("waiting.js"));
            assert!(err.to_string().contains("timer threw"));

            settle().await;
            assert_eq!(fx.loader.state_of("gate"), Some(ModuleState::Ready));
            assert_eq!(fx.loader.state_of("waiting"), Some(ModuleState::Failed));
        })
        .await;
}

#[tokio::test]
async fn test_named_definition_makes_resource_an_alias() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.module("./facade.js", |loader| {
                loader.define(Definition::new(Value::Object(Object::new())).named("impl/real"))?;
                Ok(())
            });

            let facade = fx.loader.require_async(&["facade"]).await.unwrap();
            let real = fx.loader.require_async(&["impl/real"]).await.unwrap();
            assert!(facade[0].as_object().is_some());
            assert!(facade[0].same(&real[0]));
            assert_eq!(fx.transport.fetch_count("./impl/real.js"), 0);
            assert_eq!(fx.loader.state_of("facade"), Some(ModuleState::Ready));
        })
        .await;
}

#[tokio::test]
async fn test_declare_skips_module_being_loaded() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.module("./slow.js", |loader| {
                loader.define(Definition::new(Value::from("slow")))?;
                Ok(())
            });

            let pending = fx.loader.require_async(&["slow"]);
            assert_eq!(fx.loader.state_of("slow"), Some(ModuleState::Loading));
            assert!(!fx.loader.declare("slow").unwrap());

            let values = pending.await.unwrap();
            assert_eq!(values[0].as_str(), Some("slow"));
            assert!(!fx.loader.declare("slow").unwrap());
        })
        .await;
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.module("./flaky.js", |loader| {
                loader.define(Definition::new(Value::from("up")))?;
                Ok(())
            });
            fx.transport.fail_times("./flaky.js", 1);

            let values = fx.loader.require_async(&["flaky"]).await.unwrap();
            assert_eq!(values[0].as_str(), Some("up"));
            assert_eq!(fx.transport.fetch_count("./flaky.js"), 2);
        })
        .await;
}

#[tokio::test]
async fn test_retry_falls_back_to_normal_source() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.loader
                .configure(ConfigOptions::new().with_debug_sources(true))
                .unwrap();
            fx.module("./plain.js", |loader| {
                loader.define(Definition::new(Value::from("plain")))?;
                Ok(())
            });

            let values = fx.loader.require_async(&["plain"]).await.unwrap();
            assert_eq!(values[0].as_str(), Some("plain"));
            assert_eq!(fx.transport.fetch_count("./plain-dbg.js"), 1);
            assert_eq!(fx.transport.fetch_count("./plain.js"), 1);
        })
        .await;
}

#[tokio::test]
async fn test_top_level_definition_is_visible_to_require() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.loader
                .define(Definition::new(Value::from("inline")).named("inline"))
                .unwrap();
            assert_eq!(fx.loader.state_of("inline"), None);

            let values = fx.loader.require_async(&["inline"]).await.unwrap();
            assert_eq!(values[0].as_str(), Some("inline"));
            assert_eq!(fx.transport.total_fetches(), 0);
        })
        .await;
}

#[tokio::test]
async fn test_queue_timer_flushes_definitions() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.loader
                .define(Definition::new(Value::from(7.0)).named("later"))
                .unwrap();
            settle().await;

            assert_eq!(fx.loader.state_of("later"), Some(ModuleState::Ready));
            assert_eq!(fx.loader.probe("later").unwrap().as_number(), Some(7.0));
        })
        .await;
}

#[tokio::test]
async fn test_unowned_anonymous_definitions_are_ambiguous() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.loader.define(Definition::new(Value::from(1.0))).unwrap();
            fx.loader.define(Definition::new(Value::from(2.0))).unwrap();

            let errors = fx.loader.flush_definitions();
            assert_eq!(errors.len(), 2);
            assert!(matches!(
                &errors[0],
                LoaderError::AmbiguousDefinition { fallback, .. } if fallback == "~anonymous~1.js"
            ));
            settle().await;
            assert_eq!(fx.loader.probe("~anonymous~2").unwrap().as_number(), Some(2.0));
        })
        .await;
}

#[tokio::test]
async fn test_two_anonymous_definitions_in_one_resource() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.module("./x.js", |loader| {
                loader.define(Definition::new(Value::from("first")))?;
                loader.define(Definition::new(Value::from("second")))?;
                Ok(())
            });

            let values = fx.loader.require_async(&["x"]).await.unwrap();
            assert_eq!(values[0].as_str(), Some("first"));
            settle().await;

            let dump = fx.loader.dump(ModuleState::Ready);
            assert!(dump.find("~anonymous~1.js").is_some());
            assert_eq!(
                fx.loader.probe("~anonymous~1").unwrap().as_str(),
                Some("second")
            );
        })
        .await;
}

#[tokio::test]
async fn test_request_without_error_handler_does_not_fail_caller() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            assert!(fx.loader.request(&["nowhere"], None, None).is_ok());
            settle().await;
            assert_eq!(fx.loader.state_of("nowhere"), Some(ModuleState::Failed));
        })
        .await;
}

#[tokio::test]
async fn test_request_callbacks_run_after_settlement() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.loader
                .preload([("pre", Payload::Value(Value::from("loaded")))], None)
                .unwrap();

            let received = Rc::new(RefCell::new(None));
            let sink = received.clone();
            fx.loader
                .request(
                    &["pre"],
                    Some(Box::new(move |values: Vec<Value>| {
                        *sink.borrow_mut() = values.into_iter().next();
                    })),
                    None,
                )
                .unwrap();
            settle().await;

            let received = received.borrow();
            assert_eq!(received.as_ref().and_then(Value::as_str), Some("loaded"));
        })
        .await;
}

#[tokio::test]
async fn test_local_require_with_callback() {
    LocalSet::new()
        .run_until(async {
            let fx = async_fixture();
            fx.module("./lazy/part.js", |loader| {
                loader.define(Definition::new(Value::from("part")))?;
                Ok(())
            });

            let received = Rc::new(RefCell::new(None));
            let sink = received.clone();
            fx.loader
                .define(
                    Definition::new(Factory::function(move |args| {
                        let sink = sink.clone();
                        let callback = Value::function(move |values| {
                            *sink.borrow_mut() = values.first().cloned();
                            Ok(Value::Undefined)
                        });
                        let Some(require) = args[0].as_function().cloned() else {
                            return Err(ScriptFault::new("require missing"));
                        };
                        require.call(&[Value::array([Value::from("./part")]), callback])?;
                        Ok(Value::Null)
                    }))
                    .named("lazy/main")
                    .deps(["require"]),
                )
                .unwrap();

            fx.loader.require_async(&["lazy/main"]).await.unwrap();
            settle().await;
            assert_eq!(received.borrow().as_ref().and_then(Value::as_str), Some("part"));
        })
        .await;
}

#[test]
fn test_cannot_return_to_sync_discipline() {
    let fx = async_fixture();
    let err = fx
        .loader
        .configure(
            ConfigOptions::new()
                .with_async(false)
                .with_base_url("https://cdn.example.com/"),
        )
        .unwrap_err();

    assert!(matches!(err, LoaderError::Config(_)));
    assert!(fx.loader.is_async());
    assert_eq!(fx.loader.config().base_url, "./");
}

#[test]
fn test_define_without_runtime_stays_queued() {
    let fx = async_fixture();
    fx.loader
        .define(Definition::new(Value::from("queued")).named("outside"))
        .unwrap();
    assert_eq!(fx.loader.state_of("outside"), None);
    assert!(fx.loader.probe("outside").unwrap().is_undefined());
}
