use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use transporter::config::{ClientOptions, ServerOptions};
use transporter::error::Error;
use transporter::transport::{duplex_pair, Transport};
use transporter::value::Value;
use transporter::{create_module, use_module};

fn wire() -> (Arc<dyn transporter::transport::Transport>, Arc<dyn transporter::transport::Transport>) {
    let (server_side, client_side) = duplex_pair();
    (Arc::new(server_side), Arc::new(client_side))
}

#[tokio::test]
async fn round_trip_fidelity_for_plain_json_shapes() -> Result<()> {
    let (server_transport, client_transport) = wire();

    let export = Value::object([
        ("n".to_string(), Value::Number(6.0)),
        ("s".to_string(), Value::from("hi")),
        (
            "nested".to_string(),
            Value::object([("list".to_string(), Value::Array(vec![Value::Bool(true), Value::Null]))]),
        ),
    ]);

    let server = create_module(export, server_transport, ServerOptions::new("A"))?;
    let client = use_module(client_transport, ClientOptions::new("A", Duration::from_secs(2)));
    let root = client.root();

    assert_eq!(root.field("n").get().await?, Value::Number(6.0));
    assert_eq!(root.field("s").get().await?, Value::from("hi"));
    assert_eq!(
        root.field("nested").field("list").index(0).get().await?,
        Value::Bool(true)
    );

    client.release();
    server.release();
    Ok(())
}

#[tokio::test]
async fn remote_function_invocation_reaches_the_export() -> Result<()> {
    let (server_transport, client_transport) = wire();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_export = calls.clone();
    let export = Value::object([(
        "add".to_string(),
        Value::function(move |args| {
            calls_for_export.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let a = args.first().and_then(Value::as_f64).unwrap_or(0.0);
                let b = args.get(1).and_then(Value::as_f64).unwrap_or(0.0);
                Ok(Value::Number(a + b))
            })
        }),
    )]);

    let server = create_module(export, server_transport, ServerOptions::new("math"))?;
    let client = use_module(client_transport, ClientOptions::new("math", Duration::from_secs(2)));

    let result = client
        .root()
        .field("add")
        .apply(vec![Value::Number(2.0), Value::Number(3.0)])
        .await?;

    assert_eq!(result, Value::Number(5.0));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    client.release();
    server.release();
    Ok(())
}

#[tokio::test]
async fn callback_passed_as_an_argument_is_invoked_by_the_peer() -> Result<()> {
    let (server_transport, client_transport) = wire();

    let export = Value::object([(
        "call_with_one".to_string(),
        Value::function(|args| {
            Box::pin(async move {
                let Some(Value::Function(callback)) = args.into_iter().next() else {
                    return Ok(Value::Null);
                };
                callback(vec![Value::Number(1.0)]).await
            })
        }),
    )]);

    let server = create_module(export, server_transport, ServerOptions::new("A"))?;
    let client = use_module(client_transport, ClientOptions::new("A", Duration::from_secs(2)));

    let seen = Arc::new(AtomicUsize::new(0));
    let seen_for_callback = seen.clone();
    let callback = Value::function(move |args| {
        let seen = seen_for_callback.clone();
        Box::pin(async move {
            if let Some(n) = args.first().and_then(Value::as_f64) {
                seen.store(n as usize, Ordering::SeqCst);
            }
            Ok(Value::Null)
        })
    });

    client.root().field("call_with_one").apply(vec![callback]).await?;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    client.release();
    server.release();
    Ok(())
}

#[tokio::test]
async fn messages_on_an_unknown_scope_are_silently_dropped() -> Result<()> {
    let (server_transport, client_transport) = wire();

    let export = Value::object([("value".to_string(), Value::Number(1.0))]);
    let server = create_module(export, server_transport, ServerOptions::new("A"))?;

    // A client that never registers "A" as a consumer scope has no route to
    // receive a reply scoped to it, so the request must time out rather than
    // ever resolve with cross-talk from a namespace it didn't ask about.
    let client = use_module(client_transport, ClientOptions::new("B", Duration::from_millis(100)));
    let result = client.root().field("value").get().await;

    assert!(matches!(result, Err(Error::Timeout)));
    client.release();
    server.release();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn get_on_a_missing_path_replies_with_path_not_found() -> Result<()> {
    let (server_transport, client_transport) = wire();

    let server = create_module(Value::object([]), server_transport, ServerOptions::new("A"))?;
    let client = use_module(client_transport, ClientOptions::new("A", Duration::from_millis(50)));

    // The path is absent, so the server replies with an `error`, which the
    // client receives well inside the timeout window -- this is not the
    // timeout path, it's the ordinary error path.
    let result = client.root().field("missing").get().await;
    assert!(matches!(result, Err(Error::PathNotFound(_))));

    client.release();
    server.release();
    Ok(())
}

#[tokio::test]
async fn ping_succeeds_against_a_live_peer() -> Result<()> {
    let (server_transport, client_transport) = wire();

    let server = create_module(Value::Null, server_transport, ServerOptions::new("A"))?;
    let client = use_module(client_transport, ClientOptions::new("A", Duration::from_secs(2)));

    client.ping().await?;

    client.release();
    server.release();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn async_transparency_rejects_a_slow_call_past_its_timeout() -> Result<()> {
    let (server_transport, client_transport) = wire();

    let export = Value::object([(
        "slow".to_string(),
        Value::function(|_args| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(2000)).await;
                Ok(Value::from("ok"))
            })
        }),
    )]);

    let server = create_module(export, server_transport, ServerOptions::new("A"))?;
    let client = use_module(client_transport, ClientOptions::new("A", Duration::from_millis(1000)));

    let result = client.root().field("slow").apply(vec![]).await;
    assert!(matches!(result, Err(Error::Timeout)));

    client.release();
    server.release();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn async_transparency_resolves_a_slow_call_within_its_timeout() -> Result<()> {
    let (server_transport, client_transport) = wire();

    let export = Value::object([(
        "slow".to_string(),
        Value::function(|_args| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(2000)).await;
                Ok(Value::from("ok"))
            })
        }),
    )]);

    let server = create_module(export, server_transport, ServerOptions::new("A"))?;
    let client = use_module(client_transport, ClientOptions::new("A", Duration::from_millis(5000)));

    let result = client.root().field("slow").apply(vec![]).await?;
    assert_eq!(result, Value::from("ok"));

    client.release();
    server.release();
    Ok(())
}

#[tokio::test]
async fn garbage_collection_releases_a_callback_handle_and_allows_reinvocation() -> Result<()> {
    let (server_transport, client_transport) = wire();
    let mut server_inbound = server_transport.subscribe();

    // A function that returns a function -- the nested-callback shape spec
    // §8's GC scenario exercises.
    let export = Value::object([(
        "make_greeter".to_string(),
        Value::function(|_args| {
            Box::pin(async move { Ok(Value::function(|_args| Box::pin(async { Ok(Value::from("🥸")) }))) })
        }),
    )]);

    let server = create_module(export, server_transport, ServerOptions::new("A"))?;
    let client = use_module(client_transport, ClientOptions::new("A", Duration::from_secs(2)));

    let first = client.root().field("make_greeter").apply(vec![]).await?;
    let Value::Function(greeter) = first else {
        panic!("expected a function back");
    };
    drop(greeter);

    let mut saw_gc = false;
    while let Ok(payload) = server_inbound.recv().await {
        let message: codec::Message = serde_json::from_str(&payload).unwrap();
        if matches!(message.body, codec::Body::GarbageCollect { .. }) {
            saw_gc = true;
            break;
        }
    }
    assert!(saw_gc, "expected a garbage_collect message to reach the server");

    // Collecting one materialized instance doesn't poison the export itself:
    // a fresh call still resolves and the resulting callback still invokes.
    let second = client.root().field("make_greeter").apply(vec![]).await?;
    let Value::Function(greeter_again) = second else {
        panic!("expected a function back");
    };
    let result = greeter_again(vec![]).await?;
    assert_eq!(result, Value::from("🥸"));

    client.release();
    server.release();
    Ok(())
}

#[tokio::test]
async fn release_is_idempotent_on_both_sides() -> Result<()> {
    let (server_transport, client_transport) = wire();

    let server = create_module(Value::Null, server_transport, ServerOptions::new("A"))?;
    let client = use_module(client_transport, ClientOptions::new("A", Duration::from_secs(2)));

    client.release();
    client.release();
    server.release();
    server.release();
    Ok(())
}
