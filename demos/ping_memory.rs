//! Channel RPC example using the in-memory transport.
//!
//! A background context serves channel `ext`; a popup calls into it, and the
//! background broadcasts to the active tabs. Everything runs in one process.
//!
//! Run with: RUST_LOG=chan_rpc=debug cargo run --example ping_memory

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chan_rpc::{
    BoxError, Method, RequesterBuilder, ResponderBuilder, Result, TargetQuery, TransportBuilder,
};
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

struct Add;

impl Method for Add {
    const NAME: &'static str = "add";
    type Args = (i32, i32);
    type Output = i32;
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    let background = TransportBuilder::new().node_id("background").build().await?;
    let popup = TransportBuilder::new().node_id("popup").build().await?;

    let responder = ResponderBuilder::new(background.clone())
        .channel("ext")
        .build()
        .await?;

    responder.handle("ping", |(): ()| async { Ok("pong") });
    responder.handle_method::<Add, _, _>(|(a, b)| async move { Ok(a + b) });
    responder.handle("divide", |(a, b): (i32, i32)| async move {
        if b == 0 {
            return Err::<i32, BoxError>("division by zero".into());
        }
        Ok(a / b)
    });

    let requester = RequesterBuilder::new(popup).channel("ext").build()?;

    let pong: String = requester.request("ping", ()).await?;
    println!("ping -> {pong}");

    let sum = requester.proxy().call::<Add>((20, 3)).await?;
    println!("20 + 3 = {sum}");

    match requester.request::<_, i32>("divide", (1, 0)).await {
        Ok(q) => println!("1 / 0 = {q}"),
        Err(err) => println!("1 / 0 failed: {err}"),
    }

    // Two tabs, one of them active
    let mut tabs = Vec::new();
    for (id, active) in [(1, true), (2, false)] {
        let transport = TransportBuilder::new()
            .node_id(format!("tab-{id}"))
            .endpoint(id)
            .active(active)
            .build()
            .await?;
        let tab = ResponderBuilder::new(transport).channel("ext").build().await?;
        tab.handle("refresh", move |(reason,): (String,)| async move {
            println!("tab {id} refreshing: {reason}");
            Ok(())
        });
        tabs.push(tab);
    }

    let broadcaster = RequesterBuilder::new(background.clone())
        .channel("ext")
        .broadcast(TargetQuery::new().active(true))
        .directory(background)
        .build()?;

    broadcaster.request::<_, ()>("refresh", ("settings changed",)).await?;

    // Broadcast returns once the sends are dispatched
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    responder.close();
    Ok(())
}
