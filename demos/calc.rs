//! Calculator service - server and client in one process.
//!
//! This example demonstrates:
//! - Registering typed handlers with the server builder
//! - Serving on a TCP listener
//! - Issuing calls from a client, including one that fails
//!
//! ```text
//! RUST_LOG=snowrpc=debug cargo run --example calc
//! ```

use serde::{Deserialize, Serialize};
use snowrpc::transport::Listener;
use snowrpc::{Client, Server, SnowError};
use tracing_subscriber::EnvFilter;

/// Arguments for the calculator methods.
#[derive(Serialize, Deserialize, Debug)]
struct Args {
    a: i64,
    b: i64,
}

/// Result of a calculator method.
#[derive(Serialize, Deserialize, Debug)]
struct Reply {
    c: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let server = Server::builder()
        .register("calc", "Add", |args: Args| async move {
            Ok(Reply { c: args.a + args.b })
        })
        .register("calc", "Div", |args: Args| async move {
            if args.b == 0 {
                return Err(SnowError::handler("division by zero"));
            }
            Ok(Reply { c: args.a / args.b })
        })
        .build()?;

    let listener = Listener::bind("tcp", "127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    tokio::spawn(async move { server.serve(listener).await });

    let client = Client::dial("tcp", &addr).await?;

    let sum: Reply = client.call("calc.Add", &Args { a: 1, b: 2 }).await?;
    println!("1 + 2 = {}", sum.c);

    match client.call::<_, Reply>("calc.Div", &Args { a: 1, b: 0 }).await {
        Ok(reply) => println!("1 / 0 = {}", reply.c),
        Err(e) => println!("1 / 0 failed: {}", e),
    }

    client.close().await?;
    Ok(())
}
