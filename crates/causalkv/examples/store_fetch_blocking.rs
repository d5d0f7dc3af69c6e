//! The same store/fetch/remove cycle from a thread without a runtime,
//! using the blocking facade and a blocking group to join a small fan-out.
//!
//! ```sh
//! cargo run --example store_fetch_blocking -- [host] [port]
//! ```

use causalkv::{BlockingClient, BlockingGroup};

fn main() -> causalkv::Result<()> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port: u16 = args.next().and_then(|p| p.parse().ok()).unwrap_or(8087);

    let client = BlockingClient::connect(host, port)?;

    // Fan three stores out over OS threads and join them with a group.
    let mut group = BlockingGroup::new();
    std::thread::scope(|scope| {
        for n in 0..3 {
            let token = group.token();
            let client = &client;
            scope.spawn(move || {
                let key = format!("key-{n}");
                if let Err(err) = client.store("my_bucket", key.as_str(), &b"hello"[..]) {
                    eprintln!("store {key} failed: {err}");
                }
                drop(token);
            });
        }
        group.wait();
    });
    println!("Stored three values.");

    let object = client.fetch("my_bucket", "key-0")?;
    println!("Fetched '{}'.", String::from_utf8_lossy(object.value()));

    for n in 0..3 {
        client.remove("my_bucket", format!("key-{n}"))?;
    }
    println!("Removed. Everything ok, clean exit.");

    client.close();
    Ok(())
}
