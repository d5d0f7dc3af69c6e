//! Store, fetch, and remove one value. Run against a live store:
//!
//! ```sh
//! cargo run --example store_fetch -- [host] [port]
//! ```

use causalkv::Client;

#[tokio::main]
async fn main() -> causalkv::Result<()> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port: u16 = args.next().and_then(|p| p.parse().ok()).unwrap_or(8087);

    // DNS resolution and connection are lazy, so a bad host shows up as an
    // error on the first operation rather than here.
    let mut client = Client::new(host, port);

    client.store("my_bucket", "my_key", &b"hello"[..]).await?;
    println!("Stored 'hello'.");

    let object = client.fetch("my_bucket", "my_key").await?;
    println!("Fetched '{}'.", String::from_utf8_lossy(object.value()));

    client.remove_object(object).await?;
    println!("Removed.");

    client.shutdown().await;
    println!("Everything ok, clean exit.");
    Ok(())
}
