use std::net::SocketAddr;

use ingestbench_testserver::{TestServerOptions, TestServerStats};
use tokio::net::TcpListener;
use tokio::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut options = TestServerOptions::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--api-key" => {
                options.api_key = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--api-key requires a value"))?;
            }
            "--fail-every" => {
                let n = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--fail-every requires a count"))?;
                options.fail_every = Some(n.parse()?);
            }
            "--delay-ms" => {
                let ms = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--delay-ms requires milliseconds"))?;
                options.delay = Some(Duration::from_millis(ms.parse()?));
            }
            "-h" | "--help" => {
                eprintln!(
                    "ingestbench-testserver\n\nUSAGE:\n  ingestbench-testserver [--bind 127.0.0.1:0] [--api-key KEY] [--fail-every N] [--delay-ms MS]\n\nOUTPUT:\n  Prints INGEST_URL=<url> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let stats = TestServerStats::default();
    let app = ingestbench_testserver::router(stats.clone(), options);

    println!("INGEST_URL=http://{addr}");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });

    serve.await?;

    eprintln!(
        "requests={} accepted={} metric_records={} log_records={} data_records={}",
        stats.requests_total(),
        stats.accepted_total(),
        stats.metric_records(),
        stats.log_records(),
        stats.data_records()
    );
    Ok(())
}
