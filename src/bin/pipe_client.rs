//! Connecting-side bootstrap driver.
//!
//! Connects to a listening peer, exchanges connection and region
//! descriptors, then drives the same verified two-stage pipeline as the
//! server driver. Exit code 0 on clean shutdown, 1 on setup or transport
//! failure.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use ringpipe::adapter::{RemoteWriteAdapter, SharedMemoryAdapter};
use ringpipe::pipe::{link_pair, ring_sink, ring_source, Pipe, Pipeline};
use ringpipe::remote::bootstrap::Bootstrap;
use ringpipe::remote::{AccessFlags, ExportDescriptor, LoopbackFabric, Region};
use ringpipe::ring::{channel, OverflowPolicy};

const PROTOCOL_BANNER: &[u8] = b"ringpipe-bootstrap-1";
const DEFAULT_TOTAL_BYTES: usize = 1 << 20;
const DEFAULT_WINDOW_BYTES: usize = 64 << 10;

/// Print usage and flag summary to stderr.
fn print_usage(exe: &std::ffi::OsStr) {
    eprintln!(
        "usage: {} [OPTIONS] <host> <port>

OPTIONS:
    --bytes <n>     total bytes to stream (default {})
    --window <n>    ring/window size in bytes, rounded to a power of two (default {})",
        exe.to_string_lossy(),
        DEFAULT_TOTAL_BYTES,
        DEFAULT_WINDOW_BYTES,
    );
}

struct Options {
    host: String,
    port: u16,
    total_bytes: usize,
    window_bytes: usize,
}

fn parse_args() -> Option<Options> {
    let mut args = env::args_os();
    let exe = args.next()?;
    let mut host: Option<String> = None;
    let mut port: Option<u16> = None;
    let mut total_bytes = DEFAULT_TOTAL_BYTES;
    let mut window_bytes = DEFAULT_WINDOW_BYTES;

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--bytes") => {
                total_bytes = args.next()?.to_str()?.parse().ok()?;
            }
            Some("--window") => {
                window_bytes = args.next()?.to_str()?.parse().ok()?;
            }
            Some(positional) if host.is_none() => host = Some(positional.to_string()),
            Some(positional) if port.is_none() => match positional.parse() {
                Ok(p) => port = Some(p),
                Err(_) => {
                    print_usage(&exe);
                    return None;
                }
            },
            _ => {
                print_usage(&exe);
                return None;
            }
        }
    }

    let (Some(host), Some(port)) = (host, port) else {
        print_usage(&exe);
        return None;
    };
    Some(Options {
        host,
        port,
        total_bytes,
        window_bytes: window_bytes.next_power_of_two(),
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Some(options) = parse_args() else {
        return ExitCode::from(1);
    };

    match run(&options) {
        Ok(()) => {
            println!("client: streamed {} bytes, stream verified", options.total_bytes);
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("client: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let mut bootstrap = Bootstrap::connect((options.host.as_str(), options.port))?;

    let peer_banner = bootstrap.exchange_blob(PROTOCOL_BANNER)?;
    if peer_banner != PROTOCOL_BANNER {
        return Err("peer speaks a different bootstrap protocol".into());
    }

    let fabric = LoopbackFabric::new();
    let staging = Region::zeroed(options.window_bytes, AccessFlags::FULL);
    let ours = fabric.register(&staging)?;
    let theirs: ExportDescriptor = bootstrap.exchange_region(&ours)?;
    if theirs.len != ours.len {
        return Err(format!(
            "asymmetric window: ours {} bytes, peer {} bytes",
            ours.len, theirs.len
        )
        .into());
    }

    drive_pipeline(fabric, staging, options.total_bytes, options.window_bytes)
}

/// Two-stage pipeline over the fabric: source ring → staging region →
/// destination ring, verified byte for byte.
fn drive_pipeline(
    fabric: LoopbackFabric,
    staging: Region,
    total_bytes: usize,
    window_bytes: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    runtime.block_on(async move {
        let (mut produce, source_rx) = channel::<u8>(window_bytes, OverflowPolicy::Drop);
        let (sink_tx, mut consume) = channel::<u8>(window_bytes, OverflowPolicy::Drop);

        let (src_window, source_link) = ring_source(source_rx);
        let (dst_window, sink_link) = ring_sink(sink_tx);
        let sink_desc = fabric.register_span(dst_window, AccessFlags::FULL)?;
        let remote_sink = fabric.import(&sink_desc)?;

        let (mid_forward, mid_backward) = link_pair();
        let mut pipeline = Pipeline::new();
        pipeline.push_pipe(Box::new(Pipe::new(
            RemoteWriteAdapter::new(Arc::new(fabric.clone())),
            staging.span(),
            remote_sink,
            Box::new(sink_link),
            Box::new(mid_backward),
        )));
        pipeline.push_pipe(Box::new(Pipe::new(
            SharedMemoryAdapter::new(),
            src_window,
            staging.span(),
            Box::new(mid_forward),
            Box::new(source_link),
        )));

        let pattern = |i: usize| (i.wrapping_mul(31).wrapping_add(7)) as u8;
        let mut produced = 0usize;
        let mut consumed = 0usize;
        let mut out = vec![0u8; window_bytes];
        let mut passes = 0usize;
        let pass_budget = (total_bytes / window_bytes + 2) * 16;

        while consumed < total_bytes {
            while produced < total_bytes {
                let batch_len = (total_bytes - produced).min(4096);
                let batch: Vec<u8> = (produced..produced + batch_len).map(pattern).collect();
                let pushed = produce.try_push_bulk(&batch);
                produced += pushed;
                if pushed < batch.len() {
                    break;
                }
            }

            pipeline.progress().await?;

            let n = consume.try_pop_bulk(&mut out);
            for (offset, &byte) in out[..n].iter().enumerate() {
                let expected = pattern(consumed + offset);
                if byte != expected {
                    return Err(format!(
                        "corrupt byte at offset {}: got {byte:#04x}, expected {expected:#04x}",
                        consumed + offset
                    )
                    .into());
                }
            }
            consumed += n;

            passes += 1;
            if passes > pass_budget {
                return Err("pipeline stalled".into());
            }
        }
        Ok(())
    })
}
