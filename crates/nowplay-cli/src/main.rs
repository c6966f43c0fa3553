use std::io;

use anyhow::Context;
use futures_util::StreamExt;
use nowplay_meta::icy;
use nowplay_meta::{MetaEvent, MetaWatcher, StrategyHint, StrategyKind, TitleStabilizer, WatchConfig};
use tokio_util::io::StreamReader;
use url::Url;

fn usage() -> ! {
    eprintln!("usage: nowplay peek <stream-url> [--blocks N]");
    eprintln!("       nowplay watch <stream-url> [--icy <stream-url> | --json <api-url>]");
    eprintln!();
    eprintln!("peek   dumps the ICY handshake and raw metadata blocks of a stream");
    eprintln!("watch  follows a stream through the full strategy chain and prints updates");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Allow RUST_LOG override; keep HTTP client internals quiet by default.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter.as_str())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        usage()
    };
    match command.as_str() {
        "peek" => {
            let (stream_url, blocks) = parse_peek_args(rest);
            peek(&stream_url, blocks).await
        }
        "watch" => {
            let (stream_url, hint) = parse_watch_args(rest);
            watch(&stream_url, hint).await
        }
        _ => usage(),
    }
}

fn parse_peek_args(rest: &[String]) -> (String, usize) {
    let mut stream_url = None;
    let mut blocks = 4usize;
    let mut it = rest.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--blocks" => match it.next().and_then(|n| n.parse().ok()) {
                Some(n) => blocks = n,
                None => usage(),
            },
            _ if stream_url.is_none() && !arg.starts_with('-') => {
                stream_url = Some(arg.clone());
            }
            _ => usage(),
        }
    }
    match stream_url {
        Some(url) => (url, blocks),
        None => usage(),
    }
}

fn parse_watch_args(rest: &[String]) -> (String, StrategyHint) {
    let mut stream_url = None;
    let mut hint = StrategyHint::default();
    let mut it = rest.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--icy" => match it.next() {
                Some(url) => hint = StrategyHint::icy(url),
                None => usage(),
            },
            "--json" => match it.next() {
                Some(url) => hint = StrategyHint::json(url),
                None => usage(),
            },
            _ if stream_url.is_none() && !arg.starts_with('-') => {
                stream_url = Some(arg.clone());
            }
            _ => usage(),
        }
    }
    match stream_url {
        Some(url) => (url, hint),
        None => usage(),
    }
}

// ── peek ─────────────────────────────────────────────────────────────────

/// Connects with the ICY handshake, prints the response headers and then a
/// handful of raw metadata blocks. Handy when a station misbehaves and the
/// question is "what is it actually sending".
async fn peek(stream_url: &str, blocks: usize) -> anyhow::Result<()> {
    let config = WatchConfig::default();
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(config.connect_timeout())
        .user_agent(&config.user_agent)
        .build()
        .context("failed to build http client")?;

    let resp = fetch_stream(&client, stream_url, config.redirect_limit).await?;

    println!("{:?} {}", resp.version(), resp.status());
    for (name, value) in resp.headers() {
        println!("{}: {}", name, String::from_utf8_lossy(value.as_bytes()));
    }

    let metaint_raw = resp
        .headers()
        .get(icy::ICY_METAINT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let Some(metaint) = icy::parse_metaint(metaint_raw) else {
        anyhow::bail!(
            "stream does not interleave metadata (no usable icy-metaint header); \
             try `nowplay watch` to search siblings and the status endpoint"
        );
    };
    println!();
    tracing::debug!("peek: reading {} blocks at interval {}", blocks, metaint);

    let chunks = resp
        .bytes_stream()
        .map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
    let mut reader = StreamReader::new(chunks);

    let mut shown = 0usize;
    while shown < blocks {
        icy::skip_audio(&mut reader, metaint).await?;
        let Some(raw) = icy::read_raw_block(&mut reader).await? else {
            // zero-length keep-alive block
            continue;
        };
        shown += 1;
        let text = String::from_utf8_lossy(&raw);
        println!("[block {shown}] raw: {}", text.trim_end_matches('\0'));
        let title = icy::extract_stream_title(&raw);
        if title.is_empty() {
            println!("[block {shown}] no StreamTitle");
        } else {
            println!("[block {shown}] title: {title}");
        }
    }
    Ok(())
}

/// GET with the ICY handshake header, following redirects by hand so the
/// header is sent again on every hop.
async fn fetch_stream(
    client: &reqwest::Client,
    stream_url: &str,
    redirect_limit: usize,
) -> anyhow::Result<reqwest::Response> {
    let mut current = stream_url.to_string();
    for _ in 0..=redirect_limit {
        let resp = client
            .get(&current)
            .header(icy::ICY_METADATA, "1")
            .send()
            .await
            .with_context(|| format!("request to {current} failed"))?;
        if !resp.status().is_redirection() {
            return Ok(resp);
        }
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .context("redirect without a location header")?;
        let next = match Url::parse(location) {
            Ok(absolute) => absolute.to_string(),
            Err(_) => Url::parse(&current)?.join(location)?.to_string(),
        };
        println!("-> {} {}", resp.status().as_u16(), next);
        current = next;
    }
    anyhow::bail!("stopped after {redirect_limit} redirects");
}

// ── watch ────────────────────────────────────────────────────────────────

/// Runs the full strategy chain and prints everything as it happens: raw
/// title updates, the strategy the session settled on, and titles that
/// survived the stabilizer window.
async fn watch(stream_url: &str, hint: StrategyHint) -> anyhow::Result<()> {
    let config = WatchConfig::default();
    let (stabilizer, mut stable) = TitleStabilizer::new(config.stable_window());
    let watcher = MetaWatcher::with_config(config);
    let mut session = watcher.watch(stream_url, hint);

    let mut last_station = String::new();
    loop {
        tokio::select! {
            event = session.recv() => match event {
                Some(MetaEvent::Update(info)) => {
                    if !info.station.is_empty() && info.station != last_station {
                        last_station = info.station.clone();
                        if info.description.is_empty() {
                            println!("{}  station   {}", now(), info.station);
                        } else {
                            println!("{}  station   {} ({})", now(), info.station, info.description);
                        }
                    }
                    if !info.title.is_empty() {
                        println!("{}  title     {}", now(), info.title);
                        stabilizer.offer(&info.title).await;
                    }
                }
                Some(MetaEvent::Resolved(resolved)) => {
                    println!("{}  strategy  {} {}", now(), kind_label(&resolved), resolved.url);
                }
                None => {
                    tracing::debug!("watch: session closed");
                    println!("{}  stream ended", now());
                    return Ok(());
                }
            },
            title = stable.recv() => {
                if let Some(title) = title {
                    println!("{}  stable    {}", now(), title);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                session.stop().await;
                println!("{}  stopped", now());
                return Ok(());
            }
        }
    }
}

fn kind_label(hint: &StrategyHint) -> &'static str {
    match hint.kind {
        Some(StrategyKind::Icy) => "ICY",
        Some(StrategyKind::Json) => "JSON",
        None => "unresolved",
    }
}

fn now() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
