use std::fs::OpenOptions;

use tracing_subscriber::EnvFilter;

use crate::prelude::*;

#[derive(Debug, clap::Parser)]
#[command(version, author, about)]
struct Opts {
    /// Log filter, using env_logger-like syntax
    #[arg(long, env = "RUST_LOG")]
    log_filter: Option<String>,

    /// File to append log output to, in addition to stdout
    #[arg(long, env, default_value = "bot.log")]
    log_file: PathBuf,

    /// Grafana Loki endpoint to use
    #[arg(long, env)]
    loki_endpoint: Option<Url>,

    /// Hint for the number of threads to use
    #[arg(short = 'j', long, env)]
    threads: Option<usize>,

    #[command(flatten)]
    client: crate::client::ClientOpts,
}

macro_rules! init_error {
    ($($args:tt)*) => ({
        ::tracing::error!($($args)*);
        ::std::process::exit(1);
    })
}

fn fmt_layer<S>() -> tracing_subscriber::fmt::Layer<S> {
    // configure log format here
    tracing_subscriber::fmt::layer()
}

fn load_env() -> Result {
    [
        ".env.local",
        if cfg!(debug_assertions) {
            ".env.dev"
        } else {
            ".env.prod"
        },
        ".env",
    ]
    .into_iter()
    .try_for_each(|p| match dotenvy::from_filename(p) {
        Ok(p) => {
            trace!("Loaded env from {p:?}");
            Ok(())
        },
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Error loading env from {p:?}")),
    })
}

/// Returns the Loki background task, if one was configured
#[instrument(name = "init_logger", skip_all)]
fn init_subscriber(opts: &Opts) -> Option<tracing_loki::BackgroundTask> {
    let log_filter = opts.log_filter.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_new(log_filter)
        .unwrap_or_else(|e| init_error!("Invalid log filter {log_filter:?}: {e}"));

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&opts.log_file)
        .unwrap_or_else(|e| init_error!("Error opening log file {:?}: {e}", opts.log_file));

    let (loki, task) = match opts.loki_endpoint {
        Some(ref endpoint) => {
            let hostname = hostname::get()
                .context("Error loading hostname")
                .and_then(|h| {
                    h.into_string()
                        .map_err(|s| anyhow!("Couldn't parse hostname {s:?}"))
                })
                .unwrap_or_else(|e| init_error!("Error getting system hostname: {e}"));

            let (layer, task) = tracing_loki::layer(
                endpoint.clone(),
                [
                    ("host".into(), hostname),
                    ("crate".into(), env!("CARGO_PKG_NAME").into()),
                ]
                .into_iter()
                .collect(),
                [].into_iter().collect(),
            )
            .unwrap_or_else(|err| init_error!(%err, "Error initializing Loki exporter"));

            (Some(layer), Some(task))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(loki)
        .with(
            fmt_layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .with(fmt_layer())
        .try_init()
        .unwrap_or_else(|e| init_error!("Error initializing logger: {e}"));

    task
}

fn install_panic_hook() {
    let def = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |inf| {
        use std::any::Any;

        fn downcast(payload: &dyn Any) -> &str {
            if let Some(s) = payload.downcast_ref::<&'static str>() {
                return s;
            }

            if let Some(s) = payload.downcast_ref::<String>() {
                return s.as_str();
            }

            "Box<dyn Any>"
        }

        def(inf);

        let thread = std::thread::current();
        let location = inf.location().map_or_else(String::new, ToString::to_string);
        let payload = downcast(inf.payload());

        error!(name = thread.name(), payload, %location, "Thread panicked!");
    }));
}

#[inline]
pub fn main() {
    let tmp_logger =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(fmt_layer()));
    let span = error_span!("boot").entered();

    load_env().unwrap_or_else(|e| init_error!("Error loading .env files: {e:?}"));

    let opts: Opts = clap::Parser::parse();
    drop(span);
    let span = error_span!("boot", ?opts).entered();

    let loki_task = init_subscriber(&opts);

    drop((span, tmp_logger));

    let rt = {
        let mut builder = tokio::runtime::Builder::new_multi_thread();

        if let Some(threads) = opts.threads {
            builder
                .worker_threads(threads)
                .max_blocking_threads(threads * 2);
        }

        builder
            .enable_all()
            .build()
            .unwrap_or_else(|e| init_error!("Async runtime setup error: {e}"))
    };

    install_panic_hook();

    if let Some(task) = loki_task {
        rt.spawn(task);
    }

    std::process::exit(match rt.block_on(run(opts)) {
        Ok(()) => 0,
        Err(e) => {
            error!("{e:?}");
            1
        },
    });
}

enum StopType {
    Signal(Result<&'static str>),
    Closed(Result<(), serenity::Error>),
}

/// Resolves with the name of the first shutdown signal received
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use futures_util::stream::FuturesUnordered;
    use tokio::signal::unix::{signal, SignalKind};

    let mut stream = [
        (SignalKind::hangup(), "SIGHUP"),
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::quit(), "SIGQUIT"),
        (SignalKind::terminate(), "SIGTERM"),
    ]
    .into_iter()
    .map(|(kind, name)| {
        signal(kind)
            .with_context(|| format!("Error hooking {name}"))
            .map(|mut s| async move {
                s.recv().await;
                name
            })
    })
    .collect::<Result<FuturesUnordered<_>>>()?;

    stream
        .next()
        .await
        .ok_or_else(|| anyhow!("Unexpected error from signal handler"))
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Error hooking Ctrl-C")?;

    Ok("^C")
}

#[inline]
#[instrument(level = "error", skip(opts))]
async fn run(opts: Opts) -> Result {
    let Opts {
        log_filter: _,
        log_file: _,
        loki_endpoint: _,
        threads: _,
        client,
    } = opts;

    let mut client = crate::client::build(client).await?;

    let ret = tokio::select! {
        s = shutdown_signal() => StopType::Signal(s),
        r = client.start() => StopType::Closed(r),
    };

    let shutdown = !matches!(ret, StopType::Closed(Err(_)));

    let ret = match ret {
        StopType::Signal(Ok(s)) => {
            warn!("{s} received, shutting down...");
            Ok(())
        },
        StopType::Signal(Err(e)) => Err(e),
        StopType::Closed(Ok(())) => Err(anyhow!("Client hung up unexpectedly")),
        StopType::Closed(Err(e)) => Err(e).context("Fatal client error occurred"),
    };

    if shutdown {
        client.shard_manager.shutdown_all().await;
    }

    ret
}
