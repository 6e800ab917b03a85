use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Parser, builder::TypedValueParser};
use shadow_rs::shadow;
use shorty::{code, db::Db, render::Renderer};
use tracing_subscriber::EnvFilter;

shadow!(build);

#[derive(Parser, Debug)]
#[command(version = build::VERSION, long_version = build::CLAP_LONG_VERSION, about = "A small URL shortener", long_about = "")]
struct Args {
    #[arg(long, env = "HOST", default_value = "127.0.0.1:5000")]
    host: SocketAddr,
    /// directory holding shorty.db
    #[arg(long, env = "DATA_DIR", default_value = ".")]
    data_dir: PathBuf,
    /// keep links in memory only; everything is lost on exit
    #[arg(long, default_value_t = false)]
    in_memory: bool,
    #[arg(long, env = "TEMPLATES_DIR", default_value = "templates")]
    templates_dir: PathBuf,
    /// base url used for short links, e.g. https://sho.rt
    #[arg(long, env = "PUBLIC_URL")]
    public_url: Option<String>,
    #[arg(long, env = "CODE_LENGTH", default_value_t = code::DEFAULT_LENGTH, value_parser = clap::value_parser!(u8).range(4..=32).map(usize::from))]
    code_length: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // construct a subscriber that prints formatted traces to stdout
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    // use that subscriber to process traces emitted after this point
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    tracing::info!("{:?}", &args);

    // database config
    let db = if args.in_memory {
        tracing::warn!("using an in-memory database, links will not survive a restart");
        Db::in_memory()?
    } else {
        let db_path = args.data_dir.join("shorty.db");
        tracing::info!("sqlitedb: {}", db_path.display());
        Db::open(&db_path)? // we want this to fail loudly
    };

    let handlebars = shorty::render::load_templates(&args.templates_dir)?;

    let renderer = Renderer::new(&args.host.to_string(), db, handlebars)
        .with_public_url(args.public_url.clone())
        .with_code_length(args.code_length);
    let routes = shorty::routes::get_routes(renderer);

    tracing::info!("starting warp server: {}", &args.host);
    warp::serve(routes)
        .bind(args.host)
        .await
        .graceful(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to install CTRL+C signal handler: {e}");
                std::future::pending::<()>().await;
            }
        })
        .run()
        .await;

    tracing::info!("gracefully exited.");
    tokio::time::sleep(Duration::from_secs(1)).await;

    Ok(())
}
