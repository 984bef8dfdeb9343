use std::sync::Arc;

use clap::Parser;
use glance::{
    BertEmbedder,
    ModelManager,
    cli::{Cli, Command, EmbedArgs, GlanceArgs, ServeArgs},
    error,
    model_manager,
    output,
    server::{self, ServerState},
    source::{self, ContentSource, FileRef, ResolvedContent, SourcegraphClient},
};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("GLANCE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match &cli.command {
        Command::Glance(args) => cmd_glance(&cli, args),
        Command::Serve(args) => cmd_serve(&cli, args),
        Command::Completions(args) => {
            args.generate();
            Ok(())
        }
    }
}

fn runtime() -> error::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn load_embedder(cli: &Cli, embed: &EmbedArgs) -> error::Result<BertEmbedder> {
    let manager = match &cli.model {
        Some(model) => ModelManager::with_model_id(model.clone()),
        None => ModelManager::new(),
    };

    let mut config = manager.config().clone();
    config.batch_size = embed.batch_size;
    config.passage_prefix = embed.prefix.clone();
    if let Some(max_seq_length) = embed.max_seq_length {
        config.max_seq_length = max_seq_length;
    }

    manager
        .with_device(model_manager::parse_device(&cli.device)?)
        .with_config(config)
        .load()
}

fn cmd_glance(cli: &Cli, args: &GlanceArgs) -> error::Result<()> {
    if args.window_size == 0 {
        return Err(error::Error::InvalidInput(
            "--window-size must be positive".into(),
        ));
    }

    // Resolve the file before paying for the model load.
    let ResolvedContent { content, .. } = match FileRef::parse(&args.file)? {
        FileRef::Local(path) => source::read_local(&path)?,
        FileRef::Sourcegraph(file) => {
            runtime()?.block_on(SourcegraphClient::new().resolve(&file))?
        }
    };
    if content.trim().is_empty() {
        return Err(error::Error::InvalidInput(format!(
            "{} is empty",
            args.file
        )));
    }

    let embedder = load_embedder(cli, &args.embed)?;
    let windows = glance::glance::glance(&embedder, &content, args.window_size)?;

    let mut stdout = std::io::stdout().lock();
    if args.json {
        output::write_json(&mut stdout, &windows)
    } else {
        output::write_human(&mut stdout, &windows, args.top)
    }
}

fn cmd_serve(cli: &Cli, args: &ServeArgs) -> error::Result<()> {
    if args.window_size == 0 {
        return Err(error::Error::InvalidInput(
            "--window-size must be positive".into(),
        ));
    }

    let embedder = Arc::new(load_embedder(cli, &args.embed)?);
    let state = ServerState::new(
        embedder,
        SourcegraphClient::new(),
        args.window_size,
        args.cache_capacity,
    );

    runtime()?.block_on(server::serve(args.bind, state))
}
