use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use stowage_core::{
    Bucket, Cancellable, CancellationToken, ObjectHeader, ObjectStore, Page, PutOptions,
    StoreError, StoreResult,
};
use stowage_fs::{FsObjectStore, FsStoreConfig};

use crate::cli::*;

/// Everything a command needs: the opened store plus the caller's
/// cancellation token and deadline.
struct Session {
    store: FsObjectStore,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    format: OutputFormat,
}

impl Session {
    /// Run `op` under Ctrl-C cancellation and the optional timeout.
    async fn run<T>(&self, op: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        let op = op.cancel_on(&self.cancel);
        match self.timeout {
            Some(limit) => op.timeout(limit).await,
            None => op.await,
        }
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    async fn bucket(&self, name: &str) -> anyhow::Result<std::sync::Arc<dyn Bucket>> {
        Ok(self.run(self.store.bucket(name)).await?)
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let store = FsObjectStore::open(config)
        .await
        .context("failed to open store")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let session = Session {
        store,
        cancel,
        timeout: cli.timeout.map(Duration::from_secs),
        format: cli.format,
    };

    match cli.command {
        Command::Mb(args) => cmd_mb(&session, args).await,
        Command::Rb(args) => cmd_rb(&session, args).await,
        Command::Buckets => cmd_buckets(&session).await,
        Command::Ls(args) => cmd_ls(&session, args).await,
        Command::Put(args) => cmd_put(&session, args).await,
        Command::Get(args) => cmd_get(&session, args).await,
        Command::Head(args) => cmd_head(&session, args).await,
        Command::Rm(args) => cmd_rm(&session, args).await,
    }
}

/// Config file first, then command-line overrides.
fn load_config(cli: &Cli) -> anyhow::Result<FsStoreConfig> {
    let mut config = match &cli.config {
        Some(path) => FsStoreConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FsStoreConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(page_size) = cli.page_size {
        config = config.with_max_keys(page_size);
    }
    Ok(config)
}

async fn cmd_mb(session: &Session, args: BucketArgs) -> anyhow::Result<()> {
    session.run(session.store.create_bucket(&args.bucket)).await?;
    if session.json() {
        println!("{}", json!({ "created": args.bucket }));
    } else {
        println!("{} Created bucket {}", "✓".green().bold(), args.bucket.yellow());
    }
    Ok(())
}

async fn cmd_rb(session: &Session, args: BucketArgs) -> anyhow::Result<()> {
    session.run(session.store.delete_bucket(&args.bucket)).await?;
    if session.json() {
        println!("{}", json!({ "deleted": args.bucket }));
    } else {
        println!("{} Removed bucket {}", "✓".green().bold(), args.bucket.yellow());
    }
    Ok(())
}

async fn cmd_buckets(session: &Session) -> anyhow::Result<()> {
    let buckets = session.run(session.store.list_buckets()).await?;
    if session.json() {
        let rows: Vec<_> = buckets
            .iter()
            .map(|b| {
                json!({
                    "name": b.name(),
                    "created": b.creation_time(),
                    "owner": b.owner(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if buckets.is_empty() {
        println!("No buckets.");
    }
    for bucket in &buckets {
        println!(
            "{}  {}",
            bucket.creation_time().format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            bucket.name().bold()
        );
    }
    Ok(())
}

async fn cmd_ls(session: &Session, args: LsArgs) -> anyhow::Result<()> {
    let mut rows = Vec::new();
    let next = walk_pages(session, &args, |page| {
        if session.json() {
            rows.push(page_json(page));
        } else {
            print_page(page);
        }
    })
    .await?;
    if session.json() {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if !next.is_empty() {
        println!("{} {}", "next token:".dimmed(), next);
    }
    Ok(())
}

/// Fetch pages starting at `args.token`, following continuation tokens when
/// `args.all` is set. Returns the token after the last page fetched.
async fn walk_pages(
    session: &Session,
    args: &LsArgs,
    mut visit: impl FnMut(&Page),
) -> anyhow::Result<String> {
    let bucket = session.bucket(&args.bucket).await?;
    let mut token = args.token.clone();
    loop {
        let page = session
            .run(bucket.object_page(&args.prefix, &args.delimiter, &token))
            .await?;
        visit(&page);
        token = page.next_page().to_string();
        if token.is_empty() || !args.all {
            return Ok(token);
        }
    }
}

async fn cmd_put(session: &Session, args: PutArgs) -> anyhow::Result<()> {
    let bucket = session.bucket(&args.bucket).await?;
    let mut file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("failed to open {}", args.file.display()))?;

    let mut options = PutOptions::default();
    if let Some(content_type) = args.content_type {
        options = options.with_mime_type(content_type);
    }
    for (key, value) in args.metadata {
        options = options.with_metadata(key, value);
    }

    session
        .run(bucket.put_with(&args.key, &mut file, &options))
        .await?;
    let header = session.run(bucket.head(&args.key)).await?;
    if session.json() {
        println!("{}", serde_json::to_string_pretty(&header)?);
    } else {
        println!(
            "{} Stored {}/{} ({} bytes, etag {})",
            "✓".green().bold(),
            args.bucket.yellow(),
            args.key.bold(),
            header.size,
            header.etag_hex().cyan()
        );
    }
    Ok(())
}

async fn cmd_get(session: &Session, args: GetArgs) -> anyhow::Result<()> {
    let bucket = session.bucket(&args.bucket).await?;
    let mut reader = session.run(bucket.get(&args.key)).await?;

    let copied = match &args.output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
            let copy = async {
                tokio::io::copy(&mut reader, &mut file)
                    .await
                    .map_err(StoreError::from)
            };
            session.run(copy).await?
        }
        None => {
            let mut stdout = tokio::io::stdout();
            let copy = async {
                tokio::io::copy(&mut reader, &mut stdout)
                    .await
                    .map_err(StoreError::from)
            };
            session.run(copy).await?
        }
    };
    tracing::debug!(bucket = %args.bucket, key = %args.key, bytes = copied, "downloaded object");

    if let Some(path) = &args.output {
        if session.json() {
            println!("{}", json!({ "key": args.key, "bytes": copied, "path": path }));
        } else {
            println!(
                "{} Wrote {} bytes to {}",
                "✓".green().bold(),
                copied,
                path.display()
            );
        }
    }
    Ok(())
}

async fn cmd_head(session: &Session, args: ObjectArgs) -> anyhow::Result<()> {
    let bucket = session.bucket(&args.bucket).await?;
    let header = session.run(bucket.head(&args.key)).await?;
    if session.json() {
        println!("{}", serde_json::to_string_pretty(&header)?);
    } else {
        print_header(&header);
    }
    Ok(())
}

async fn cmd_rm(session: &Session, args: ObjectArgs) -> anyhow::Result<()> {
    let bucket = session.bucket(&args.bucket).await?;
    session.run(bucket.delete(&args.key)).await?;
    if session.json() {
        println!("{}", json!({ "deleted": args.key }));
    } else {
        println!("{} Deleted {}/{}", "✓".green().bold(), args.bucket.yellow(), args.key.bold());
    }
    Ok(())
}

fn page_json(page: &Page) -> serde_json::Value {
    let objects: Vec<_> = page
        .objects()
        .iter()
        .map(|o| {
            json!({
                "key": o.key(),
                "size": o.size(),
                "modified": o.mod_time(),
                "etag": hex::encode(o.etag()),
                "storage_class": o.storage_class(),
            })
        })
        .collect();
    json!({
        "objects": objects,
        "prefixes": page.prefixes(),
        "next_page": page.next_page(),
    })
}

fn print_page(page: &Page) {
    for prefix in page.prefixes() {
        println!("{:>30}  {}", "PRE".blue(), prefix.blue());
    }
    for object in page.objects() {
        println!(
            "{}  {:>10}  {}",
            object.mod_time().format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            object.size(),
            object.key()
        );
    }
}

fn print_header(header: &ObjectHeader) {
    println!("{}/{}", header.bucket.yellow(), header.key.bold());
    println!("  Size: {}", header.size);
    println!("  Content-Type: {}", header.mime_type);
    println!("  ETag: {}", header.etag_hex().cyan());
    println!("  Modified: {}", header.mod_time);
    println!("  Accessed: {}", header.access_time);
    println!("  Storage class: {}", header.storage_class);
    if !header.version.is_empty() {
        println!("  Version: {}", header.version);
    }
    if !header.redirect.is_empty() {
        println!("  Redirect: {}", header.redirect);
    }
    if let Some(sse) = &header.server_side_encryption {
        println!("  Encryption: {}", sse.algorithm);
    }
    for (key, value) in &header.metadata {
        println!("  {}: {}", key.dimmed(), value);
    }
}
