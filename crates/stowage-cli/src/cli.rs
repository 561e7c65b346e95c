use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stow",
    about = "Stowage: bucket and object storage on local disk",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store root directory (overrides the config file)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Entries per listing page
    #[arg(long, global = true)]
    pub page_size: Option<usize>,

    /// Abort the operation after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Make a bucket
    Mb(BucketArgs),
    /// Remove an empty bucket
    Rb(BucketArgs),
    /// List buckets
    Buckets,
    /// List objects in a bucket
    Ls(LsArgs),
    /// Upload a file as an object
    Put(PutArgs),
    /// Download an object
    Get(GetArgs),
    /// Show object metadata
    Head(ObjectArgs),
    /// Delete an object
    Rm(ObjectArgs),
}

#[derive(Args)]
pub struct BucketArgs {
    pub bucket: String,
}

#[derive(Args)]
pub struct LsArgs {
    pub bucket: String,
    #[arg(long, default_value = "")]
    pub prefix: String,
    #[arg(long, default_value = "")]
    pub delimiter: String,
    /// Continuation token from a previous listing
    #[arg(long, default_value = "")]
    pub token: String,
    /// Follow continuation tokens to the end
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct PutArgs {
    pub bucket: String,
    pub key: String,
    pub file: PathBuf,
    #[arg(long)]
    pub content_type: Option<String>,
    /// User metadata as key=value, repeatable
    #[arg(long = "meta", value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,
}

#[derive(Args)]
pub struct GetArgs {
    pub bucket: String,
    pub key: String,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ObjectArgs {
    pub bucket: String,
    pub key: String,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty metadata key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mb() {
        let cli = Cli::try_parse_from(["stow", "mb", "photos"]).unwrap();
        if let Command::Mb(args) = cli.command {
            assert_eq!(args.bucket, "photos");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_buckets() {
        let cli = Cli::try_parse_from(["stow", "buckets"]).unwrap();
        assert!(matches!(cli.command, Command::Buckets));
    }

    #[test]
    fn parse_ls_with_options() {
        let cli = Cli::try_parse_from([
            "stow", "ls", "photos", "--prefix", "2024/", "--delimiter", "/", "--all",
        ])
        .unwrap();
        if let Command::Ls(args) = cli.command {
            assert_eq!(args.prefix, "2024/");
            assert_eq!(args.delimiter, "/");
            assert!(args.token.is_empty());
            assert!(args.all);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put_with_metadata() {
        let cli = Cli::try_parse_from([
            "stow", "put", "photos", "cat.png", "./cat.png",
            "--content-type", "image/png", "--meta", "camera=x100", "--meta", "iso=200",
        ])
        .unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.key, "cat.png");
            assert_eq!(args.file, PathBuf::from("./cat.png"));
            assert_eq!(args.content_type, Some("image/png".into()));
            assert_eq!(
                args.metadata,
                vec![("camera".into(), "x100".into()), ("iso".into(), "200".into())]
            );
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put_rejects_bad_metadata() {
        assert!(Cli::try_parse_from(["stow", "put", "b", "k", "f", "--meta", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["stow", "put", "b", "k", "f", "--meta", "=v"]).is_err());
    }

    #[test]
    fn parse_get_output() {
        let cli =
            Cli::try_parse_from(["stow", "get", "photos", "cat.png", "-o", "out.png"]).unwrap();
        if let Command::Get(args) = cli.command {
            assert_eq!(args.output, Some(PathBuf::from("out.png")));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "stow", "rm", "photos", "cat.png",
            "--root", "/srv/stowage", "--page-size", "10", "--timeout", "30", "-v",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/srv/stowage")));
        assert_eq!(cli.page_size, Some(10));
        assert_eq!(cli.timeout, Some(30));
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Rm(_)));
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["stow", "--format", "json", "head", "b", "k"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
