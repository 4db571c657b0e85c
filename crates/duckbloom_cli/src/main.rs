use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duckbloom_core::{Addressing, BloomFilter, FilterMeta, FilterOptions, FilterParams, MapFlags};

#[derive(Parser)]
#[command(name = "duckbloom", version, about = "duckbloom — persistent mmap bloom filters")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(long)]
    file: PathBuf,
    /// Size in bytes; read from the sidecar when omitted
    #[arg(long)]
    size: Option<usize>,
    /// Hash rounds; read from the sidecar when omitted
    #[arg(long)]
    hashes: Option<u32>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create a new filter file (fails if it exists) and its sidecar
    Create {
        #[arg(long)]
        file: PathBuf,
        /// Size in bytes (power of two)
        #[arg(long, conflicts_with = "items")]
        size: Option<usize>,
        /// Expected number of items, for sizing
        #[arg(long, requires = "fp_rate")]
        items: Option<u64>,
        /// Target false-positive probability, for sizing
        #[arg(long)]
        fp_rate: Option<f64>,
        #[arg(long)]
        hashes: Option<u32>,
        /// Address the whole region (incompatible with the classic layout)
        #[arg(long, default_value_t = false)]
        full_range: bool,
    },

    /// Add items, then sync
    Add {
        #[command(flatten)]
        filter: FilterArgs,
        /// Items are hex-encoded bytes
        #[arg(long, default_value_t = false)]
        hex: bool,
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Print present/absent per item; exit status 1 if any is absent
    Check {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = false)]
        hex: bool,
        #[arg(required = true)]
        items: Vec<String>,
    },

    Info {
        #[command(flatten)]
        filter: FilterArgs,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn decode_item(item: &str, hex: bool) -> Result<Vec<u8>> {
    if hex {
        hex::decode(item).with_context(|| format!("bad hex item {item:?}"))
    } else {
        Ok(item.as_bytes().to_vec())
    }
}

fn plan_create(
    size: Option<usize>,
    items: Option<u64>,
    fp_rate: Option<f64>,
    hashes: Option<u32>,
    addressing: Addressing,
) -> Result<FilterParams> {
    let params = match (size, items, fp_rate) {
        (Some(size), items, fp_rate) => {
            let hash_count = match (hashes, items, fp_rate) {
                (Some(k), _, _) => k,
                (None, Some(n), _) => FilterParams::hash_count_for(size, n, addressing),
                (None, None, Some(p)) => FilterParams::hash_count_for_rate(p)?,
                (None, None, None) => bail!("--size needs one of --hashes, --items or --fp-rate"),
            };
            FilterParams { size, hash_count }
        }
        (None, Some(n), Some(p)) => {
            let mut planned = FilterParams::plan(n, p, addressing)?;
            if let Some(k) = hashes {
                planned.hash_count = k;
            }
            planned
        }
        _ => bail!("specify --size, or --items with --fp-rate"),
    };
    Ok(params)
}

/// Parameters for an existing filter: sidecar first, flags must agree with it.
fn resolve_meta(args: &FilterArgs) -> Result<FilterMeta> {
    match FilterMeta::load(&args.file)? {
        Some(meta) => {
            if args.size.is_some_and(|s| s != meta.size) || args.hashes.is_some_and(|k| k != meta.hash_count) {
                bail!(
                    "{} was made with size={} hashes={}",
                    args.file.display(),
                    meta.size,
                    meta.hash_count
                );
            }
            Ok(meta)
        }
        None => {
            let size = args.size.ok_or_else(|| anyhow!("no sidecar for {}; pass --size", args.file.display()))?;
            let hash_count =
                args.hashes.ok_or_else(|| anyhow!("no sidecar for {}; pass --hashes", args.file.display()))?;
            Ok(FilterMeta { size, hash_count, addressing: Addressing::Compatible })
        }
    }
}

fn open_filter(path: &Path, meta: &FilterMeta, create: bool) -> Result<BloomFilter> {
    let flags = MapFlags { create, ..MapFlags::open() };
    BloomFilter::open_with(Some(path), meta.size, meta.hash_count, flags, meta.addressing)
        .with_context(|| format!("open {}", path.display()))
}

fn main() -> Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Create { file, size, items, fp_rate, hashes, full_range } => {
            let addressing = if full_range { Addressing::FullRange } else { Addressing::Compatible };
            let params = plan_create(size, items, fp_rate, hashes, addressing)?;
            let opts = FilterOptions { addressing, ..Default::default() };
            let filter = BloomFilter::create_with(Some(file.as_path()), params.size, params.hash_count, &opts)
                .with_context(|| format!("create {}", file.display()))?;
            FilterMeta::of(&filter).save_atomic(&file)?;
            filter.sync()?;
            filter.close();
            println!(
                "created: {} size={} hashes={} addressing={:?}",
                file.display(),
                params.size,
                params.hash_count,
                addressing
            );
        }
        Cmd::Add { filter, hex, items } => {
            let meta = resolve_meta(&filter)?;
            let decoded = items.iter().map(|i| decode_item(i, hex)).collect::<Result<Vec<_>>>()?;
            let mut bloom = open_filter(&filter.file, &meta, true)?;
            for item in &decoded {
                bloom.add(item);
            }
            bloom.sync()?;
            bloom.close();
            info!(count = decoded.len(), file = %filter.file.display(), "items added");
            println!("added: {}", decoded.len());
        }
        Cmd::Check { filter, hex, items } => {
            let meta = resolve_meta(&filter)?;
            let bloom = open_filter(&filter.file, &meta, false)?;
            let mut all_present = true;
            for item in &items {
                let present = bloom.check(&decode_item(item, hex)?);
                all_present &= present;
                println!("{item}\t{}", if present { "present" } else { "absent" });
            }
            bloom.close();
            if !all_present {
                return Ok(ExitCode::from(1));
            }
        }
        Cmd::Info { filter } => {
            let meta = resolve_meta(&filter)?;
            let bloom = open_filter(&filter.file, &meta, false)?;
            println!("file      : {}", filter.file.display());
            println!("size      : {}", bloom.size());
            println!("hashes    : {}", bloom.hash_count());
            println!("addressing: {:?}", bloom.addressing());
            println!(
                "bits set  : {} / {}",
                bloom.count_ones(),
                bloom.addressing().addressable_bits(bloom.size())
            );
            bloom.close();
        }
    }
    Ok(ExitCode::SUCCESS)
}
