//! ppmc — compress a Parallel Program Model.
//!
//! Usage:
//!   ppmc <model.txt> [--out-dir DIR] [--k K] [--mu-max R] [--sigma-max R]
//!        [--cap-calc W] [--cap-com W] [--json]
//!
//! Reads a textual task-list model, writes the uncompressed binary model
//! next to it as `<stem>_raw.dat`, runs the three mining passes and the
//! quantization/deduplication pipeline, writes the compressed model as
//! `<stem>_comp.dat` and reports sizes and the compression ratio.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::exit;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ppmc::classifier::DictionaryStore;
use ppmc::cluster::{compress_segments, deduplicate_segments};
use ppmc::miner;
use ppmc::model::{build_model, BuildOptions, ModelSummary};
use ppmc::parser::parse_model;
use ppmc::segment::{BucketedSegmentStore, RawSegmentStore, TaskKind};
use ppmc::wire;

/// Default bucket badness threshold.
const DEFAULT_K: f64 = 0.04;
/// Default segment-similarity ratio bounds.
const DEFAULT_MU_MAX: f64 = 1.25;
const DEFAULT_SIGMA_MAX: f64 = 1.25;

struct Options {
    input: PathBuf,
    out_dir: Option<PathBuf>,
    k: f64,
    mu_max: f64,
    sigma_max: f64,
    cap_calc: Option<f64>,
    cap_com: Option<f64>,
    json: bool,
}

fn usage() -> ! {
    eprintln!(
        "usage: ppmc <model.txt> [--out-dir DIR] [--k K] [--mu-max R] \
         [--sigma-max R] [--cap-calc W] [--cap-com W] [--json]"
    );
    exit(2);
}

fn next_float(args: &mut impl Iterator<Item = String>, name: &str) -> f64 {
    match args.next().and_then(|v| v.parse().ok()) {
        Some(v) => v,
        None => {
            eprintln!("ppmc: {} needs a numeric argument", name);
            usage();
        }
    }
}

fn parse_args() -> Options {
    let mut args = std::env::args().skip(1);
    let mut opts = Options {
        input: PathBuf::new(),
        out_dir: None,
        k: DEFAULT_K,
        mu_max: DEFAULT_MU_MAX,
        sigma_max: DEFAULT_SIGMA_MAX,
        cap_calc: None,
        cap_com: None,
        json: false,
    };

    let mut input = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out-dir" => {
                opts.out_dir = Some(PathBuf::from(args.next().unwrap_or_else(|| usage())))
            }
            "--k" => opts.k = next_float(&mut args, "--k"),
            "--mu-max" => opts.mu_max = next_float(&mut args, "--mu-max"),
            "--sigma-max" => opts.sigma_max = next_float(&mut args, "--sigma-max"),
            "--cap-calc" => opts.cap_calc = Some(next_float(&mut args, "--cap-calc")),
            "--cap-com" => opts.cap_com = Some(next_float(&mut args, "--cap-com")),
            "--json" => opts.json = true,
            "--help" | "-h" => usage(),
            _ if input.is_none() && !arg.starts_with('-') => input = Some(PathBuf::from(arg)),
            _ => {
                eprintln!("ppmc: unknown argument '{}'", arg);
                usage();
            }
        }
    }

    match input {
        Some(p) => opts.input = p,
        None => usage(),
    }
    opts
}

/// `<out_dir or input dir>/<input stem><suffix>.dat`
fn out_path(input: &Path, out_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".into());
    let dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}{}.dat", stem, suffix))
}

#[derive(Serialize)]
struct Report {
    vertex_count: usize,
    segment_count_raw: usize,
    segment_count_compressed: usize,
    group_count: usize,
    raw_bytes: u64,
    compressed_bytes: u64,
    compression_ratio: f64,
    summary: ModelSummary,
}

fn run(opts: &Options) -> Result<()> {
    let input = File::open(&opts.input)
        .with_context(|| format!("opening model file {}", opts.input.display()))?;
    let table = parse_model(BufReader::new(input)).context("parsing the model")?;
    info!(tasks = table.len(), "model parsed");

    let mut raw = RawSegmentStore::new(opts.mu_max, opts.sigma_max);
    let build_opts = BuildOptions {
        cap_calc: opts.cap_calc,
        cap_com: opts.cap_com,
    };
    let mut model = build_model(&table, build_opts, &mut raw).context("building the PPM tree")?;

    let counts = model.vertex_counts();
    info!(
        vertices = model.vertex_count_total(),
        segments = counts[0],
        mean_segment_len = raw.mean_len(),
        "PPM tree built"
    );

    let raw_path = out_path(&opts.input, opts.out_dir.as_deref(), "_raw");
    let mut raw_out = BufWriter::new(
        File::create(&raw_path)
            .with_context(|| format!("creating {}", raw_path.display()))?,
    );
    let raw_bytes =
        wire::export_raw(&mut model, &raw, &mut raw_out).context("exporting the raw model")?;
    info!(
        path = %raw_path.display(),
        kib = raw_bytes as f64 / 1024.0,
        "uncompressed model exported"
    );

    miner::mine_symmetric(&mut model);
    miner::mine_asymmetric(&mut model);
    miner::mine_recurrence(&mut model);
    info!(groups = model.group_count(), "pattern mining complete");

    let mut buck = BucketedSegmentStore::new();
    let mut dicts = DictionaryStore::new();
    compress_segments(&mut model, &raw, &mut buck, &mut dicts, opts.k)
        .context("quantizing segments")?;

    let summary = model.summary(&raw, &buck);
    info!(
        calc_task_badness = summary.task_badness_mean[TaskKind::Calc.index()],
        calc_dict_size = summary.dict_size_mean[TaskKind::Calc.index()],
        com_task_badness = summary.task_badness_mean[TaskKind::Com.index()],
        com_dict_size = summary.dict_size_mean[TaskKind::Com.index()],
        "segments bucketized"
    );

    let raw_segment_count = raw.len();
    deduplicate_segments(&mut model, &raw, &mut buck, opts.k);
    info!(segments = buck.len(), "duplicate segments removed");
    // The raw segments are no longer referenced by the tree.
    drop(raw);

    let comp_path = out_path(&opts.input, opts.out_dir.as_deref(), "_comp");
    let mut comp_out = BufWriter::new(
        File::create(&comp_path)
            .with_context(|| format!("creating {}", comp_path.display()))?,
    );
    let comp_bytes = wire::export_bucketed(&mut model, &buck, &dicts, &mut comp_out)
        .context("exporting the compressed model")?;

    if comp_bytes == 0 {
        bail!("compressed model is empty");
    }
    let ratio = raw_bytes as f64 / comp_bytes as f64;
    info!(
        path = %comp_path.display(),
        kib = comp_bytes as f64 / 1024.0,
        ratio,
        "compressed model exported"
    );

    if opts.json {
        let report = Report {
            vertex_count: model.vertex_count_total(),
            segment_count_raw: raw_segment_count,
            segment_count_compressed: buck.len(),
            group_count: model.group_count(),
            raw_bytes,
            compressed_bytes: comp_bytes,
            compression_ratio: ratio,
            summary,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} -> {} ({} B) + {} ({} B), ratio {:.2}",
            opts.input.display(),
            raw_path.display(),
            raw_bytes,
            comp_path.display(),
            comp_bytes,
            ratio
        );
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let opts = parse_args();
    if let Err(err) = run(&opts) {
        eprintln!("ppmc: {:#}", err);
        exit(1);
    }
}
