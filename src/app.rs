use crate::cli::{Cli, Commands, ConvertOpts};
use muxolotl::config::Config;
use muxolotl::engine::{
    self, ConversionJob, ConversionRequest, Converter, Host, MetadataPolicy, StreamKind,
    WorkerMessage, WorkerPool, formats,
};
use muxolotl::logging;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use uuid::Uuid;

pub fn run(cli: Cli) {
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let config = config.unwrap_or_else(|e| {
        eprintln!("Warning: {:#}", e);
        eprintln!("Using built-in defaults. Run 'muxolotl init-config' to create a config file.");
        Config::default()
    });

    if let Err(e) = logging::init(&config.logging, cli.verbose) {
        eprintln!("Warning: {:#}", e);
    }

    let host = if cli.config.is_some() {
        Arc::new(Host::new(config.engine.clone()))
    } else {
        Host::shared()
    };

    match cli.command {
        Commands::CheckFfmpeg => handle_check_ffmpeg(&host),
        Commands::Gpu => handle_gpu(&host),
        Commands::Capabilities { verify } => handle_capabilities(&host, verify),
        Commands::Probe { file } => handle_probe(&host, &file),
        Commands::Resolve {
            format,
            kind,
            codec,
        } => handle_resolve(&host, &format, kind, &codec),
        Commands::Plan { input, opts } => handle_plan(host, &config, &input, &opts),
        Commands::Convert {
            inputs,
            opts,
            extract_audio,
            jobs,
        } => handle_convert(host, &config, &inputs, &opts, extract_audio, jobs),
        Commands::InitConfig => handle_init_config(),
    }
}

fn build_request(input: &Path, opts: &ConvertOpts) -> ConversionRequest {
    let output_dir = opts.output_dir.clone().unwrap_or_else(|| {
        input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let mut request = ConversionRequest::new(input, output_dir, &opts.format);
    request.video_codec = opts.video_codec.clone();
    request.audio_codec = opts.audio_codec.clone();
    request.video_bitrate = opts.video_bitrate.clone();
    request.audio_bitrate = opts.audio_bitrate.clone();
    request.sample_rate = opts.sample_rate;
    request.channels = opts.channels;
    request.crf = opts.crf;
    request.quality = opts.quality;
    request.resolution = opts.resolution;
    request.fps = opts.fps;
    request.preset = opts.preset.clone();
    request.tune = opts.tune.clone();
    request.threads = opts.threads;
    request.hwaccel = opts.hwaccel.clone();
    if opts.strip_metadata {
        request.metadata = MetadataPolicy::Strip;
    }
    if let Some(raw) = &opts.custom_args {
        request.custom_args = engine::split_custom_args(raw);
    }
    request
}

fn handle_check_ffmpeg(host: &Host) {
    match engine::ffmpeg_version(&host.config().ffmpeg) {
        Ok(version) => {
            println!("ffmpeg found: {}", version);
            match engine::ffprobe_version(&host.config().ffprobe) {
                Ok(probe_version) => {
                    println!("ffprobe found: {}", probe_version);
                    process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_gpu(host: &Host) {
    let gpu = host.gpu();
    println!("GPUs: {}", gpu.summary());
    match gpu.recommended_hwaccel() {
        Some(name) => println!("Recommended hwaccel: {}", name),
        None => println!("Recommended hwaccel: none (software decoding)"),
    }
    match host.vaapi_device() {
        Some(device) => println!("VA-API render node: {}", device),
        None => println!("VA-API render node: not found"),
    }
}

fn handle_capabilities(host: &Host, verify: bool) {
    let catalog = host.catalog();
    for kind in [StreamKind::Video, StreamKind::Audio] {
        println!(
            "{} formats: {}",
            kind,
            host.supported_formats(kind).join(", ")
        );
        println!(
            "{} encoders: {} compiled in",
            kind,
            catalog.encoders(kind).len()
        );
    }
    let hwaccels: Vec<&str> = catalog.hwaccels().iter().collect();
    if hwaccels.is_empty() {
        println!("hwaccels: none");
    } else {
        println!("hwaccels: {}", hwaccels.join(", "));
    }
    if catalog.is_degraded() {
        println!("Note: ffmpeg could not be fully introspected; showing fallback formats");
    }

    if verify {
        println!();
        println!("Verifying encoders (this runs a tiny test encode for each)...");
        for kind in [StreamKind::Video, StreamKind::Audio] {
            for result in host.verify_known_encoders(kind) {
                println!(
                    "  {:<20} {:<5} {:?}",
                    result.name,
                    if result.works { "OK" } else { "FAIL" },
                    result.reason
                );
            }
        }
        if let Some(hwaccel) = host.best_hwaccel() {
            println!("Best working hwaccel: {}", hwaccel);
        }
    }
}

fn handle_probe(host: &Host, file: &Path) {
    let info = engine::get_file_info(
        &host.config().ffprobe,
        file,
        host.config().file_info_timeout(),
    );
    if info.is_empty() {
        eprintln!("Could not read stream information from {}", file.display());
        process::exit(1);
    }
    match serde_json::to_string_pretty(&info) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn handle_resolve(
    host: &Host,
    format: &str,
    kind: Option<StreamKind>,
    codec: &engine::CodecSelection,
) {
    let Some(kind) = kind.or_else(|| formats::target_kind(format)) else {
        eprintln!("Unknown target format: {}", format);
        process::exit(1);
    };
    match host.resolver().resolve(format, kind, codec) {
        Ok(list) => {
            for (rank, candidate) in list.iter().enumerate() {
                println!(
                    "{}. {} ({})",
                    rank + 1,
                    candidate.name,
                    candidate.family.label()
                );
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn handle_plan(host: Arc<Host>, config: &Config, input: &Path, opts: &ConvertOpts) {
    let converter = Converter::new(Arc::clone(&host), config.conversion.clone());
    let request = build_request(input, opts);
    match converter.plan(&request) {
        Ok(prepared) => {
            println!("Output: {}", prepared.output.display());
            for (i, attempt) in prepared.attempts.iter().enumerate() {
                println!("[{}] {}", i + 1, attempt.label());
                println!("    {}", attempt.command_line(&host.config().ffmpeg));
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn handle_convert(
    host: Arc<Host>,
    config: &Config,
    inputs: &[PathBuf],
    opts: &ConvertOpts,
    extract_audio: bool,
    jobs: Option<usize>,
) {
    let files = engine::collect_inputs(inputs);
    if files.is_empty() {
        eprintln!("No media files found");
        process::exit(1);
    }

    let converter = Arc::new(Converter::new(host, config.conversion.clone()));
    let pool = WorkerPool::new(converter, jobs.unwrap_or(config.batch.max_workers));

    let mut queue: VecDeque<ConversionJob> = files
        .iter()
        .map(|file| {
            let job = ConversionJob::new(build_request(file, opts));
            if extract_audio { job.audio_only() } else { job }
        })
        .collect();
    let names: HashMap<Uuid, String> = queue
        .iter()
        .map(|job| (job.id, job.request.input.display().to_string()))
        .collect();
    let total = queue.len();

    // Last printed decile per job, to keep output readable
    let mut printed: HashMap<Uuid, u32> = HashMap::new();
    let mut failures = 0usize;
    let mut finished = 0usize;
    let mut next_worker = 0usize;

    while finished < total {
        while pool.can_spawn() {
            let Some(job) = queue.pop_front() else {
                break;
            };
            pool.spawn_job(next_worker, job);
            next_worker += 1;
        }

        let Ok(message) = pool.receiver().recv() else {
            break;
        };
        let name = |id: &Uuid| names.get(id).map(String::as_str).unwrap_or("?");
        match message {
            WorkerMessage::JobStarted { job_id } => println!("Converting {}", name(&job_id)),
            WorkerMessage::Progress {
                job_id,
                fraction,
                message,
            } => {
                let decile = (fraction * 10.0).floor() as u32;
                let last = printed.entry(job_id).or_insert(0);
                if decile > *last {
                    *last = decile;
                    println!("  {}: {}", name(&job_id), message);
                }
            }
            WorkerMessage::JobCompleted { job_id, output } => {
                finished += 1;
                println!("Done: {} -> {}", name(&job_id), output.display());
            }
            WorkerMessage::JobFailed { job_id, error } => {
                finished += 1;
                failures += 1;
                eprintln!("Failed: {}: {}", name(&job_id), error);
            }
            WorkerMessage::JobCancelled { job_id } => {
                finished += 1;
                println!("Cancelled: {}", name(&job_id));
            }
            WorkerMessage::WorkerIdle { .. } => {}
        }
    }

    println!("{} of {} file(s) converted", total - failures, total);
    if failures > 0 {
        process::exit(1);
    }
}

fn handle_init_config() {
    match Config::ensure_default() {
        Ok(path) => match Config::load_from(&path) {
            Ok(cfg) => {
                println!("Config loaded successfully from {}", path.display());
                println!("{:#?}", cfg);
            }
            Err(e) => {
                eprintln!("Config exists but is invalid: {:#}", e);
                process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Failed to create default config: {:#}", e);
            process::exit(1);
        }
    }
}
