use anyhow::{anyhow, bail, Context};
use livescope::testing::{SyntheticFrameSpec, SyntheticSource};
use livescope::{
    AcquisitionScheduler, ChannelListener, ColorMode, NoiseSample, PipelineConfig, PipelineEvent,
    PixelBuffer,
};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    livescope::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: livescope-cli <run|noise|default-config> [args]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "run" => cmd_run(&args),
        "noise" => cmd_noise(&args),
        "default-config" => cmd_default_config(),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

struct RunArgs {
    seconds: u64,
    json: bool,
    auto_scale: bool,
    noise_panel: bool,
    snapshot: Option<PathBuf>,
    config: Option<PathBuf>,
    spec: SyntheticFrameSpec,
}

fn parse_run_args(args: &[String]) -> anyhow::Result<RunArgs> {
    // run [--seconds <n>] [--format <WxH:mono|rgb:8|16>] [--config <toml>]
    //     [--snapshot <png>] [--auto-scale] [--noise-panel] [--json]
    let mut parsed = RunArgs {
        seconds: 5,
        json: false,
        auto_scale: false,
        noise_panel: false,
        snapshot: None,
        config: None,
        spec: SyntheticFrameSpec::default(),
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--seconds" => parsed.seconds = value_after(args, &mut i)?.parse()?,
            "--format" => parsed.spec = parse_format(value_after(args, &mut i)?)?,
            "--config" => parsed.config = Some(PathBuf::from(value_after(args, &mut i)?)),
            "--snapshot" => parsed.snapshot = Some(PathBuf::from(value_after(args, &mut i)?)),
            "--auto-scale" => parsed.auto_scale = true,
            "--noise-panel" => parsed.noise_panel = true,
            "--json" => parsed.json = true,
            other => bail!("Unknown argument: {}", other),
        }
        i += 1;
    }
    Ok(parsed)
}

fn cmd_run(args: &[String]) -> anyhow::Result<()> {
    let args = parse_run_args(args)?;
    let config = match &args.config {
        Some(path) => PipelineConfig::load_layered(path)?,
        None => PipelineConfig::default(),
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let (listener, mut events) = ChannelListener::new();
        let source = Arc::new(SyntheticSource::new(args.spec));
        let scheduler = AcquisitionScheduler::new(source, Arc::new(listener), config)?;
        scheduler.enable_auto_scale(args.auto_scale);
        scheduler.set_noise_panel_expanded(args.noise_panel);
        scheduler.start()?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(args.seconds);
        let mut last_frame: Option<PixelBuffer> = None;

        while tokio::time::Instant::now() < deadline && !stop.load(Ordering::SeqCst) {
            let event = match tokio::time::timeout(Duration::from_millis(100), events.recv()).await
            {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(_) => continue,
            };
            match event {
                PipelineEvent::FrameReady { pixels, status } => {
                    if args.json {
                        let line = serde_json::json!({ "event": "frame", "status": status });
                        println!("{}", line);
                    } else {
                        println!("{}", status);
                    }
                    last_frame = Some(pixels);
                }
                PipelineEvent::HistogramReady { histogram, window } => {
                    if args.json {
                        let line = serde_json::json!({
                            "event": "histogram",
                            "total": histogram.total(),
                            "window": window,
                        });
                        println!("{}", line);
                    }
                }
                PipelineEvent::NoiseReady(sample) => print_noise(&sample, args.json)?,
                PipelineEvent::Status(status) => {
                    if args.json {
                        println!("{}", serde_json::json!({ "event": "status", "status": status }));
                    } else {
                        println!("[{}]", status);
                    }
                }
            }
        }

        scheduler.stop();
        let stats = scheduler.stats();
        if args.json {
            println!("{}", serde_json::json!({ "event": "stats", "stats": stats }));
        } else {
            println!(
                "Fetched {} frames, rendered {}, dropped {} before paint",
                stats.frames_fetched, stats.frames_rendered, stats.paint_drops
            );
        }

        if let Some(path) = &args.snapshot {
            let pixels = last_frame.ok_or_else(|| anyhow!("no frame was rendered"))?;
            let image = pixels
                .to_rgba_image()
                .ok_or_else(|| anyhow!("rendered frame has no pixels"))?;
            image
                .save(path)
                .with_context(|| format!("writing snapshot {}", path.display()))?;
            println!("Snapshot written to {}", path.display());
        }

        anyhow::Ok(())
    })
}

fn cmd_noise(args: &[String]) -> anyhow::Result<()> {
    // noise [--frames <n>] [--format <WxH:mono|rgb:8|16>] [--json]
    let mut frames = None;
    let mut spec = SyntheticFrameSpec {
        color_mode: ColorMode::Rgb,
        ..Default::default()
    };
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--frames" => frames = Some(value_after(args, &mut i)?.parse::<usize>()?),
            "--format" => spec = parse_format(value_after(args, &mut i)?)?,
            "--json" => json = true,
            other => bail!("Unknown argument: {}", other),
        }
        i += 1;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let source = Arc::new(SyntheticSource::new(spec));
        let scheduler = AcquisitionScheduler::new(
            source,
            Arc::new(livescope::NullListener),
            PipelineConfig::default(),
        )?;
        let sample = match frames {
            Some(n) => scheduler.request_temporal_noise(n).await?,
            None => scheduler.request_default_temporal_noise().await?,
        };
        print_noise(&sample, json)
    })
}

fn cmd_default_config() -> anyhow::Result<()> {
    print!("{}", PipelineConfig::default().to_toml()?);
    Ok(())
}

fn print_noise(sample: &NoiseSample, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(sample)?);
        return Ok(());
    }

    let names: &[&str] = if sample.channels.len() == 3 {
        &["R", "G", "B"]
    } else {
        &["Y"]
    };
    for (name, channel) in names.iter().zip(&sample.channels) {
        println!(
            "{}: mean {:.2}  std {:.3}  snr {:.1}",
            name, channel.mean, channel.std_dev, channel.snr
        );
    }
    Ok(())
}

fn value_after<'a>(args: &'a [String], i: &mut usize) -> anyhow::Result<&'a str> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn parse_format(s: &str) -> anyhow::Result<SyntheticFrameSpec> {
    // widthxheight:mono|rgb:8|16
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        bail!("format should be widthxheight:mono|rgb:8|16");
    }
    let size_parts: Vec<&str> = parts[0].split('x').collect();
    if size_parts.len() != 2 {
        bail!("size should be widthxheight");
    }
    let color_mode = match parts[1] {
        "mono" => ColorMode::Mono,
        "rgb" => ColorMode::Rgb,
        other => bail!("colour mode should be mono or rgb, got {}", other),
    };
    let bytes_per_sample = match parts[2] {
        "8" => 1,
        "16" => 2,
        other => bail!("bit depth should be 8 or 16, got {}", other),
    };
    Ok(SyntheticFrameSpec {
        width: size_parts[0].parse()?,
        height: size_parts[1].parse()?,
        color_mode,
        bytes_per_sample,
        ..Default::default()
    })
}
