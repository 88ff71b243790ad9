//! drift CLI: real-time player, offline renderer and dry-run inspector for
//! the generative pieces.

mod synth;

use std::cell::RefCell;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use drift_engine::bounce::{bounce, BounceOptions};
use drift_engine::graph::Engine;
use drift_engine::library::{write_wav, SampleLibrary, WavLibrary};
use drift_engine::mixer::{self, MixSettings, Mixer};
use drift_engine::pieces::{self, ActivationContext, ActivePiece};
use drift_engine::render::ReverbRenderer;
use drift_engine::sink::{RecordingSink, SharedSink};
use drift_engine::{shared_rng, DriftConfig, PrerenderCache, Transport, TransportClock};
use tracing::{debug, info, warn, Level};

/// How far ahead of the audio clock the transport runs, seconds.
const LOOKAHEAD: f64 = 0.25;
const TICK: Duration = Duration::from_millis(25);

#[derive(Parser, Debug)]
#[command(name = "drift", version)]
#[command(about = "Generative ambient pieces, played live or rendered to WAV", long_about = None)]
struct Args {
    /// List audio output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// List the available pieces and exit
    #[arg(long)]
    list_pieces: bool,

    /// Piece to play
    #[arg(short, long, default_value = "animalia-chordata")]
    piece: String,

    /// Directory of WAV sample groups (built-in synthetic samples if absent)
    #[arg(long)]
    samples: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for every random decision (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,

    /// Output device name (default device if absent)
    #[arg(long)]
    device: Option<String>,

    /// Requested sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Requested channel count
    #[arg(long)]
    channels: Option<u16>,

    /// Stop after this many seconds (runs until Ctrl+C if absent)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Master gain 0.0-1.0
    #[arg(short, long, default_value = "0.8")]
    gain: f32,

    /// Render offline to this WAV file instead of playing
    #[arg(long, value_name = "OUT.wav")]
    render: Option<PathBuf>,

    /// Print the scheduled voice events instead of playing
    #[arg(long, conflicts_with = "render")]
    dry_run: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> Level {
        if self.quiet {
            return Level::WARN;
        }
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn list_output_devices() -> Result<(), Box<dyn Error>> {
    let host = cpal::default_host();
    println!("Available output devices:");
    for dev in host.output_devices()? {
        println!("- {}", dev.name()?);
    }
    Ok(())
}

fn list_pieces() {
    println!("Available pieces:");
    for piece in pieces::all() {
        println!("- {} (samples: {})", piece.name(), piece.manifest().join(", "));
    }
}

fn pick_device(name: Option<&str>) -> Result<cpal::Device, Box<dyn Error>> {
    let host = cpal::default_host();
    if let Some(name) = name {
        for d in host.output_devices()? {
            if d.name()? == name {
                return Ok(d);
            }
        }
        return Err(format!("requested device not found: {name}").into());
    }
    host.default_output_device().ok_or_else(|| "no default output device".into())
}

fn choose_config(
    device: &cpal::Device,
    req_sr: Option<u32>,
    req_ch: Option<u16>,
) -> Result<cpal::SupportedStreamConfig, Box<dyn Error>> {
    if req_sr.is_none() && req_ch.is_none() {
        return Ok(device.default_output_config()?);
    }

    let mut best: Option<(u64, cpal::SupportedStreamConfigRange)> = None;
    for range in device.supported_output_configs()? {
        let ch = range.channels();
        let (sr_min, sr_max) = (range.min_sample_rate().0, range.max_sample_rate().0);

        let ch_pen = req_ch.map_or(0, |c| u64::from(ch.abs_diff(c)));
        let sr_pen = match req_sr {
            Some(sr) if !(sr_min..=sr_max).contains(&sr) => u64::from(sr_min.abs_diff(sr).min(sr_max.abs_diff(sr))),
            _ => 0,
        };

        let score = sr_pen.saturating_mul(1000) + ch_pen;
        if best.as_ref().map_or(true, |(s, _)| score < *s) {
            best = Some((score, range));
        }
    }

    let (_, range) = best.ok_or("no supported output configs")?;
    let pick_sr = match req_sr {
        Some(sr) => cpal::SampleRate(sr.clamp(range.min_sample_rate().0, range.max_sample_rate().0)),
        None => range.max_sample_rate(),
    };
    Ok(range.with_sample_rate(pick_sr))
}

fn build_stream<T>(
    device: &cpal::Device,
    cfg: &cpal::StreamConfig,
    mut engine: Engine<Mixer>,
    gain: f32,
) -> Result<cpal::Stream, Box<dyn Error>>
where
    T: cpal::Sample + cpal::FromSample<f32> + cpal::SizedSample + Send + 'static,
{
    let sr = cfg.sample_rate.0 as f32;
    let channels = usize::from(cfg.channels.max(1));

    // ~1 second peak meter
    let meter_interval = (cfg.sample_rate.0).max(1) as usize;
    let mut meter_count = 0_usize;
    let mut meter_peak = 0.0_f32;

    let stream = device.build_output_stream(
        cfg,
        move |output: &mut [T], _| {
            for frame in output.chunks_mut(channels) {
                let s = (engine.next(sr) * gain).clamp(-1.0, 1.0);
                let v = T::from_sample(s);
                frame.iter_mut().for_each(|ch| *ch = v);

                meter_peak = meter_peak.max(s.abs());
                meter_count += 1;
                if meter_count >= meter_interval {
                    debug!(peak = meter_peak, voices = engine.generator().active_voices(), "meter");
                    meter_peak = 0.0;
                    meter_count = 0;
                }
            }
        },
        |e| warn!(error = %e, "stream error"),
        None,
    )?;
    Ok(stream)
}

/// Play `piece` on the output device until `duration` elapses (or forever).
fn play(piece: &dyn ActivePiece, settings: MixSettings, args: &Args) -> Result<(), Box<dyn Error>> {
    let device = pick_device(args.device.as_deref())?;
    let sup_cfg = choose_config(&device, args.sample_rate, args.channels)?;
    let sample_format = sup_cfg.sample_format();
    let mut cfg = sup_cfg.config();
    if let Some(sr) = args.sample_rate { cfg.sample_rate = cpal::SampleRate(sr); }
    if let Some(ch) = args.channels { cfg.channels = ch; }

    let sr = cfg.sample_rate.0 as f32;
    let (sink, mixer) = mixer::channel(sr, settings);
    let position = mixer.position();
    let engine = Engine::new(mixer, sr);
    let gain = args.gain.clamp(0.0, 1.0);

    info!(device = %device.name()?, config = ?cfg, ?sample_format, gain, "opening output stream");
    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &cfg, engine, gain)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &cfg, engine, gain)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &cfg, engine, gain)?,
        other => return Err(format!("unsupported device sample format: {other:?}").into()),
    };

    let sink: SharedSink = Rc::new(RefCell::new(sink));
    let mut transport = Transport::new();
    let schedule = piece.schedule(&mut transport, sink)?;
    stream.play()?;
    match args.duration {
        Some(d) => info!(seconds = d, "playing; auto-stop armed"),
        None => info!("playing; press Ctrl+C to stop"),
    }

    loop {
        let now = position.load(Ordering::Relaxed) as f64 / f64::from(sr);
        transport.advance_to(now + LOOKAHEAD);
        if args.duration.is_some_and(|d| now >= d) {
            break;
        }
        std::thread::sleep(TICK);
    }

    let stopped = schedule.stop(&mut transport);
    // Let the mixer drain the stop commands before the stream goes away.
    std::thread::sleep(TICK * 4);
    info!(voices_stopped = stopped, "playback finished");
    Ok(())
}

/// Schedule against a recording sink and print what would have played.
fn dry_run(piece: &dyn ActivePiece, seconds: f64) -> Result<(), Box<dyn Error>> {
    let recording = RecordingSink::shared();
    let mut transport = Transport::new();
    let schedule = piece.schedule(&mut transport, recording.clone())?;
    transport.advance_to(seconds);
    for event in recording.borrow().events() {
        println!("{event:?}");
    }
    schedule.stop(&mut transport);
    info!(seconds, now = transport.now(), events = recording.borrow().events().len(), "dry run finished");
    Ok(())
}

fn render_to_wav(piece: &dyn ActivePiece, settings: MixSettings, args: &Args, out: &Path) -> Result<(), Box<dyn Error>> {
    let opts = BounceOptions {
        seconds: args.duration.unwrap_or(BounceOptions::default().seconds),
        sample_rate: args.sample_rate.unwrap_or(BounceOptions::default().sample_rate),
        ..BounceOptions::default()
    };
    let gain = args.gain.clamp(0.0, 1.0);
    let mut mix = bounce(piece, settings, &opts)?;
    mix.iter_mut().for_each(|s| *s = (*s * gain).clamp(-1.0, 1.0));
    write_wav(out, opts.sample_rate, &mix)?;
    info!(path = %out.display(), seconds = opts.seconds, sample_rate = opts.sample_rate, "wrote WAV");
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .init();

    if args.list_devices {
        return list_output_devices();
    }
    if args.list_pieces {
        list_pieces();
        return Ok(());
    }

    let piece = pieces::by_name(&args.piece).ok_or_else(|| format!("unknown piece: {}", args.piece))?;
    let mut config = match &args.config {
        Some(path) => DriftConfig::from_path(path)?,
        None => DriftConfig::default(),
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let library: Box<dyn SampleLibrary> = match &args.samples {
        Some(dir) => Box::new(WavLibrary::new(dir)),
        None => {
            info!("no sample directory given; using built-in synthetic samples");
            Box::new(synth::library())
        }
    };
    let renderer = ReverbRenderer::with_tail(config.render.tail_seconds);
    let mut cache = PrerenderCache::new();
    let mut reported = 0_u32;
    info!(piece = piece.name(), seed = ?config.seed, "activating");
    let active = piece.activate(ActivationContext {
        library: library.as_ref(),
        cache: &mut cache,
        renderer: &renderer,
        config: &config,
        rng: shared_rng(config.seed),
        progress: &mut |p| {
            let pct = (p * 100.0).round() as u32;
            if pct >= reported + 10 || pct == 100 {
                info!(percent = pct, "prerendering");
                reported = pct;
            }
        },
    })?;
    info!(rendered = cache.render_count(), "activation done");

    let settings = MixSettings::from_config(&config);
    if let Some(out) = &args.render {
        render_to_wav(active.as_ref(), settings, &args, out)
    } else if args.dry_run {
        dry_run(active.as_ref(), args.duration.unwrap_or(120.0))
    } else {
        play(active.as_ref(), settings, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn verbosity_maps_to_levels() {
        let parse = |argv: &[&str]| Args::try_parse_from(argv).unwrap().log_level();
        assert_eq!(parse(&["drift"]), Level::INFO);
        assert_eq!(parse(&["drift", "-v"]), Level::DEBUG);
        assert_eq!(parse(&["drift", "-vvv"]), Level::TRACE);
        assert_eq!(parse(&["drift", "-q"]), Level::WARN);
        assert!(Args::try_parse_from(["drift", "-q", "-v"]).is_err());
    }

    #[test]
    fn defaults_and_flags() {
        let args = Args::try_parse_from(["drift", "-p", "little-bells", "--seed", "7", "--render", "out.wav", "-d", "30"]).unwrap();
        assert_eq!(args.piece, "little-bells");
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.duration, Some(30.0));
        assert_eq!(args.gain, 0.8);
        assert!(Args::try_parse_from(["drift", "--render", "a.wav", "--dry-run"]).is_err());
    }
}
