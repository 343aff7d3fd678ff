//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::{EnhanceArgs, ModelArgs};
use crate::config::DuetConfig;
use crate::engine::{
    calculate_peak, calculate_rms, enhanced_output_path, export_audio, load_recording,
    AudioBuffer, PlaybackSession, Transcoder,
};
use crate::error::Result;
use crate::neural::create_enhancer;
use crate::pipeline::{EnhanceOptions, EnhanceWorker, ProcessingReport};

/// Load the config file if given, then apply environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<DuetConfig> {
    let config = match path {
        Some(path) => DuetConfig::load(path)?,
        None => DuetConfig::default(),
    };
    Ok(config.with_env_overrides())
}

/// A recording and its enhanced version, both kept in memory
pub struct EnhancedRecording {
    pub original: Arc<AudioBuffer>,
    pub enhanced: Arc<AudioBuffer>,
    pub report: ProcessingReport,
}

impl EnhancedRecording {
    /// Pair the two versions for A/B playback
    pub fn into_session(self) -> Result<PlaybackSession> {
        PlaybackSession::new(self.original, self.enhanced)
    }
}

/// Fold command-line model options into the config.
pub fn apply_model_args(args: &ModelArgs, config: &mut DuetConfig) {
    if let Some(atten_lim) = args.atten_lim {
        config.attenuation_limit_db = atten_lim;
    }
    if let Some(window_secs) = args.window_secs {
        config.window_secs = window_secs;
    }
}

/// Load `input` and run it through the enhancement worker.
///
/// `on_progress` sees every percentage the worker reports.
pub fn enhance_recording(
    input: &Path,
    model: &str,
    config: &DuetConfig,
    on_progress: impl FnMut(u8),
) -> Result<EnhancedRecording> {
    config.validate()?;

    let enhancer = create_enhancer(model, config)?;
    let rate = enhancer.info().sample_rate.or(config.target_sample_rate);
    let transcoder = Transcoder::new(config.transcoder.clone());

    info!("Enhancing {} with {}", input.display(), enhancer.info().name);
    let original = Arc::new(load_recording(input, &transcoder, rate)?);
    let window_frames = config.window_frames(original.sample_rate());

    let handle = EnhanceWorker::spawn(
        original.clone(),
        enhancer,
        EnhanceOptions {
            window_frames,
            attenuation_limit_db: config.attenuation_limit_db,
        },
    )?;
    let (enhanced, report) = handle.wait(on_progress)?;

    Ok(EnhancedRecording {
        original,
        enhanced,
        report,
    })
}

fn print_progress(percent: u8) {
    eprint!("\rEnhancing... {:>3}%", percent);
    let _ = std::io::stderr().flush();
}

/// Denoise a recording and export the result.
pub fn enhance(args: &EnhanceArgs, mut config: DuetConfig) -> Result<()> {
    apply_model_args(&args.model, &mut config);
    if let Some(encoding) = args.encoding {
        config.export_encoding = encoding;
    }

    let recording = enhance_recording(&args.input, &args.model.model, &config, print_progress)?;
    eprintln!();
    let EnhancedRecording {
        enhanced: buffer,
        report,
        ..
    } = recording;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| enhanced_output_path(&args.input));
    export_audio(&buffer, &output, config.export_encoding)?;

    if let Some(report_path) = &args.report {
        std::fs::write(report_path, serde_json::to_string_pretty(&report)?)?;
        println!("Report written: {}", report_path.display());
    }

    println!("Enhanced audio written: {}", output.display());
    println!(
        "{} window(s), {:.1}s of audio in {} ms",
        report.windows,
        buffer.duration_secs(),
        report.elapsed_ms
    );

    Ok(())
}

/// Print format and level information for a file.
pub fn show_info(path: &Path, config: &DuetConfig) -> Result<()> {
    let transcoder = Transcoder::new(config.transcoder.clone());
    let buffer = load_recording(path, &transcoder, None)?;

    println!("File:        {}", path.display());
    println!("Sample rate: {} Hz", buffer.sample_rate());
    println!("Channels:    {}", buffer.channels());
    println!("Frames:      {}", buffer.frame_count());
    println!("Duration:    {:.2}s", buffer.duration_secs());
    println!("Peak:        {:.1} dBFS", calculate_peak(&buffer));
    println!("RMS:         {:.1} dBFS", calculate_rms(&buffer));

    Ok(())
}

#[cfg(feature = "device")]
pub use self::device::{compare, list_devices, play};

#[cfg(feature = "device")]
mod device {
    use std::io::BufRead;
    use std::path::Path;
    use std::sync::Arc;
    use std::thread;

    use crossbeam::channel;
    use tracing::{debug, warn};

    use super::{apply_model_args, enhance_recording, print_progress};
    use crate::cli::ModelArgs;
    use crate::config::DuetConfig;
    use crate::engine::{
        load_recording, CpalOutput, PlaybackSession, PositionMonitor, PositionUpdate, Source,
        Transcoder, Transport,
    };
    use crate::error::Result;

    /// Print the available output devices.
    pub fn list_devices() -> Result<()> {
        for name in CpalOutput::list_devices()? {
            println!("{}", name);
        }
        Ok(())
    }

    /// A/B playback of an original file against an already enhanced file.
    pub fn play(
        original: &Path,
        enhanced: &Path,
        device: Option<&str>,
        config: &DuetConfig,
    ) -> Result<()> {
        let transcoder = Transcoder::new(config.transcoder.clone());
        let original = Arc::new(load_recording(original, &transcoder, config.target_sample_rate)?);
        let enhanced = Arc::new(load_recording(enhanced, &transcoder, config.target_sample_rate)?);

        let session = Arc::new(PlaybackSession::new(original, enhanced)?);
        run_ab_session(session, device, config)
    }

    /// Enhance `input` in memory and A/B it against the original.
    pub fn compare(
        input: &Path,
        model: &ModelArgs,
        device: Option<&str>,
        mut config: DuetConfig,
    ) -> Result<()> {
        apply_model_args(model, &mut config);
        let recording = enhance_recording(input, &model.model, &config, print_progress)?;
        eprintln!();
        println!(
            "{} window(s) enhanced in {} ms",
            recording.report.windows, recording.report.elapsed_ms
        );

        let session = Arc::new(recording.into_session()?);
        run_ab_session(session, device, &config)
    }

    /// Interactive loop: line commands from stdin, position updates from
    /// the monitor. A finished stream is closed as soon as an update shows
    /// playback stopped.
    fn run_ab_session(
        session: Arc<PlaybackSession>,
        device: Option<&str>,
        config: &DuetConfig,
    ) -> Result<()> {
        let output = CpalOutput::open(device)?;
        let mut transport = Transport::new(session.clone(), output, config.block_frames);
        let (mut monitor, updates) = PositionMonitor::spawn(session, config.position_refresh())?;

        let (line_tx, lines) = channel::unbounded::<String>();
        thread::Builder::new()
            .name("duet-stdin".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
            })?;

        println!("Commands: p play/stop, a original, b enhanced, t toggle, s <secs> seek, q quit");

        loop {
            crossbeam::select! {
                recv(updates) -> update => {
                    let Ok(update) = update else { break };
                    if transport.reap() {
                        debug!("playback reached the end");
                    }
                    print_update(&update);
                }
                recv(lines) -> line => {
                    let Ok(line) = line else { break };
                    transport.reap();
                    if !handle_line(&mut transport, &line) {
                        break;
                    }
                }
            }
        }

        transport.stop();
        monitor.stop();
        Ok(())
    }

    fn print_update(update: &PositionUpdate) {
        let state = if update.playing { "playing" } else { "stopped" };
        println!("{} [{}] {}", update.label(), update.source, state);
    }

    /// Apply one command line; `false` means quit
    fn handle_line(transport: &mut Transport<CpalOutput>, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("p") => {
                if let Err(e) = transport.toggle() {
                    warn!("{}", e);
                    eprintln!("Playback failed: {}", e);
                }
            }
            Some("a") => transport.select_source(Source::Original),
            Some("b") => transport.select_source(Source::Enhanced),
            Some("t") => {
                transport.toggle_source();
            }
            Some("s") => match parts.next().and_then(|s| s.parse::<f64>().ok()) {
                Some(secs) if secs >= 0.0 => {
                    let frame = (secs * transport.session().sample_rate() as f64) as u64;
                    transport.seek_controller().click_to(frame);
                }
                _ => eprintln!("Usage: s <seconds>"),
            },
            Some("q") => return false,
            Some(other) => eprintln!("Unknown command: {}", other),
            None => {}
        }
        true
    }
}
