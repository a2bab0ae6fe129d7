use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use intercom_gateway::voice::{
    list_inputs, resolve_input, AudioOutput, MicSource, PromptCache, Recording,
    SampleSource, TextToSpeech,
};
use intercom_gateway::{Config, Daemon};

/// Intercom - Raspberry Pi voice intercom over Telegram
#[derive(Parser)]
#[command(name = "intercom", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "INTERCOM_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List audio input devices
    LsAudio,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output with a tone
    TestSpeaker,
    /// Test TTS output (requires a speech API key)
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the intercom speech output.")]
        text: String,
    },
    /// Watch a GPIO pin and print its level changes
    #[cfg(feature = "gpio")]
    TestGpio {
        /// BCM pin number
        pin: u8,
        /// Duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,intercom_gateway=info",
        1 => "info,intercom_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::LsAudio => ls_audio(),
            Command::TestMic { duration } => test_mic(cli.config.as_deref(), duration),
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(cli.config.as_deref(), &text).await,
            #[cfg(feature = "gpio")]
            Command::TestGpio { pin, duration } => test_gpio(pin, duration),
        };
    }

    let config = Config::load(cli.config.as_deref())?;
    tracing::info!(
        contacts = config.rolodex.len(),
        simulated_input = config.dispatcher.simulated_input,
        "starting intercom gateway"
    );

    Daemon::new(config).run().await?;
    Ok(())
}

/// List audio input devices
fn ls_audio() -> anyhow::Result<()> {
    let devices = list_inputs()?;
    if devices.is_empty() {
        println!("No input devices found.");
    }
    for device in devices {
        println!("{device}");
    }
    Ok(())
}

/// Test microphone input with a level meter
fn test_mic(config: Option<&std::path::Path>, duration: u64) -> anyhow::Result<()> {
    let hint = Config::load(config).ok().and_then(|c| c.audio.device);

    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let device = resolve_input(hint.as_deref())?;
    let mut source = MicSource::open(&device)?;
    println!("Sample rate: {} Hz", source.sample_rate());
    println!("---");

    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(duration) {
        let block = source.next_block()?;
        let peak = block.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        let meter_len = usize::from(peak / 656).min(50);
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);
        println!("[{:4.1}s] peak: {peak:5} | [{meter}]", start.elapsed().as_secs_f32());
    }

    println!("\n---");
    println!("If the meter moved, your mic is working.");
    println!("If the peak stayed near 0, check `intercom ls-audio` and the");
    println!("`audio.device` setting in your configuration.");
    Ok(())
}

/// Test speaker output with one second of a 440 Hz tone
async fn test_speaker() -> anyhow::Result<()> {
    println!("Playing a one second test tone...");

    let sample_rate = 44_100u32;
    let samples: Vec<i16> = (0..sample_rate)
        .map(|i| {
            let t = f64::from(i) / f64::from(sample_rate);
            let value = (t * 440.0 * 2.0 * std::f64::consts::PI).sin();
            (value * f64::from(i16::MAX) * 0.4) as i16
        })
        .collect();
    let tone = Recording {
        samples,
        sample_rate,
        channels: 1,
    };
    let wav = intercom_gateway::voice::to_wav(&tone)?;

    scratch_output()?.play_bytes(&wav, None).await?;
    println!("Done. If you heard nothing, check your default output device.");
    Ok(())
}

/// Test TTS output
async fn test_tts(config: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    let config = Config::load(config)?;
    let key = config
        .speech_api_key()
        .ok_or_else(|| anyhow::anyhow!("no speech API key configured"))?;
    let tts = TextToSpeech::new(key, config.speech.tts_model, config.speech.tts_voice)?;

    println!("Synthesizing: {text}");
    let audio = tts
        .synthesize(text, &config.audio.text_language, &config.audio.text_accent)
        .await?;
    scratch_output()?.play_bytes(&audio, None).await?;
    Ok(())
}

/// Watch a GPIO pin and print its level changes
#[cfg(feature = "gpio")]
fn test_gpio(pin: u8, duration: u64) -> anyhow::Result<()> {
    use intercom_gateway::gpio::GpioButton;
    use intercom_gateway::sources::DigitalInput;

    let button = GpioButton::new(pin)?;
    println!("Watching BCM pin {pin} for {duration} seconds (pull-up, active low)...");

    let start = Instant::now();
    let mut last = button.is_active();
    println!("[{:4.1}s] {}", 0.0, if last { "pressed" } else { "released" });
    while start.elapsed() < Duration::from_secs(duration) {
        let active = button.is_active();
        if active != last {
            println!(
                "[{:4.1}s] {}",
                start.elapsed().as_secs_f32(),
                if active { "pressed" } else { "released" }
            );
            last = active;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}

/// A throwaway audio output for the test subcommands (no TTS, no prompt
/// overrides, full volume)
fn scratch_output() -> anyhow::Result<AudioOutput> {
    let prompts = PromptCache::new(
        std::env::temp_dir().join("intercom-test-prompts"),
        "en".into(),
        "com".into(),
        BTreeMap::new(),
    )?;
    Ok(AudioOutput::new(
        None,
        prompts,
        100,
        "ffmpeg".into(),
        "en".into(),
        "com".into(),
    ))
}
