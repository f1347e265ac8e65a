//! Tonestage offline runner
//!
//! Streams raw interleaved signed 32-bit little-endian PCM from stdin through
//! the pipeline and writes the processed PCM to stdout. Logs go to stderr.
//!
//! ```text
//! tonestage [--config FILE] [--print-config] < in.raw > out.raw
//! ```

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tonestage_core::{AudioEngine, EngineConfig, EngineError, HostPorts, NullCodec};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const BYTES_PER_SAMPLE: usize = 4;

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    print_config: bool,
}

impl Args {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().context("--config needs a file path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--print-config" => parsed.print_config = true,
                other => bail!("Unknown argument: {}", other),
            }
        }
        Ok(parsed)
    }
}

fn load_config(path: &PathBuf) -> Result<EngineConfig> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    EngineConfig::from_json(&json)
        .with_context(|| format!("Invalid config {}", path.display()))
}

/// Fill `buf` from `reader`, stopping early only at end of input
fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Stream PCM through the engine until the reader is exhausted
///
/// Returns the number of frames written.
fn run<R: Read, W: Write>(
    engine: &mut AudioEngine,
    ports: &mut HostPorts,
    mut reader: R,
    mut writer: W,
) -> Result<u64> {
    let channels = engine.pipeline().channels();
    let block_frames = engine.config().transport_frames;
    let mut input = vec![0u8; block_frames * channels * BYTES_PER_SAMPLE];
    let mut output = Vec::with_capacity(input.len());
    let mut leftover_bytes = 0;

    loop {
        let read = read_block(&mut reader, &mut input).context("Failed to read input")?;
        if read == 0 {
            break;
        }

        let bytes = &input[..read];
        for sample in bytes.chunks_exact(BYTES_PER_SAMPLE) {
            let value = i32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
            ports
                .capture
                .push(value)
                .map_err(|_| EngineError::BufferOverflow)?;
        }
        leftover_bytes = read % BYTES_PER_SAMPLE;

        engine.run_cycle()?;

        output.clear();
        while let Ok(value) = ports.playback.pop() {
            output.extend_from_slice(&value.to_le_bytes());
        }
        writer.write_all(&output).context("Failed to write output")?;
    }

    writer.flush().context("Failed to flush output")?;

    let unprocessed = ports.capture.buffer().capacity() - ports.capture.slots();
    if unprocessed > 0 || leftover_bytes > 0 {
        warn!(
            "Input ended mid-frame: dropped {} samples and {} bytes",
            unprocessed, leftover_bytes
        );
    }
    Ok(engine.frames_processed())
}

fn main() -> Result<()> {
    // Logs on stderr; stdout carries audio
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tonestage=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse(std::env::args().skip(1))?;

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };

    if args.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let mut codec = NullCodec::new();
    let (mut engine, mut ports) = AudioEngine::start(config, &mut codec)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let frames = run(
        &mut engine,
        &mut ports,
        stdin.lock(),
        BufWriter::new(stdout.lock()),
    )?;

    info!("Processed {} frames", frames);
    Ok(())
}
