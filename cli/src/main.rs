use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use clap::{Parser, Subcommand};
use hound::WavSpec;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::PathBuf;
use std::time::Instant;
use tower_http::cors::CorsLayer;

use ft8chat_core::{
    text, ChatEngine, ChatError, Event, StandinEncoder, State, SAMPLES_PER_PERIOD, SAMPLE_RATE,
    SLOT_PERIOD,
};

#[derive(Parser)]
#[command(name = "ft8chat")]
#[command(about = "FT8 free-text chat driver: fragment preview, direct-TX WAV rendering, session simulation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the slot texts the engine would transmit
    Fragment {
        /// Our two-digit station ID
        #[arg(long, default_value = "01")]
        my_id: String,

        /// Target two-digit station ID
        #[arg(long, default_value = "02")]
        target: String,

        /// Terminate the last slot with /AR
        #[arg(long)]
        broadcast: bool,

        /// Message text
        text: String,
    },

    /// Render a direct-TX burst to a 48 kHz mono WAV file
    Direct {
        /// Our two-digit station ID
        #[arg(long, default_value = "01")]
        my_id: String,

        /// Target two-digit station ID
        #[arg(long, default_value = "02")]
        target: String,

        /// Carrier frequency in Hz
        #[arg(long, default_value = "1500.0")]
        freq: f64,

        /// Output WAV file
        #[arg(short, long, value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Message text
        text: String,
    },

    /// Run a loopback echo session, printing the event stream
    Simulate {
        /// Our two-digit station ID
        #[arg(long, default_value = "01")]
        my_id: String,

        /// Target two-digit station ID
        #[arg(long, default_value = "02")]
        target: String,

        /// Corrupt the first N echoes to exercise the retry path
        #[arg(long, default_value = "0")]
        garble: u32,

        /// Message text
        text: String,
    },

    /// Start a web server exposing fragment/direct encoding
    Serve {
        /// Port to listen on (default: 8000)
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Fragment {
            my_id,
            target,
            broadcast,
            text,
        } => fragment_command(&my_id, &target, broadcast, &text),
        Commands::Direct {
            my_id,
            target,
            freq,
            output,
            text,
        } => direct_command(&my_id, &target, freq, &output, &text),
        Commands::Simulate {
            my_id,
            target,
            garble,
            text,
        } => simulate_command(&my_id, &target, garble, &text),
        Commands::Serve { port } => serve_command(port),
    }
}

fn fragment_command(
    my_id: &str,
    target: &str,
    broadcast: bool,
    message: &str,
) -> Result<(), Box<dyn Error>> {
    let sender = text::normalize_id(my_id);
    let target = text::normalize_id(target);
    let fragments = if broadcast {
        text::fragment_broadcast(&sender, &target, message)
    } else {
        text::fragment_message(&sender, &target, message)
    };
    if fragments.is_empty() {
        return Err(ChatError::EmptyMessage.into());
    }

    println!(
        "{} fragment(s), {}s on the air",
        fragments.len(),
        fragments.len() * 15
    );
    for (i, fragment) in fragments.iter().enumerate() {
        println!("  {:>2}: {fragment:?}", i + 1);
    }
    Ok(())
}

fn direct_command(
    my_id: &str,
    target: &str,
    freq: f64,
    output: &PathBuf,
    message: &str,
) -> Result<(), Box<dyn Error>> {
    let mut engine = ChatEngine::new();
    engine.set_my_id(my_id);

    let samples = render_direct(&mut engine, target, message, freq)?;
    print_events(&mut engine);

    let file = File::create(output)?;
    write_wav(file, &samples)?;
    println!(
        "Wrote {} samples ({:.1}s) to {}",
        samples.len(),
        samples.len() as f64 / SAMPLE_RATE as f64,
        output.display()
    );
    Ok(())
}

/// Run `send_direct` into an owned buffer sized for the fragment count.
fn render_direct(
    engine: &mut ChatEngine,
    target: &str,
    message: &str,
    freq: f64,
) -> Result<Vec<f32>, ChatError> {
    let sender = engine.my_id().to_string();
    let fragments = text::fragment_broadcast(&sender, &text::normalize_id(target), message);
    if fragments.is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let mut wave = vec![0.0f32; fragments.len() * SAMPLES_PER_PERIOD];
    engine.send_direct(target, message, freq, &mut StandinEncoder, &mut wave);
    if engine.state() != State::DirectTx {
        return Err(ChatError::EncoderFailure);
    }
    Ok(wave)
}

fn simulate_command(
    my_id: &str,
    target: &str,
    garble: u32,
    message: &str,
) -> Result<(), Box<dyn Error>> {
    let mut engine = ChatEngine::new();
    engine.set_my_id(my_id);

    let mut now = Instant::now();
    engine.send_message(target, message, now);
    if engine.state() == State::Idle {
        return Err(ChatError::EmptyMessage.into());
    }
    print_events(&mut engine);

    let mut garble_left = garble;
    let mut slot = 0u32;
    while engine.has_data_to_send() {
        now += SLOT_PERIOD;
        slot += 1;
        let Some(tx) = engine.next_tx_text(now) else {
            break;
        };
        println!("slot {slot}  TX {tx:?}");
        print_events(&mut engine);

        // The far end echoes the slot back in the next period.
        now += SLOT_PERIOD;
        slot += 1;
        let echo = if garble_left > 0 {
            garble_left -= 1;
            tx.chars().rev().collect::<String>()
        } else {
            tx.clone()
        };
        println!("slot {slot}  RX {echo:?}");
        engine.process_incoming(&echo, now);
        print_events(&mut engine);
    }

    // Let any pending deadline (the Complete display delay) fire.
    if let Some(deadline) = engine.poll_timeout() {
        engine.handle_timeout(deadline);
        print_events(&mut engine);
    }
    println!("final state: {:?}", engine.state());
    Ok(())
}

fn print_events(engine: &mut ChatEngine) {
    while let Some(event) = engine.poll_event() {
        match event {
            Event::Status(status) => println!("    status: {status}"),
            Event::StateChanged(state) => println!("    state: {state:?}"),
            Event::FragmentProgress {
                current,
                total,
                is_echo,
            } => {
                let role = if is_echo { " (echo)" } else { "" };
                println!("    fragment {current}/{total}{role}");
            }
            Event::MessageSentOk { target } => println!("    sent ok to {target}"),
            Event::MessageReceived { sender, text } => {
                println!("    received from {sender}: {text:?}")
            }
            Event::DirectTxReady {
                total_symbols,
                num_fragments,
            } => println!("    direct TX ready: {num_fragments} fragment(s), {total_symbols} symbols"),
            Event::DirectTxComplete => println!("    direct TX complete"),
            Event::DirectFragmentStarted {
                current,
                total,
                current_text,
                next_text,
            } => match next_text {
                Some(next) => {
                    println!("    direct fragment {current}/{total}: {current_text:?} (next {next:?})")
                }
                None => println!("    direct fragment {current}/{total}: {current_text:?}"),
            },
        }
    }
}

/// Write samples as 16-bit PCM mono at the engine sample rate.
fn write_wav<W: Write + Seek>(writer: W, samples: &[f32]) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE as u32,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav = hound::WavWriter::new(writer, spec)?;
    for &sample in samples {
        // Clamp to [-1.0, 1.0] to avoid overflow, then scale to i16.
        let clamped = sample.clamp(-1.0, 1.0);
        wav.write_sample((clamped * 32767.0) as i16)?;
    }
    wav.finalize()
}

// ---------- web server ----------

#[derive(Serialize, Deserialize)]
struct FragmentRequest {
    my_id: String,
    target: String,
    text: String,
    #[serde(default)]
    broadcast: bool,
}

#[derive(Serialize, Deserialize)]
struct FragmentResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fragments: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct DirectRequest {
    my_id: String,
    target: String,
    text: String,
    #[serde(default = "default_freq")]
    freq: f64,
}

fn default_freq() -> f64 {
    1500.0
}

#[derive(Serialize, Deserialize)]
struct DirectResponse {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    wav_base64: Option<String>,
}

#[tokio::main]
async fn serve_command(port: u16) -> Result<(), Box<dyn Error>> {
    println!("Starting ft8chat server on http://localhost:{port}");
    println!("Endpoints:");
    println!("  POST /fragment - Slice a message into FT8 slot texts");
    println!("  POST /direct - Render a direct-TX burst to WAV");
    println!("  GET / - Server status");

    let app = Router::new()
        .route("/", get(handler_status))
        .route("/fragment", post(handler_fragment))
        .route("/direct", post(handler_direct))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handler_status() -> &'static str {
    "ft8chat server - Ready"
}

async fn handler_fragment(
    Json(req): Json<FragmentRequest>,
) -> Result<Json<FragmentResponse>, (StatusCode, Json<FragmentResponse>)> {
    let sender = text::normalize_id(&req.my_id);
    let target = text::normalize_id(&req.target);
    let fragments = if req.broadcast {
        text::fragment_broadcast(&sender, &target, &req.text)
    } else {
        text::fragment_message(&sender, &target, &req.text)
    };

    if fragments.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(FragmentResponse {
                success: false,
                message: "message is empty after FT8 filtering".to_string(),
                fragments: None,
            }),
        ));
    }

    Ok(Json(FragmentResponse {
        success: true,
        message: format!("{} fragment(s)", fragments.len()),
        fragments: Some(fragments),
    }))
}

async fn handler_direct(
    Json(req): Json<DirectRequest>,
) -> Result<Json<DirectResponse>, (StatusCode, Json<DirectResponse>)> {
    let mut engine = ChatEngine::new();
    engine.set_my_id(&req.my_id);

    let samples = match render_direct(&mut engine, &req.target, &req.text, req.freq) {
        Ok(samples) => samples,
        Err(err) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(DirectResponse {
                    success: false,
                    message: format!("encoding failed: {err}"),
                    wav_base64: None,
                }),
            ));
        }
    };

    let mut wav_data = Vec::new();
    if let Err(err) = write_wav(std::io::Cursor::new(&mut wav_data), &samples) {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(DirectResponse {
                success: false,
                message: format!("failed to build WAV: {err}"),
                wav_base64: None,
            }),
        ));
    }

    let wav_base64 = base64::engine::general_purpose::STANDARD.encode(&wav_data);
    Ok(Json(DirectResponse {
        success: true,
        message: format!("{} samples at {} Hz", samples.len(), req.freq),
        wav_base64: Some(wav_base64),
    }))
}
