//! Sotto application binary - composition root.
//!
//! Ties the Sotto crates into a single executable:
//! 1. Parse CLI arguments and load the TOML configuration
//! 2. Open the correction store
//! 3. Build collaborators (capture, inference, language, grammar) and the
//!    insertion engine with the real system capabilities
//! 4. Spawn the pipeline command loop and wire the trigger listener into it
//! 5. Run until ctrl-c, then shut down cleanly
//!
//! Real microphone capture and whisper.cpp inference sit behind the
//! `capture` and `whisper` cargo features; without them the binary runs with
//! stubbed collaborators, which is enough to exercise the wiring.

mod cli;

use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use sotto_core::config::SottoConfig;
use sotto_corrections::CorrectionStore;
use sotto_insert::{
    InsertionEngine, KeystrokePaste, NativeFocusTarget, SystemClipboard, SystemModifierProbe,
};
use sotto_pipeline::{forward_audio_events, forward_trigger_signals, DictationPipeline};
use sotto_speech::AudioEvent;
use sotto_trigger::{
    InputPermission, PermissionState, SystemInputPermission, TriggerBindings, TriggerEngine,
    TriggerListener,
};

use cli::{expand_tilde, CliArgs};

#[cfg(feature = "whisper")]
fn build_inference(
    config: &SottoConfig,
) -> Arc<sotto_speech::whisper_service::WhisperService> {
    use sotto_core::types::ModelPreset;
    use sotto_speech::whisper_service::{WhisperConfig, WhisperService};

    let preset =
        ModelPreset::by_id(&config.model.model).unwrap_or(&ModelPreset::all()[1]);
    let model_path =
        expand_tilde(&config.model.model_dir).join(format!("ggml-{}.bin", preset.variant));
    tracing::info!(preset = preset.id, path = %model_path.display(), "Using Whisper model");
    Arc::new(WhisperService::new(WhisperConfig {
        model_path,
        language: "auto".to_string(),
    }))
}

#[cfg(not(feature = "whisper"))]
fn build_inference(_config: &SottoConfig) -> Arc<sotto_speech::MockInferenceService> {
    tracing::warn!("Built without the `whisper` feature — transcription is stubbed");
    Arc::new(sotto_speech::MockInferenceService::new())
}

#[cfg(feature = "capture")]
fn build_audio(
    events: mpsc::UnboundedSender<AudioEvent>,
) -> Arc<sotto_speech::cpal_audio::CpalAudioService> {
    use sotto_speech::cpal_audio::{CaptureConfig, CpalAudioService};
    Arc::new(CpalAudioService::new(CaptureConfig::default(), events))
}

#[cfg(not(feature = "capture"))]
fn build_audio(
    events: mpsc::UnboundedSender<AudioEvent>,
) -> Arc<sotto_speech::MockAudioService> {
    tracing::warn!("Built without the `capture` feature — microphone capture is stubbed");
    Arc::new(sotto_speech::MockAudioService::new(events))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config before tracing: the log level may come from the file.
    let config_path = args.resolve_config_path();
    let mut config = SottoConfig::load_or_default(&config_path);
    if let Some(ref dir) = args.data_dir {
        config.general.data_dir = dir.display().to_string();
    }
    if let Some(ref level) = args.log_level {
        config.general.log_level = level.clone();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.general.log_level.clone())
            }),
        )
        .init();

    tracing::info!("Starting Sotto v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_path.display(), "Configuration loaded");

    let data_dir = expand_tilde(&config.general.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let corrections = Arc::new(CorrectionStore::open(data_dir.join("corrections.json")));
    tracing::info!(entries = corrections.len(), "Correction store ready");

    // Producers feed the pipeline's single command stream.
    let (audio_tx, audio_rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();

    let audio = build_audio(audio_tx);
    let inference = build_inference(&config);
    let language = Arc::new(sotto_speech::HeuristicLanguageDetector::new());
    let grammar = Arc::new(sotto_speech::PunctuationCorrector::new());

    let delivery = Arc::new(InsertionEngine::new(
        NativeFocusTarget::new(),
        SystemClipboard::new(),
        KeystrokePaste::new(),
        SystemModifierProbe::new(),
        config.insertion.clone(),
    ));

    let pipeline = DictationPipeline::new(
        config.clone(),
        audio,
        inference,
        language,
        grammar,
        delivery,
        Arc::clone(&corrections),
    );
    let handle = pipeline.handle();
    let commands = pipeline.commands();
    let _ = forward_audio_events(audio_rx, commands.clone());
    let _ = forward_trigger_signals(signal_rx, commands);
    let pipeline_task = tokio::spawn(pipeline.run());

    // Trigger engine and its OS listener.
    let permission = SystemInputPermission::new();
    match permission.request() {
        PermissionState::Granted => tracing::info!("Global input observation granted"),
        state => tracing::warn!(?state, "Global input observation unavailable"),
    }
    let bindings = TriggerBindings::from_config(&config.trigger)?;
    let trigger = Arc::new(TriggerEngine::new(bindings, signal_tx));
    let listener = Arc::new(TriggerListener::new(Arc::clone(&trigger)));
    let listener_task = {
        let listener = Arc::clone(&listener);
        tokio::task::spawn_blocking(move || listener.run())
    };

    // State observer; the host shell (tray, panels) subscribes the same way.
    let mut state_rx = handle.subscribe();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            tracing::info!(%state, "Pipeline state");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    listener.stop();
    handle.shutdown();
    let _ = pipeline_task.await;
    let _ = listener_task.await;
    Ok(())
}
