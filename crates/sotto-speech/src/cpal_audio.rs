//! Real microphone capture via cpal.
//!
//! Captures from the default (or named) input device, downmixing and
//! linearly resampling to 16 kHz mono in the callback. Amplitude events for
//! the waveform display are emitted per callback buffer as RMS * 15, clamped
//! to 1.0.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;

use sotto_core::error::SottoError;

use crate::audio::{AudioCaptureService, AudioEvent, RecordedAudio};

/// Target format for inference input.
const TARGET_RATE: u32 = 16_000;
/// Hard cap on buffered audio (10 minutes at 16 kHz).
const MAX_SAMPLES: usize = TARGET_RATE as usize * 600;

/// Configuration for the cpal capture backend.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device name substring, or "default".
    pub device_name: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_name: "default".to_string(),
        }
    }
}

/// Wrapper to make `cpal::Stream` storable inside a `Mutex`.
///
/// The stream handle is only ever stored (to keep capture alive) or dropped
/// (to stop it); the audio callback runs on cpal's own thread.
struct SendStream(#[allow(dead_code)] cpal::Stream);

// SAFETY: the handle is never used to touch audio data across threads; cpal
// manages its callback thread internally and the handle only gates lifetime.
unsafe impl Send for SendStream {}

/// Microphone capture service backed by cpal.
pub struct CpalAudioService {
    config: CaptureConfig,
    active: Arc<AtomicBool>,
    samples: Arc<Mutex<Vec<f32>>>,
    stream: Mutex<Option<SendStream>>,
    events: mpsc::UnboundedSender<AudioEvent>,
}

impl CpalAudioService {
    pub fn new(config: CaptureConfig, events: mpsc::UnboundedSender<AudioEvent>) -> Self {
        Self {
            config,
            active: Arc::new(AtomicBool::new(false)),
            samples: Arc::new(Mutex::new(Vec::new())),
            stream: Mutex::new(None),
            events,
        }
    }

    fn find_device(&self) -> Result<cpal::Device, SottoError> {
        let host = cpal::default_host();
        if self.config.device_name == "default" {
            return host
                .default_input_device()
                .ok_or_else(|| SottoError::Device("no default input device".to_string()));
        }
        let needle = self.config.device_name.to_lowercase();
        host.input_devices()
            .map_err(|e| SottoError::Device(format!("failed to enumerate devices: {}", e)))?
            .find(|d| {
                d.name()
                    .map(|n| n.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                SottoError::Device(format!("input device '{}' not found", self.config.device_name))
            })
    }
}

impl AudioCaptureService for CpalAudioService {
    async fn start(&self) -> Result<(), SottoError> {
        if self.active.swap(true, Ordering::Relaxed) {
            return Err(SottoError::Device("capture already active".to_string()));
        }

        let device = match self.find_device() {
            Ok(device) => device,
            Err(e) => {
                self.active.store(false, Ordering::Relaxed);
                return Err(e);
            }
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        // Take the device's preferred config; many devices reject forced
        // rates, so conversion happens in the callback instead.
        let supported = device.default_input_config().map_err(|e| {
            self.active.store(false, Ordering::Relaxed);
            SottoError::Device(format!("failed to query device config: {}", e))
        })?;
        let stream_config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let device_rate = stream_config.sample_rate.0;
        let device_channels = stream_config.channels as usize;
        tracing::info!(
            device = %device_name,
            device_rate,
            device_channels,
            "Starting capture ({}ch {}Hz -> 1ch {}Hz)",
            device_channels,
            device_rate,
            TARGET_RATE
        );

        self.samples.lock().expect("sample buffer poisoned").clear();
        let samples = Arc::clone(&self.samples);
        let events = self.events.clone();

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Downmix to mono.
                    let mono: Vec<f32> = if device_channels > 1 {
                        data.chunks_exact(device_channels)
                            .map(|frame| frame.iter().sum::<f32>() / device_channels as f32)
                            .collect()
                    } else {
                        data.to_vec()
                    };

                    // Linear resample to the target rate.
                    let resampled = if device_rate != TARGET_RATE {
                        let ratio = device_rate as f64 / TARGET_RATE as f64;
                        let out_len = (mono.len() as f64 / ratio).ceil() as usize;
                        let mut out = Vec::with_capacity(out_len);
                        for i in 0..out_len {
                            let src = i as f64 * ratio;
                            let idx0 = src.floor() as usize;
                            let idx1 = (idx0 + 1).min(mono.len().saturating_sub(1));
                            let frac = (src - idx0 as f64) as f32;
                            out.push(mono[idx0] * (1.0 - frac) + mono[idx1] * frac);
                        }
                        out
                    } else {
                        mono
                    };

                    // Waveform level for this buffer.
                    if !resampled.is_empty() {
                        let rms = (resampled.iter().map(|s| s * s).sum::<f32>()
                            / resampled.len() as f32)
                            .sqrt();
                        let _ = events.send(AudioEvent::Amplitude((rms * 15.0).min(1.0)));
                    }

                    let mut buf = match samples.lock() {
                        Ok(buf) => buf,
                        Err(_) => return,
                    };
                    buf.extend_from_slice(&resampled);
                    if buf.len() > MAX_SAMPLES {
                        let excess = buf.len() - MAX_SAMPLES;
                        buf.drain(..excess);
                    }
                },
                move |err| {
                    tracing::warn!(error = %err, "Audio stream error");
                },
                None,
            )
            .map_err(|e| {
                self.active.store(false, Ordering::Relaxed);
                SottoError::Device(format!("failed to build input stream: {}", e))
            })?;

        stream
            .play()
            .map_err(|e| {
                self.active.store(false, Ordering::Relaxed);
                SottoError::Device(format!("failed to start stream: {}", e))
            })?;

        *self.stream.lock().expect("stream mutex poisoned") = Some(SendStream(stream));
        Ok(())
    }

    async fn stop(&self) -> Result<RecordedAudio, SottoError> {
        if !self.active.swap(false, Ordering::Relaxed) {
            return Err(SottoError::Device("capture not active".to_string()));
        }

        // Dropping the stream stops the callback thread.
        *self.stream.lock().expect("stream mutex poisoned") = None;

        let samples = std::mem::take(&mut *self.samples.lock().expect("sample buffer poisoned"));
        tracing::info!(samples = samples.len(), "Capture stopped");
        Ok(RecordedAudio {
            wav_path: None,
            samples,
            sample_rate: TARGET_RATE,
        })
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}
