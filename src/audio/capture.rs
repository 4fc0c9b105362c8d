//! Microphone capture: `cpal` input stream fanned out as `Frame`s on a
//! broadcast channel, grounded on the teacher's `AudioInput` device-setup
//! idiom but reworked around a push channel instead of a poll buffer.

use crate::types::Frame;
use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::types::CAPTURE_SAMPLE_RATE,
            channels: 1,
            frame_size: crate::types::DEFAULT_FRAME_SIZE,
        }
    }
}

/// Microphone capture device. Delivers `Frame`s on a broadcast channel
/// consumed concurrently by the wake detector, VAD, ASR composite, and
/// speaker embedder (spec §2/§4.1).
pub struct AudioCapture {
    config: CaptureConfig,
    device: cpal::Device,
    is_running: Arc<AtomicBool>,
    tx: broadcast::Sender<Frame>,
}

impl AudioCapture {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("no input device available (microphone not found)")?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!(device = %name, sample_rate = config.sample_rate, "capture device selected");

        let (tx, _rx) = broadcast::channel(256);
        Ok(Self {
            config,
            device,
            is_running: Arc::new(AtomicBool::new(false)),
            tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    /// Start the input stream. Returned `cpal::Stream` must be kept alive
    /// by the caller; dropping it stops capture.
    pub fn start(&self) -> Result<cpal::Stream> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            bail!("audio capture already running");
        }

        let stream_config = cpal::StreamConfig {
            channels: self.config.channels,
            sample_rate: cpal::SampleRate(self.config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let tx = self.tx.clone();
        let frame_size = self.config.frame_size;
        let sample_rate = self.config.sample_rate;
        let is_running = self.is_running.clone();
        let mut pending: Vec<f32> = Vec::with_capacity(frame_size * 2);

        let err_fn = |err| error!("audio capture stream error: {}", err);
        let sample_format = self.device.default_input_config()?.sample_format();

        let stream = match sample_format {
            cpal::SampleFormat::F32 => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !is_running.load(Ordering::SeqCst) {
                        return;
                    }
                    pending.extend_from_slice(data);
                    while pending.len() >= frame_size {
                        let chunk: Vec<f32> = pending.drain(..frame_size).collect();
                        // Transient underruns (no receivers) are dropped silently, per spec §4.1.
                        let _ = tx.send(Frame::new(chunk, sample_rate));
                    }
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    if !is_running.load(Ordering::SeqCst) {
                        return;
                    }
                    pending.extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));
                    while pending.len() >= frame_size {
                        let chunk: Vec<f32> = pending.drain(..frame_size).collect();
                        let _ = tx.send(Frame::new(chunk, sample_rate));
                    }
                },
                err_fn,
                None,
            )?,
            other => bail!("unsupported capture sample format: {other:?}"),
        };

        stream.play().context("failed to start capture stream")?;
        Ok(stream)
    }

    pub fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Records raw samples for `duration`, used only by the speaker
    /// enrollment flow (spec §4.1).
    pub async fn record_for(&self, duration: std::time::Duration) -> Result<Vec<f32>> {
        let mut rx = self.subscribe();
        let needed = (duration.as_secs_f64() * self.config.sample_rate as f64) as usize;
        let mut out = Vec::with_capacity(needed);
        while out.len() < needed {
            match rx.recv().await {
                Ok(frame) => out.extend_from_slice(frame.samples()),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        out.truncate(needed);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_values() {
        let cfg = CaptureConfig::default();
        assert_eq!(cfg.sample_rate, 16_000);
        assert_eq!(cfg.frame_size, 512);
        assert_eq!(cfg.channels, 1);
    }
}
