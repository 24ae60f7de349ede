use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{info, warn};

use super::{BufferLength, FrameSource, SampleFrameSource};
use crate::error::{AnalysisError, Result};

/// Callback blocks queued between ticks. Once full the oldest block is dropped.
const MAX_PENDING_BLOCKS: usize = 64;

/// Live frame source over the default input device. The cpal callback mixes
/// down to mono and ships blocks over a channel; blocks are drained into the
/// window whenever a frame is read.
pub struct MicrophoneSource {
    #[allow(dead_code)]
    stream: Stream,
    audio_receiver: Receiver<Vec<f32>>,
    frames: SampleFrameSource,
}

impl MicrophoneSource {
    pub fn new(length: BufferLength) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AnalysisError::Device("No input device available".to_string()))?;

        let config = device
            .default_input_config()
            .map_err(|e| AnalysisError::Device(format!("Failed to get default input config: {}", e)))?;

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );
        info!("Audio config: {:?}", config);

        let sample_rate = config.sample_rate().0 as f32;
        let (audio_sender, audio_receiver) = crossbeam_channel::bounded(MAX_PENDING_BLOCKS);

        let stream = Self::create_input_stream(
            &device,
            &config.into(),
            audio_sender,
            audio_receiver.clone(),
        )?;
        stream
            .play()
            .map_err(|e| AnalysisError::Device(format!("Failed to start input stream: {}", e)))?;

        Ok(Self {
            stream,
            audio_receiver,
            frames: SampleFrameSource::new(sample_rate, length),
        })
    }

    fn create_input_stream(
        device: &Device,
        config: &StreamConfig,
        sender: Sender<Vec<f32>>,
        evict: Receiver<Vec<f32>>,
    ) -> Result<Stream> {
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;

        info!("Creating input stream with {} channels at {} Hz", channels, sample_rate);

        device
            .build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono_data: Vec<f32> = if channels == 1 {
                        data.to_vec()
                    } else {
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                            .collect()
                    };

                    if !forward_block(&sender, &evict, mono_data) {
                        warn!("Audio receiver disconnected");
                    }
                },
                |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AnalysisError::Device(format!("Failed to build input stream: {}", e)))
    }

    fn drain(&mut self) {
        while let Ok(block) = self.audio_receiver.try_recv() {
            self.frames.push_samples(&block);
        }
    }
}

/// Queues a block without blocking the audio thread, evicting the oldest
/// queued block when full. Returns false once the consumer is gone.
fn forward_block(sender: &Sender<Vec<f32>>, evict: &Receiver<Vec<f32>>, block: Vec<f32>) -> bool {
    match sender.try_send(block) {
        Ok(()) => true,
        Err(TrySendError::Full(block)) => {
            let _ = evict.try_recv();
            !matches!(sender.try_send(block), Err(TrySendError::Disconnected(_)))
        }
        Err(TrySendError::Disconnected(_)) => false,
    }
}

impl FrameSource for MicrophoneSource {
    fn read_time_domain(&mut self, out: &mut [f32]) {
        self.drain();
        self.frames.read_time_domain(out);
    }

    fn read_frequency_domain(&mut self, out: &mut [u8]) {
        self.drain();
        self.frames.read_frequency_domain(out);
    }

    fn sample_rate(&self) -> f32 {
        self.frames.sample_rate()
    }

    fn buffer_length(&self) -> BufferLength {
        self.frames.buffer_length()
    }

    fn reconfigure(&mut self, length: BufferLength) -> Result<()> {
        self.drain();
        self.frames.reconfigure(length)
    }
}
