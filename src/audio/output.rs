// Audio output using cpal
// Feeds the default output device from a ring buffer

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::error;

use crate::error::RenderError;

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// An open output stream. Not `Send`: it lives on the device thread.
pub struct AudioOutput {
    stream: Stream,
    producer: Arc<Mutex<RingProducer>>,
    sample_rate: u32,
    channels: u16,
    clear_flag: Arc<AtomicBool>,
    paused: bool,
}

impl AudioOutput {
    /// Open the default output device and start its stream
    pub fn open() -> Result<Self, RenderError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| RenderError::Device("No output device available".into()))?;

        let config = device.default_output_config().map_err(|e| {
            RenderError::Device(format!("Failed to get default output config: {}", e))
        })?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        // Ring buffer between this thread and the audio callback
        let rb = HeapRb::<f32>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = rb.split();
        let producer = Arc::new(Mutex::new(producer));
        let consumer = Arc::new(Mutex::new(consumer));

        let clear_flag = Arc::new(AtomicBool::new(false));
        let clear_flag_clone = clear_flag.clone();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), consumer, clear_flag_clone)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), consumer, clear_flag_clone)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), consumer, clear_flag_clone)?
            }
            format => {
                return Err(RenderError::Device(format!(
                    "Unsupported sample format: {:?}",
                    format
                )))
            }
        };

        stream
            .play()
            .map_err(|e| RenderError::Device(format!("Failed to start stream: {}", e)))?;

        Ok(Self {
            stream,
            producer,
            sample_rate,
            channels,
            clear_flag,
            paused: false,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        clear_flag: Arc<AtomicBool>,
    ) -> Result<Stream, RenderError> {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut consumer = consumer.lock();

                    // If clear flag is set, drain the buffer and output silence
                    if clear_flag.swap(false, Ordering::SeqCst) {
                        while consumer.try_pop().is_some() {}
                    }

                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0);
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    error!(error = %err, "Audio output error");
                },
                None,
            )
            .map_err(|e| RenderError::Device(format!("Failed to build output stream: {}", e)))
    }

    /// Write samples to the output buffer
    /// Returns the number of samples actually written
    pub fn write(&self, samples: &[f32]) -> usize {
        let mut producer = self.producer.lock();
        let mut written = 0;

        for &sample in samples {
            if producer.try_push(sample).is_ok() {
                written += 1;
            } else {
                break;
            }
        }

        written
    }

    /// Samples queued but not yet consumed by the device
    pub fn buffered(&self) -> usize {
        self.producer.lock().occupied_len()
    }

    /// Drop everything still queued
    pub fn clear(&self) {
        // Set flag so audio callback drains buffer on next call
        self.clear_flag.store(true, Ordering::SeqCst);
    }

    /// True until the audio callback has drained the buffer after `clear`
    pub fn clear_pending(&self) -> bool {
        self.clear_flag.load(Ordering::SeqCst)
    }

    /// Pause the device stream, releasing it between sounds
    pub fn pause(&mut self) -> Result<(), RenderError> {
        if !self.paused {
            self.stream
                .pause()
                .map_err(|e| RenderError::Device(format!("Failed to pause stream: {}", e)))?;
            self.paused = true;
        }
        Ok(())
    }

    /// Make sure the stream is running before writing
    pub fn resume(&mut self) -> Result<(), RenderError> {
        if self.paused {
            self.stream
                .play()
                .map_err(|e| RenderError::Device(format!("Failed to resume stream: {}", e)))?;
            self.paused = false;
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}
